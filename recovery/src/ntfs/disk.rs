// Disk model
// The byte source together with the cluster size learned so far

use log::{info, warn};
use ntfsrd_core::{ByteSource, ConflictTracked};

pub struct NtfsDisk<S> {
    source: S,
    cluster_size: ConflictTracked<u32>,
}

impl<S: ByteSource> NtfsDisk<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cluster_size: ConflictTracked::default(),
        }
    }

    /// Disk with a cluster size fixed up front
    pub fn with_cluster_size(source: S, cluster_size: u32) -> Self {
        let mut disk = Self::new(source);
        disk.set_cluster_size(cluster_size);
        disk
    }

    pub fn reader(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn size(&self) -> u64 {
        self.source.size()
    }

    pub fn cluster_size(&self) -> Option<u32> {
        self.cluster_size.get().filter(|&size| size > 0)
    }

    /// Record a cluster size. The first value sticks; a different later value
    /// is logged. Returns false on conflict.
    pub fn set_cluster_size(&mut self, cluster_size: u32) -> bool {
        let known = self.cluster_size.get();
        let conflict = self.cluster_size.set(cluster_size);
        match known {
            None => info!("cluster size: {:#x}", cluster_size),
            Some(current) if conflict => {
                warn!("cluster size conflict: {:#x} != {:#x}", cluster_size, current)
            }
            _ => {}
        }
        !conflict
    }

    pub fn cluster_size_conflicts(&self) -> u32 {
        self.cluster_size.conflicts()
    }

    /// Byte offset of `lcn`, if the cluster size is known
    pub fn cluster_offset(&self, lcn: u64) -> Option<u64> {
        self.cluster_size()
            .and_then(|size| lcn.checked_mul(size as u64))
    }
}
