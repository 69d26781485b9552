// NTFS Boot Sector parser
// Reads the geometry fields of a candidate boot sector

use crate::ntfs::structures::*;
use log::debug;
use ntfsrd_core::{ByteSource, RecoveryError, Result};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootSector {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub cluster_size: u32,
    pub sector_count: u64,
    pub mft_cluster: u64,
    pub mirror_mft_cluster: u64,
}

impl BootSector {
    /// Parse the boot sector at `offset`. Only the OEM id is validated.
    pub fn parse<R: ByteSource + ?Sized>(reader: &mut R, offset: u64) -> Result<Self> {
        reader.set_position(offset + NTFS_OEM_ID_OFFSET)?;
        let mut oem_id = [0u8; 8];
        reader.read(&mut oem_id)?;
        if &oem_id != NTFS_OEM_ID {
            return Err(RecoveryError::NotBootSector);
        }

        reader.set_position(offset + BOOT_BYTES_PER_SECTOR)?;
        let bytes_per_sector = reader.read_u16le()?;
        let sectors_per_cluster = reader.read_u8()?;
        let cluster_size = bytes_per_sector as u32 * sectors_per_cluster as u32;

        reader.set_position(offset + BOOT_TOTAL_SECTORS)?;
        let sector_count = reader.read_u64le()?;
        let mft_cluster = reader.read_u64le()?;
        let mirror_mft_cluster = reader.read_u64le()?;

        debug!(
            "boot sector at {:#x}: {} x {} bytes, {:#x} sectors",
            offset, sectors_per_cluster, bytes_per_sector, sector_count
        );

        Ok(Self {
            bytes_per_sector,
            sectors_per_cluster,
            cluster_size,
            sector_count,
            mft_cluster,
            mirror_mft_cluster,
        })
    }

    /// Volume size in bytes as declared by the sector count
    pub fn volume_size(&self) -> u64 {
        self.sector_count.saturating_mul(SECTOR_SIZE)
    }
}

impl fmt::Display for BootSector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bps={:#x} spc={} cluster={:#x} sectors={:#x} mft={:#x} mirror={:#x}",
            self.bytes_per_sector,
            self.sectors_per_cluster,
            self.cluster_size,
            self.sector_count,
            self.mft_cluster,
            self.mirror_mft_cluster
        )
    }
}
