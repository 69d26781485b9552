// Image scanner
// Walks the source at sector stride looking for MFT records and boot sectors,
// collects geometry evidence and extracts requested files along the way.

use crate::ntfs::structures::{
    BOOT_SECTOR_MAGIC, MFT_FILE_NAME, MFT_MIRROR_FILE_NAME, MFT_RECORD_MAGIC, SECTOR_SIZE,
};
use crate::ntfs::{extract_file, BootSector, MftRecord, NtfsDisk, SinkFactory};
use log::{debug, info, warn};
use ntfsrd_core::{ByteSource, ConflictTracked, RateTimer, RecoveryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub const DEFAULT_PROGRESS_INTERVAL: u64 = 0x1000_0000;

/// What to scan and what to do with the records found
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// First position examined
    pub start_offset: u64,
    /// End of the scan (exclusive); the source size when unset
    pub end_offset: Option<u64>,
    pub stride: u64,
    /// Cluster size known before the scan
    pub cluster_size: Option<u32>,
    /// Names of files to extract
    pub requested_names: BTreeSet<String>,
    /// Dump every parsed record at debug level
    pub verbose: bool,
    pub progress_interval: u64,
    /// `$MFT` entry offset supplied by the user
    pub seed_mft_offset: Option<u64>,
    /// Boot sector offsets supplied by the user
    pub seed_boot_offsets: Vec<u64>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            start_offset: 0,
            end_offset: None,
            stride: SECTOR_SIZE,
            cluster_size: None,
            requested_names: BTreeSet::new(),
            verbose: false,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            seed_mft_offset: None,
            seed_boot_offsets: Vec::new(),
        }
    }
}

impl ScanOptions {
    /// Examine only the position at `offset`
    pub fn single_record(mut self, offset: u64) -> Self {
        self.start_offset = offset;
        self.end_offset = Some(offset.saturating_add(self.stride.max(1)));
        self
    }

    pub fn is_requested(&self, name: &str) -> bool {
        self.requested_names.contains(name)
    }
}

/// Everything learned during a scan
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanEvidence {
    /// Offsets of records named `$MFT`
    pub mft_entry_offsets: BTreeSet<u64>,
    pub boot_offsets: BTreeSet<u64>,
    pub mft_cluster: ConflictTracked<u64>,
    pub mirror_cluster: ConflictTracked<u64>,
    pub sector_count: ConflictTracked<u64>,
    pub cluster_size: Option<u32>,
    pub source_size: u64,
    pub records_parsed: u64,
    pub boot_sectors_parsed: u64,
    pub failures: u64,
    pub files_extracted: Vec<String>,
    /// Requested files whose extraction failed; their output may be partial
    pub files_incomplete: Vec<String>,
}

fn observe(tracked: &mut ConflictTracked<u64>, value: u64, what: &str) {
    let held = tracked.get();
    if tracked.set(value) {
        warn!(
            "{} conflict: {:#x} != {:#x}",
            what,
            value,
            held.unwrap_or_default()
        );
    }
}

impl ScanEvidence {
    pub fn set_mft_cluster(&mut self, lcn: u64) {
        observe(&mut self.mft_cluster, lcn, "MFT cluster");
    }

    pub fn set_mirror_cluster(&mut self, lcn: u64) {
        observe(&mut self.mirror_cluster, lcn, "MFTMirr cluster");
    }

    pub fn set_sector_count(&mut self, sectors: u64) {
        observe(&mut self.sector_count, sectors, "sector count");
    }
}

fn hex_or_unknown(value: Option<u64>) -> String {
    value.map_or_else(|| "?".to_string(), |v| format!("{:#x}", v))
}

impl fmt::Display for ScanEvidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "FOUND: mft={}, mir={} dsk={}  clus={}",
            hex_or_unknown(self.mft_cluster.get()),
            hex_or_unknown(self.mirror_cluster.get()),
            hex_or_unknown(self.sector_count.get()),
            hex_or_unknown(self.cluster_size.map(u64::from))
        )?;
        writeln!(f, "size={:#x}", self.source_size)?;
        for (i, offset) in self.boot_offsets.iter().enumerate() {
            writeln!(f, "boot{}: {:#x}", i, offset)?;
        }
        for offset in &self.mft_entry_offsets {
            writeln!(f, "$MFT: {:#x}", offset)?;
        }
        for name in &self.files_incomplete {
            writeln!(f, "incomplete: {}", name)?;
        }
        write!(
            f,
            "{} records, {} boot sectors, {} errors, {} files saved",
            self.records_parsed,
            self.boot_sectors_parsed,
            self.failures,
            self.files_extracted.len()
        )
    }
}

/// Reports throughput after every `interval` bytes scanned, wherever the
/// scan started
struct ProgressMeter {
    interval: u64,
    pending: u64,
    timer: RateTimer,
}

impl ProgressMeter {
    fn new(interval: u64) -> Self {
        Self {
            interval,
            pending: 0,
            timer: RateTimer::new(),
        }
    }

    /// Account for `bytes` more scanned; the rate in bytes/second when a
    /// report is due
    fn advance(&mut self, bytes: u64) -> Option<f64> {
        if self.interval == 0 {
            return None;
        }
        self.pending += bytes;
        if self.pending < self.interval {
            return None;
        }
        let rate = self.timer.rate(self.pending);
        self.pending = 0;
        Some(rate)
    }
}

pub struct Scanner<S: ByteSource> {
    disk: NtfsDisk<S>,
    options: ScanOptions,
    sinks: Option<Box<dyn SinkFactory>>,
    evidence: ScanEvidence,
}

impl<S: ByteSource> Scanner<S> {
    pub fn new(source: S, options: ScanOptions) -> Self {
        let mut disk = NtfsDisk::new(source);
        if let Some(cluster_size) = options.cluster_size.filter(|&cs| cs > 0) {
            disk.set_cluster_size(cluster_size);
        }
        Self {
            disk,
            options,
            sinks: None,
            evidence: ScanEvidence::default(),
        }
    }

    /// Where requested files are written
    pub fn with_sinks(mut self, sinks: Box<dyn SinkFactory>) -> Self {
        self.sinks = Some(sinks);
        self
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    pub fn evidence(&self) -> &ScanEvidence {
        &self.evidence
    }

    /// Scan the configured range. Failures at a single position are logged
    /// and counted; only fatal errors end the scan early.
    pub fn run(&mut self) -> Result<&ScanEvidence> {
        if let Some(offset) = self.options.seed_mft_offset {
            self.evidence.mft_entry_offsets.insert(offset);
        }
        self.evidence
            .boot_offsets
            .extend(self.options.seed_boot_offsets.iter().copied());

        let size = self.disk.size();
        let end = self.options.end_offset.map_or(size, |end| end.min(size));
        let stride = self.options.stride.max(1);
        self.evidence.source_size = size;

        info!(
            "scanning {:#x}..{:#x} every {:#x} bytes",
            self.options.start_offset, end, stride
        );
        let mut progress = ProgressMeter::new(self.options.progress_interval);
        let mut pos = self.options.start_offset;
        while pos < end {
            match self.scan_position(pos) {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("ERR reading {:#010x}: {}", pos, e);
                    self.evidence.failures += 1;
                }
            }
            if let Some(rate) = progress.advance(stride) {
                info!("{:12x}  {:9.0} bytes/sec", pos, rate);
            }
            pos = match pos.checked_add(stride) {
                Some(next) => next,
                None => break,
            };
        }

        self.evidence.cluster_size = self.disk.cluster_size();
        Ok(&self.evidence)
    }

    fn scan_position(&mut self, pos: u64) -> Result<()> {
        let reader = self.disk.reader();
        reader.set_position(pos)?;
        match reader.read_u32le()? {
            MFT_RECORD_MAGIC => self.handle_record(pos),
            BOOT_SECTOR_MAGIC => self.handle_boot_sector(pos),
            _ => Ok(()),
        }
    }

    fn handle_record(&mut self, pos: u64) -> Result<()> {
        let record = MftRecord::parse(self.disk.reader(), pos)?;
        self.evidence.records_parsed += 1;
        if self.options.verbose {
            debug!("{}", record);
        }

        let name = record.filename();
        if name == MFT_FILE_NAME {
            if let Some(lcn) = record.first_cluster() {
                self.evidence.set_mft_cluster(lcn);
            }
            self.evidence.mft_entry_offsets.insert(pos);
        } else if name == MFT_MIRROR_FILE_NAME {
            if let Some(lcn) = record.first_cluster() {
                self.evidence.set_mirror_cluster(lcn);
            }
        }

        if self.options.is_requested(name) {
            match self.save(&record) {
                Err(e) if !e.is_fatal() => {
                    warn!(
                        "{} from {:#x} not saved, output may be incomplete: {}",
                        name, pos, e
                    );
                    self.evidence.failures += 1;
                    self.evidence.files_incomplete.push(name.to_string());
                }
                result => result?,
            }
        }
        Ok(())
    }

    fn save(&mut self, record: &MftRecord) -> Result<()> {
        let name = record.filename();
        if self.disk.cluster_size().is_none() {
            return Err(RecoveryError::ClusterSizeUnknown(name.to_string()));
        }
        let sinks = match self.sinks.as_mut() {
            Some(sinks) => sinks,
            None => {
                info!("found {} at {:#x}", name, record.file_offset);
                return Ok(());
            }
        };
        let mut sink = sinks.create(name)?;
        let written = extract_file(record, &mut self.disk, &mut sink)?;
        info!("saved {} ({:#x} bytes) from {:#x}", name, written, record.file_offset);
        self.evidence.files_extracted.push(name.to_string());
        Ok(())
    }

    fn handle_boot_sector(&mut self, pos: u64) -> Result<()> {
        let boot = BootSector::parse(self.disk.reader(), pos)?;
        self.evidence.boot_sectors_parsed += 1;
        if self.options.verbose {
            debug!("boot sector @{:#x}: {}", pos, boot);
        }

        if boot.cluster_size > 0 {
            self.disk.set_cluster_size(boot.cluster_size);
        } else {
            warn!("boot sector at {:#x} has zero cluster size", pos);
        }
        self.evidence.set_mft_cluster(boot.mft_cluster);
        self.evidence.set_mirror_cluster(boot.mirror_mft_cluster);
        self.evidence.set_sector_count(boot.sector_count);
        self.evidence.boot_offsets.insert(pos);
        Ok(())
    }
}
