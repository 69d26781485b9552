// File content reconstruction
// Streams a record's $DATA content by walking its run list

use crate::ntfs::attributes::AttributeBody;
use crate::ntfs::disk::NtfsDisk;
use crate::ntfs::mft::MftRecord;
use log::{debug, info, warn};
use ntfsrd_core::{ByteSource, RecoveryError, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Copy the first $DATA attribute of `record` into `sink`.
///
/// Returns the number of bytes written. Records without $DATA, resident
/// $DATA and empty run lists produce no content.
pub fn extract_file<S: ByteSource>(
    record: &MftRecord,
    disk: &mut NtfsDisk<S>,
    sink: &mut dyn Write,
) -> Result<u64> {
    let cluster_size = disk
        .cluster_size()
        .ok_or_else(|| RecoveryError::ClusterSizeUnknown(record.filename().to_string()))?
        as u64;

    let data = match record.data_attribute() {
        Some(attr) => attr,
        None => {
            debug!("{}: no DATA attribute", record.filename());
            return Ok(0);
        }
    };

    let nonres = match &data.body {
        AttributeBody::NonResident(nr) => nr,
        AttributeBody::Resident(r) => {
            warn!(
                "{}: resident DATA ({} bytes) not extracted",
                record.filename(),
                r.value_length
            );
            return Ok(0);
        }
    };
    if nonres.runs.is_empty() {
        warn!("{}: DATA has no runs", record.filename());
        return Ok(0);
    }

    let mut remaining = nonres.data_size;
    let mut written = 0u64;
    for (lcn, length) in nonres.runs.iter() {
        if remaining == 0 {
            break;
        }
        let start = disk
            .cluster_offset(lcn)
            .ok_or_else(|| RecoveryError::InvalidInput(format!("lcn {:#x} overflows", lcn)))?;
        let chunk = remaining.min(length.saturating_mul(cluster_size));
        disk.reader().set_position(start)?;
        written += disk.reader().copy_to(sink, chunk)?;
        remaining -= chunk;
    }
    if remaining > 0 {
        warn!(
            "{}: runs end {:#x} bytes short of data size {:#x}",
            record.filename(),
            remaining,
            nonres.data_size
        );
    }
    sink.flush()?;
    Ok(written)
}

/// Creates the output stream for a recovered file
pub trait SinkFactory {
    fn create(&mut self, name: &str) -> Result<Box<dyn Write>>;
}

/// Writes recovered files as `<dir>/<name>`
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(RecoveryError::InvalidInput(format!(
                "unsafe output name '{}'",
                name
            )));
        }
        Ok(self.dir.join(name))
    }
}

impl SinkFactory for DirectorySink {
    fn create(&mut self, name: &str) -> Result<Box<dyn Write>> {
        let path = self.path_for(name)?;
        info!("saving {}", path.display());
        Ok(Box::new(BufWriter::new(File::create(path)?)))
    }
}
