// Device reading abstraction
// Raw block devices require sector-aligned reads in multiples of the sector size,
// so reads go through an aligned block buffer.

use crate::error::{RecoveryError, Result};
use crate::source::{check_range, ByteSource, MmapSource};
use log::{debug, info, trace};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

const SECTOR_SIZE: u64 = 512;
const DEFAULT_BLOCK_SIZE: u64 = 0x10000;

/// A reader over a raw device (or any file) that only issues aligned reads.
///
/// The most recently read block is kept so the sequential 512-byte probing
/// done by the scanner touches the device once per block.
pub struct DeviceSource {
    file: File,
    size: u64,
    position: u64,
    block_size: u64,
    /// Start offset and contents of the buffered block
    block: Option<(u64, Vec<u8>)>,
}

impl DeviceSource {
    pub fn new(mut file: File) -> Result<Self> {
        let size = file.seek(SeekFrom::End(0))?;
        Ok(Self {
            file,
            size,
            position: 0,
            block_size: DEFAULT_BLOCK_SIZE,
            block: None,
        })
    }

    /// Create with a specific block size, rounded up to a whole sector
    pub fn with_block_size(file: File, block_size: u64) -> Result<Self> {
        let mut source = Self::new(file)?;
        let sectors = block_size.max(1).div_ceil(SECTOR_SIZE);
        source.block_size = sectors * SECTOR_SIZE;
        Ok(source)
    }

    pub fn open(path: &Path) -> Result<Self> {
        info!("Opening device: {}", path.display());
        Self::new(File::open(path)?)
    }

    fn load_block(&mut self, block_start: u64) -> Result<()> {
        if matches!(&self.block, Some((start, _)) if *start == block_start) {
            return Ok(());
        }
        let len = self.block_size.min(self.size - block_start);
        // Round the tail up to a sector; the device reports whole sectors.
        let aligned_len = len.div_ceil(SECTOR_SIZE) * SECTOR_SIZE;
        trace!("Reading block at {:#x} ({:#x} bytes)", block_start, aligned_len);

        self.file.seek(SeekFrom::Start(block_start))?;
        let mut buffer = vec![0u8; aligned_len as usize];
        let mut filled = 0;
        while filled < buffer.len() {
            match self.file.read(&mut buffer[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        if (filled as u64) < len {
            return Err(RecoveryError::OutOfRange {
                position: block_start + filled as u64,
                len: len - filled as u64,
                size: self.size,
            });
        }
        buffer.truncate(len as usize);
        self.block = Some((block_start, buffer));
        Ok(())
    }
}

impl ByteSource for DeviceSource {
    fn size(&self) -> u64 {
        self.size
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn set_position(&mut self, position: u64) -> Result<()> {
        self.position = position;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        check_range(self.position, buf.len() as u64, self.size)?;
        let mut done = 0;
        while done < buf.len() {
            let pos = self.position + done as u64;
            let block_start = pos - pos % self.block_size;
            self.load_block(block_start)?;
            if let Some((_, block)) = &self.block {
                let in_block = (pos - block_start) as usize;
                let n = (block.len() - in_block).min(buf.len() - done);
                buf[done..done + n].copy_from_slice(&block[in_block..in_block + n]);
                done += n;
            }
        }
        self.position += buf.len() as u64;
        Ok(())
    }
}

/// True when `path` names a block device
#[cfg(unix)]
pub fn is_block_device(path: &Path) -> bool {
    use std::os::unix::fs::FileTypeExt;
    std::fs::metadata(path)
        .map(|m| m.file_type().is_block_device())
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn is_block_device(path: &Path) -> bool {
    path.to_string_lossy().starts_with(r"\\.\")
}

/// Open a device or image: block devices through the aligned reader,
/// regular files through a memory map.
pub fn open_source(path: &Path) -> Result<Box<dyn ByteSource>> {
    if is_block_device(path) {
        debug!("blockdev reader for {}", path.display());
        Ok(Box::new(DeviceSource::open(path)?))
    } else {
        debug!("mmap reader for {}", path.display());
        Ok(Box::new(MmapSource::open(path)?))
    }
}
