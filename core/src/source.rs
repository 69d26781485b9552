// Random-access byte sources
// A positional reader over a device, image, memory buffer or a window of another source

use crate::error::{RecoveryError, Result};
use byteorder::{ByteOrder, LittleEndian};
use log::trace;
use std::io::Write;

const COPY_CHUNK: usize = 0x10000;

/// Positional reader shared by every parser. The cursor is the only state.
pub trait ByteSource {
    /// Total addressable size in bytes
    fn size(&self) -> u64;

    /// Current cursor position
    fn position(&self) -> u64;

    fn set_position(&mut self, position: u64) -> Result<()>;

    /// Fill `buf` completely from the current position and advance the cursor.
    /// A short read is an error.
    fn read(&mut self, buf: &mut [u8]) -> Result<()>;

    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u16le(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read(&mut buf)?;
        Ok(LittleEndian::read_u16(&buf))
    }

    fn read_u32le(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read(&mut buf)?;
        Ok(LittleEndian::read_u32(&buf))
    }

    fn read_u64le(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read(&mut buf)?;
        Ok(LittleEndian::read_u64(&buf))
    }

    /// Read `len` bytes into a new buffer
    fn read_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read(&mut buf)?;
        Ok(buf)
    }

    /// Stream `len` bytes from the current position into `sink`
    fn copy_to(&mut self, sink: &mut dyn Write, len: u64) -> Result<u64> {
        trace!("Copying {:#x} bytes from {:#x}", len, self.position());
        let mut buf = vec![0u8; COPY_CHUNK.min(len as usize)];
        let mut remaining = len;
        while remaining > 0 {
            let chunk = remaining.min(buf.len() as u64) as usize;
            self.read(&mut buf[..chunk])?;
            sink.write_all(&buf[..chunk])?;
            remaining -= chunk as u64;
        }
        Ok(len)
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn size(&self) -> u64 {
        (**self).size()
    }

    fn position(&self) -> u64 {
        (**self).position()
    }

    fn set_position(&mut self, position: u64) -> Result<()> {
        (**self).set_position(position)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        (**self).read(buf)
    }

    fn copy_to(&mut self, sink: &mut dyn Write, len: u64) -> Result<u64> {
        (**self).copy_to(sink, len)
    }
}

pub(crate) fn check_range(position: u64, len: u64, size: u64) -> Result<()> {
    match position.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(RecoveryError::OutOfRange {
            position,
            len,
            size,
        }),
    }
}

/// Source over any contiguous byte container: a `Vec<u8>` or a memory map
pub struct SliceSource<T: AsRef<[u8]>> {
    data: T,
    position: u64,
}

/// In-memory image
pub type MemorySource = SliceSource<Vec<u8>>;

/// Memory-mapped image file
pub type MmapSource = SliceSource<memmap2::Mmap>;

impl<T: AsRef<[u8]>> SliceSource<T> {
    pub fn new(data: T) -> Self {
        Self { data, position: 0 }
    }
}

impl MmapSource {
    /// Map an image file read-only
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let map = unsafe { memmap2::Mmap::map(&file)? };
        Ok(Self::new(map))
    }
}

impl<T: AsRef<[u8]>> ByteSource for SliceSource<T> {
    fn size(&self) -> u64 {
        self.data.as_ref().len() as u64
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn set_position(&mut self, position: u64) -> Result<()> {
        self.position = position;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        check_range(self.position, buf.len() as u64, self.size())?;
        let start = self.position as usize;
        buf.copy_from_slice(&self.data.as_ref()[start..start + buf.len()]);
        self.position += buf.len() as u64;
        Ok(())
    }

    fn copy_to(&mut self, sink: &mut dyn Write, len: u64) -> Result<u64> {
        check_range(self.position, len, self.size())?;
        let start = self.position as usize;
        sink.write_all(&self.data.as_ref()[start..start + len as usize])?;
        self.position += len;
        Ok(len)
    }
}

/// Window `[start, start + length)` of another source, addressed from zero
pub struct OffsetSource<S: ByteSource> {
    inner: S,
    start: u64,
    length: u64,
    position: u64,
}

impl<S: ByteSource> OffsetSource<S> {
    /// Restrict `inner` to a window. A window extending past the end of the
    /// inner source is clipped.
    pub fn new(inner: S, start: u64, length: u64) -> Result<Self> {
        let inner_size = inner.size();
        if start > inner_size {
            return Err(RecoveryError::InvalidInput(format!(
                "window start {:#x} beyond source size {:#x}",
                start, inner_size
            )));
        }
        let length = length.min(inner_size - start);
        Ok(Self {
            inner,
            start,
            length,
            position: 0,
        })
    }
}

impl<S: ByteSource> ByteSource for OffsetSource<S> {
    fn size(&self) -> u64 {
        self.length
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn set_position(&mut self, position: u64) -> Result<()> {
        self.position = position;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        check_range(self.position, buf.len() as u64, self.length)?;
        self.inner.set_position(self.start + self.position)?;
        self.inner.read(buf)?;
        self.position += buf.len() as u64;
        Ok(())
    }

    fn copy_to(&mut self, sink: &mut dyn Write, len: u64) -> Result<u64> {
        check_range(self.position, len, self.length)?;
        self.inner.set_position(self.start + self.position)?;
        let copied = self.inner.copy_to(sink, len)?;
        self.position += copied;
        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MemorySource {
        MemorySource::new((0u8..=255).collect())
    }

    #[test]
    fn test_little_endian_reads() {
        let mut src = sample();
        src.set_position(1).unwrap();
        assert_eq!(src.read_u8().unwrap(), 1);
        assert_eq!(src.read_u16le().unwrap(), 0x0302);
        assert_eq!(src.read_u32le().unwrap(), 0x07060504);
        assert_eq!(src.read_u64le().unwrap(), 0x0f0e0d0c0b0a0908);
        assert_eq!(src.position(), 16);
    }

    #[test]
    fn test_read_past_end_fails() {
        let mut src = sample();
        src.set_position(254).unwrap();
        assert!(matches!(
            src.read_u32le(),
            Err(RecoveryError::OutOfRange { position: 254, len: 4, size: 256 })
        ));
    }

    #[test]
    fn test_copy_to_sink() {
        let mut src = sample();
        src.set_position(16).unwrap();
        let mut out = Vec::new();
        assert_eq!(src.copy_to(&mut out, 4).unwrap(), 4);
        assert_eq!(out, vec![16, 17, 18, 19]);
        assert_eq!(src.position(), 20);
    }

    #[test]
    fn test_offset_window() {
        let mut win = OffsetSource::new(sample(), 0x10, 0x20).unwrap();
        assert_eq!(win.size(), 0x20);
        assert_eq!(win.read_u8().unwrap(), 0x10);
        win.set_position(0x1f).unwrap();
        assert_eq!(win.read_u8().unwrap(), 0x2f);
        assert!(win.read_u8().is_err());

        let mut out = Vec::new();
        win.set_position(2).unwrap();
        win.copy_to(&mut out, 3).unwrap();
        assert_eq!(out, vec![0x12, 0x13, 0x14]);
    }

    #[test]
    fn test_offset_window_is_clipped() {
        let win = OffsetSource::new(sample(), 0xf0, 0x1000).unwrap();
        assert_eq!(win.size(), 0x10);
        assert!(OffsetSource::new(sample(), 0x101, 1).is_err());
    }

    #[test]
    fn test_boxed_dyn_source() {
        let mut src: Box<dyn ByteSource> = Box::new(sample());
        src.set_position(0x40).unwrap();
        assert_eq!(src.read_u16le().unwrap(), 0x4140);
        let mut out = Vec::new();
        src.copy_to(&mut out, 2).unwrap();
        assert_eq!(out, vec![0x42, 0x43]);
    }
}
