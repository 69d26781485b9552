// NTFS MFT record parser
// Parses a record header and walks its attributes without applying update sequence fixups

use crate::ntfs::attributes::{parse_attribute, Attribute};
use crate::ntfs::structures::*;
use log::{debug, warn};
use ntfsrd_core::{ByteSource, RecoveryError, Result};
use std::fmt;

/// A parsed MFT record. `attributes` may be a prefix of the on-disk list when
/// a later attribute failed to parse.
#[derive(Debug, Clone)]
pub struct MftRecord {
    pub file_offset: u64,
    pub magic: u32,
    pub update_sequence_offset: u16,
    pub update_sequence_count: u16,
    pub log_sequence_number: u64,
    pub sequence_number: u16,
    pub link_count: u16,
    pub attributes_offset: u16,
    pub flags: u16,
    pub bytes_used: u32,
    pub bytes_allocated: u32,
    pub base_record_reference: u64,
    pub next_attribute_id: u16,
    pub record_number: u32,
    pub attributes: Vec<Attribute>,
}

impl MftRecord {
    pub fn parse<R: ByteSource + ?Sized>(reader: &mut R, offset: u64) -> Result<Self> {
        reader.set_position(offset)?;
        let magic = reader.read_u32le()?;
        if magic != MFT_RECORD_MAGIC {
            return Err(RecoveryError::NotMftRecord(magic));
        }

        let mut record = MftRecord {
            file_offset: offset,
            magic,
            update_sequence_offset: reader.read_u16le()?,
            update_sequence_count: reader.read_u16le()?,
            log_sequence_number: reader.read_u64le()?,
            sequence_number: reader.read_u16le()?,
            link_count: reader.read_u16le()?,
            attributes_offset: reader.read_u16le()?,
            flags: reader.read_u16le()?,
            bytes_used: reader.read_u32le()?,
            bytes_allocated: reader.read_u32le()?,
            base_record_reference: reader.read_u64le()?,
            next_attribute_id: reader.read_u16le()?,
            record_number: {
                let _reserved = reader.read_u16le()?;
                reader.read_u32le()?
            },
            attributes: Vec::new(),
        };

        record.read_attributes(reader);
        Ok(record)
    }

    fn read_attributes<R: ByteSource + ?Sized>(&mut self, reader: &mut R) {
        let mut attr_offset = self.file_offset + self.attributes_offset as u64;
        loop {
            let type_code = match reader
                .set_position(attr_offset)
                .and_then(|_| reader.read_u32le())
            {
                Ok(code) => code,
                Err(e) => {
                    warn!("record {:#x}: attribute at {:#x}: {}", self.file_offset, attr_offset, e);
                    break;
                }
            };
            if type_code == ATTR_TYPE_END {
                break;
            }

            match parse_attribute(reader, attr_offset, type_code) {
                Ok(attr) => {
                    attr_offset += attr.length as u64;
                    self.attributes.push(attr);
                }
                Err(e) => {
                    debug!(
                        "record {:#x}: attribute {:#x} at {:#x}: {}, keeping {} attributes",
                        self.file_offset,
                        type_code,
                        attr_offset,
                        e,
                        self.attributes.len()
                    );
                    break;
                }
            }
        }
    }

    /// Name used to match requested files: the Win32 long name if present,
    /// then any other $FILE_NAME, then a single space.
    pub fn filename(&self) -> &str {
        let mut fallback = None;
        for file_name in self.attributes.iter().filter_map(Attribute::file_name) {
            if file_name.is_long() {
                return &file_name.name;
            }
            fallback.get_or_insert(file_name.name.as_str());
        }
        fallback.unwrap_or(UNNAMED_RECORD)
    }

    pub fn find_attribute(&self, attribute_type: AttributeType) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|a| a.attribute_type == attribute_type)
    }

    /// First $DATA attribute
    pub fn data_attribute(&self) -> Option<&Attribute> {
        self.find_attribute(AttributeType::Data)
    }

    /// First LCN of the $DATA run list
    pub fn first_cluster(&self) -> Option<u64> {
        self.data_attribute().and_then(Attribute::first_cluster)
    }

    pub fn is_in_use(&self) -> bool {
        self.flags & 0x0001 != 0
    }

    pub fn is_directory(&self) -> bool {
        self.flags & 0x0002 != 0
    }
}

impl fmt::Display for MftRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "MFT record {:#x} @{:#x} '{}': usa {:#x}/{} lsn {:#x} seq {} links {} flags {:#x} used {:#x}/{:#x} base {:#x} next {}",
            self.record_number,
            self.file_offset,
            self.filename(),
            self.update_sequence_offset,
            self.update_sequence_count,
            self.log_sequence_number,
            self.sequence_number,
            self.link_count,
            self.flags,
            self.bytes_used,
            self.bytes_allocated,
            self.base_record_reference,
            self.next_attribute_id
        )?;
        for attr in &self.attributes {
            writeln!(f, "  {:#06x}: {}", attr.offset - self.file_offset, attr)?;
        }
        Ok(())
    }
}
