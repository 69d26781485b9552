// NTFS Attribute parser
// Parses one attribute record in place on the byte source

use crate::ntfs::data_runs::{decode_data_runs, RunList};
use crate::ntfs::structures::*;
use byteorder::{ByteOrder, LittleEndian};
use log::{trace, warn};
use ntfsrd_core::{ByteSource, RecoveryError, Result};
use std::fmt;

/// A parsed attribute record
#[derive(Debug, Clone)]
pub struct Attribute {
    /// Absolute offset of the record on the source
    pub offset: u64,
    pub attribute_type: AttributeType,
    /// Declared record length, used to find the next attribute
    pub length: u32,
    pub name: String,
    pub flags: u16,
    pub instance: u16,
    pub body: AttributeBody,
}

#[derive(Debug, Clone)]
pub enum AttributeBody {
    Resident(ResidentAttribute),
    NonResident(NonResidentAttribute),
}

#[derive(Debug, Clone)]
pub struct ResidentAttribute {
    pub value_length: u32,
    pub value_offset: u16,
    pub resident_flags: u8,
    pub value: Vec<u8>,
    /// Decoded value of a $FILE_NAME attribute
    pub file_name: Option<FileName>,
}

#[derive(Debug, Clone)]
pub struct NonResidentAttribute {
    pub lowest_vcn: u64,
    pub highest_vcn: u64,
    pub run_list_offset: u16,
    pub compression_unit: u8,
    pub allocated_size: u64,
    pub data_size: u64,
    pub initialized_size: u64,
    pub runs: RunList,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileName {
    pub parent_reference: u64,
    pub namespace: u8,
    pub name: String,
}

impl FileName {
    /// Parse a $FILE_NAME value
    pub fn parse(value: &[u8]) -> Result<Self> {
        if value.len() < FILE_NAME_OFFSET {
            return Err(RecoveryError::AttributeBounds(format!(
                "file name value of {} bytes",
                value.len()
            )));
        }
        let name_units = value[FILE_NAME_LENGTH_OFFSET] as usize;
        let end = (FILE_NAME_OFFSET + name_units * 2).min(value.len());
        Ok(Self {
            parent_reference: LittleEndian::read_u64(&value[0..8]),
            namespace: value[FILE_NAME_NAMESPACE_OFFSET],
            name: decode_utf16le(&value[FILE_NAME_OFFSET..end]),
        })
    }

    /// Win32 long name, as opposed to a DOS 8.3 or other namespace
    pub fn is_long(&self) -> bool {
        self.namespace == FILE_NAME_WIN32
    }
}

/// Decode UTF-16LE code units; a dangling odd byte is ignored
pub fn decode_utf16le(data: &[u8]) -> String {
    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

impl Attribute {
    pub fn is_resident(&self) -> bool {
        matches!(self.body, AttributeBody::Resident(_))
    }

    pub fn file_name(&self) -> Option<&FileName> {
        match &self.body {
            AttributeBody::Resident(r) => r.file_name.as_ref(),
            AttributeBody::NonResident(_) => None,
        }
    }

    pub fn runs(&self) -> Option<&RunList> {
        match &self.body {
            AttributeBody::NonResident(nr) => Some(&nr.runs),
            AttributeBody::Resident(_) => None,
        }
    }

    /// First LCN of the run list, if the attribute has one
    pub fn first_cluster(&self) -> Option<u64> {
        self.runs().and_then(RunList::first_cluster)
    }
}

/// Residency-specific fields read before the payload
struct Layout {
    body: AttributeBody,
    data_base: u32,
    data_start: u32,
    data_length: u32,
}

/// Parse the attribute record starting at `offset`. `type_code` was already
/// read from the first four bytes by the caller.
pub fn parse_attribute<R: ByteSource + ?Sized>(
    reader: &mut R,
    offset: u64,
    type_code: u32,
) -> Result<Attribute> {
    reader.set_position(offset + 4)?;
    let length = reader.read_u32le()?;
    let non_resident = reader.read_u8()? != 0;
    let name_length = reader.read_u8()?;
    let name_offset = reader.read_u16le()?;
    let flags = reader.read_u16le()?;
    let instance = reader.read_u16le()?;

    let layout = if non_resident {
        read_non_resident_layout(reader, length)?
    } else {
        read_resident_layout(reader, length)?
    };

    if name_offset as u32 > length || name_offset as u32 + 2 * name_length as u32 > length {
        return Err(RecoveryError::AttributeBounds(format!(
            "name {:#x}+{:#x} beyond length {:#x}",
            name_offset,
            2 * name_length as u32,
            length
        )));
    }
    if length < layout.data_base {
        return Err(RecoveryError::AttributeBounds(format!(
            "length {:#x} shorter than header",
            length
        )));
    }
    if length - layout.data_base > MAX_ATTRIBUTE_PAYLOAD {
        return Err(RecoveryError::AttributeTooLarge(length as u64));
    }
    if layout.data_start < layout.data_base {
        return Err(RecoveryError::AttributeBounds(format!(
            "data at {:#x} inside header",
            layout.data_start
        )));
    }

    let name = if name_length > 0 {
        reader.set_position(offset + name_offset as u64)?;
        decode_utf16le(&reader.read_vec(2 * name_length as usize)?)
    } else {
        String::new()
    };

    reader.set_position(offset + layout.data_base as u64)?;
    let mut data = reader.read_vec((length - layout.data_base) as usize)?;
    data.drain(..(layout.data_start - layout.data_base) as usize);

    if (data.len() as u64) < layout.data_length as u64 {
        warn!(
            "attribute at {:#x}: {} < {} : attr too short",
            offset,
            data.len(),
            layout.data_length
        );
    }
    if layout.data_length > MAX_ATTRIBUTE_PAYLOAD {
        return Err(RecoveryError::AttributeTooLarge(layout.data_length as u64));
    }
    data.resize(layout.data_length as usize, 0);

    let attribute_type = AttributeType::from_code(type_code);
    let body = match layout.body {
        AttributeBody::NonResident(mut nr) => {
            nr.runs = decode_data_runs(&data);
            AttributeBody::NonResident(nr)
        }
        AttributeBody::Resident(mut r) => {
            if attribute_type == AttributeType::FileName {
                r.file_name = Some(FileName::parse(&data)?);
            }
            r.value = data;
            AttributeBody::Resident(r)
        }
    };

    trace!("{} attribute at {:#x}, length {:#x}", attribute_type, offset, length);
    Ok(Attribute {
        offset,
        attribute_type,
        length,
        name,
        flags,
        instance,
        body,
    })
}

fn read_non_resident_layout<R: ByteSource + ?Sized>(reader: &mut R, length: u32) -> Result<Layout> {
    let lowest_vcn = reader.read_u64le()?;
    let highest_vcn = reader.read_u64le()?;
    let run_list_offset = reader.read_u16le()?;
    let compression_unit = reader.read_u8()?;
    let mut reserved = [0u8; 5];
    reader.read(&mut reserved)?;
    let allocated_size = reader.read_u64le()?;
    let data_size = reader.read_u64le()?;
    let initialized_size = reader.read_u64le()?;

    if run_list_offset as u32 >= length {
        return Err(RecoveryError::AttributeBounds(format!(
            "run list at {:#x} beyond length {:#x}",
            run_list_offset, length
        )));
    }

    Ok(Layout {
        body: AttributeBody::NonResident(NonResidentAttribute {
            lowest_vcn,
            highest_vcn,
            run_list_offset,
            compression_unit,
            allocated_size,
            data_size,
            initialized_size,
            runs: RunList::default(),
        }),
        data_base: NON_RESIDENT_DATA_BASE,
        data_start: run_list_offset as u32,
        data_length: length - run_list_offset as u32,
    })
}

fn read_resident_layout<R: ByteSource + ?Sized>(reader: &mut R, length: u32) -> Result<Layout> {
    let value_length = reader.read_u32le()?;
    let value_offset = reader.read_u16le()?;
    let resident_flags = reader.read_u8()?;
    let _reserved = reader.read_u8()?;

    if value_offset as u32 > length || value_offset as u64 + value_length as u64 > length as u64 {
        return Err(RecoveryError::AttributeBounds(format!(
            "value {:#x}+{:#x} beyond length {:#x}",
            value_offset, value_length, length
        )));
    }

    Ok(Layout {
        body: AttributeBody::Resident(ResidentAttribute {
            value_length,
            value_offset,
            resident_flags,
            value: Vec::new(),
            file_name: None,
        }),
        data_base: RESIDENT_DATA_BASE,
        data_start: value_offset as u32,
        data_length: value_length,
    })
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<22} len={:#06x} flags={:#x} id={} '{}'",
            self.attribute_type.to_string(),
            self.length,
            self.flags,
            self.instance,
            self.name
        )?;
        match &self.body {
            AttributeBody::NonResident(nr) => {
                write!(
                    f,
                    " vcn {:#x}-{:#x} size {:#x}/{:#x}/{:#x} runs",
                    nr.lowest_vcn, nr.highest_vcn, nr.allocated_size, nr.data_size, nr.initialized_size
                )?;
                for (lcn, len) in nr.runs.iter() {
                    write!(f, " {:#x}..{:#x}", lcn, (lcn + len).saturating_sub(1))?;
                }
                Ok(())
            }
            AttributeBody::Resident(r) => {
                write!(f, " value {:#06x}/{:#06x}", r.value_offset, r.value_length)?;
                if let Some(file_name) = &r.file_name {
                    write!(f, " name[{}] '{}'", file_name.namespace, file_name.name)?;
                }
                let shown = r.value.len().min(32);
                write!(f, " {}", hex::encode(&r.value[..shown]))
            }
        }
    }
}
