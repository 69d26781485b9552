// Builders for synthetic NTFS structures used by unit and integration tests.
// Plain std only: integration tests include this file directly.
#![allow(dead_code)]

pub const RECORD_SIZE: usize = 1024;
pub const ATTRS_OFFSET: usize = 0x38;

pub const NS_POSIX: u8 = 0;
pub const NS_WIN32: u8 = 1;
pub const NS_DOS: u8 = 2;

pub fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

fn pad8(buf: &mut Vec<u8>) {
    while buf.len() % 8 != 0 {
        buf.push(0);
    }
}

/// Encode `(lcn, length)` runs with minimal field widths, deltas taken from
/// the end of the previous run.
pub fn encode_runs(runs: &[(u64, u64)]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut base = 0i64;
    for &(lcn, length) in runs {
        let delta = lcn as i64 - base;
        let len_bytes = unsigned_width(length);
        let off_bytes = signed_width(delta);
        out.push(((off_bytes as u8) << 4) | len_bytes as u8);
        out.extend_from_slice(&length.to_le_bytes()[..len_bytes]);
        out.extend_from_slice(&delta.to_le_bytes()[..off_bytes]);
        base = (lcn + length) as i64;
    }
    out.push(0);
    out
}

fn unsigned_width(v: u64) -> usize {
    (1..=8).find(|&n| n == 8 || v < 1u64 << (8 * n)).unwrap()
}

fn signed_width(v: i64) -> usize {
    (1..=8)
        .find(|&n| {
            n == 8 || {
                let half = 1i64 << (8 * n - 1);
                v >= -half && v < half
            }
        })
        .unwrap()
}

/// $FILE_NAME value: parent reference, name length at 0x40, namespace at 0x41,
/// UTF-16 name from 0x42
pub fn file_name_value(name: &str, namespace: u8) -> Vec<u8> {
    let encoded = utf16le(name);
    let mut value = vec![0u8; 0x42];
    value[0..8].copy_from_slice(&5u64.to_le_bytes());
    value[0x40] = (encoded.len() / 2) as u8;
    value[0x41] = namespace;
    value.extend_from_slice(&encoded);
    value
}

/// Resident attribute record with an optional name placed before the value
pub fn resident_attribute(type_code: u32, name: &str, value: &[u8]) -> Vec<u8> {
    let name_bytes = utf16le(name);
    let name_offset = 0x18usize;
    let mut value_offset = name_offset + name_bytes.len();
    value_offset = (value_offset + 7) & !7;

    let mut attr = vec![0u8; value_offset];
    attr[0..4].copy_from_slice(&type_code.to_le_bytes());
    attr[8] = 0; // resident
    attr[9] = (name_bytes.len() / 2) as u8;
    attr[10..12].copy_from_slice(&(name_offset as u16).to_le_bytes());
    attr[14..16].copy_from_slice(&3u16.to_le_bytes());
    attr[16..20].copy_from_slice(&(value.len() as u32).to_le_bytes());
    attr[20..22].copy_from_slice(&(value_offset as u16).to_le_bytes());
    attr[name_offset..name_offset + name_bytes.len()].copy_from_slice(&name_bytes);
    attr.extend_from_slice(value);
    pad8(&mut attr);
    let len = attr.len() as u32;
    attr[4..8].copy_from_slice(&len.to_le_bytes());
    attr
}

pub fn file_name_attribute(name: &str, namespace: u8) -> Vec<u8> {
    resident_attribute(0x30, "", &file_name_value(name, namespace))
}

/// Non-resident attribute record carrying the given encoded run list
pub fn non_resident_attribute(type_code: u32, name: &str, runs: &[u8], data_size: u64) -> Vec<u8> {
    let name_bytes = utf16le(name);
    let name_offset = 0x40usize;
    let runs_offset = (name_offset + name_bytes.len() + 7) & !7;

    let mut attr = vec![0u8; runs_offset];
    attr[0..4].copy_from_slice(&type_code.to_le_bytes());
    attr[8] = 1; // non-resident
    attr[9] = (name_bytes.len() / 2) as u8;
    attr[10..12].copy_from_slice(&(name_offset as u16).to_le_bytes());
    attr[14..16].copy_from_slice(&1u16.to_le_bytes());
    let clusters = data_size.div_ceil(512).max(1);
    attr[0x18..0x20].copy_from_slice(&(clusters - 1).to_le_bytes()); // highest VCN
    attr[0x20..0x22].copy_from_slice(&(runs_offset as u16).to_le_bytes());
    attr[0x28..0x30].copy_from_slice(&(clusters * 512).to_le_bytes());
    attr[0x30..0x38].copy_from_slice(&data_size.to_le_bytes());
    attr[0x38..0x40].copy_from_slice(&data_size.to_le_bytes());
    attr[name_offset..name_offset + name_bytes.len()].copy_from_slice(&name_bytes);
    attr.extend_from_slice(runs);
    pad8(&mut attr);
    let len = attr.len() as u32;
    attr[4..8].copy_from_slice(&len.to_le_bytes());
    attr
}

pub fn data_attribute(runs: &[(u64, u64)], data_size: u64) -> Vec<u8> {
    non_resident_attribute(0x80, "", &encode_runs(runs), data_size)
}

/// 1024-byte MFT record holding `attrs` followed by the end marker
pub fn mft_record(record_number: u32, attrs: &[Vec<u8>]) -> Vec<u8> {
    let mut rec = vec![0u8; RECORD_SIZE];
    rec[0..4].copy_from_slice(b"FILE");
    rec[4..6].copy_from_slice(&0x30u16.to_le_bytes()); // USA offset
    rec[6..8].copy_from_slice(&3u16.to_le_bytes()); // USA count
    rec[8..16].copy_from_slice(&0x1234u64.to_le_bytes()); // LSN
    rec[16..18].copy_from_slice(&1u16.to_le_bytes()); // sequence
    rec[18..20].copy_from_slice(&1u16.to_le_bytes()); // links
    rec[20..22].copy_from_slice(&(ATTRS_OFFSET as u16).to_le_bytes());
    rec[22..24].copy_from_slice(&1u16.to_le_bytes()); // in use
    rec[28..32].copy_from_slice(&(RECORD_SIZE as u32).to_le_bytes());
    rec[40..42].copy_from_slice(&(attrs.len() as u16).to_le_bytes());
    rec[44..48].copy_from_slice(&record_number.to_le_bytes());

    let mut pos = ATTRS_OFFSET;
    for attr in attrs {
        rec[pos..pos + attr.len()].copy_from_slice(attr);
        pos += attr.len();
    }
    rec[pos..pos + 4].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
    let used = (pos + 8) as u32;
    rec[24..28].copy_from_slice(&used.to_le_bytes());
    rec
}

/// Record named `name` whose $DATA attribute holds `runs`
pub fn named_file_record(name: &str, runs: &[(u64, u64)], data_size: u64) -> Vec<u8> {
    mft_record(
        0,
        &[file_name_attribute(name, NS_WIN32), data_attribute(runs, data_size)],
    )
}

/// 512-byte NTFS boot sector
pub fn boot_sector(
    bytes_per_sector: u16,
    sectors_per_cluster: u8,
    total_sectors: u64,
    mft_lcn: u64,
    mirror_lcn: u64,
) -> Vec<u8> {
    let mut data = vec![0u8; 512];
    data[0..3].copy_from_slice(&[0xEB, 0x52, 0x90]);
    data[3..11].copy_from_slice(b"NTFS    ");
    data[0x0B..0x0D].copy_from_slice(&bytes_per_sector.to_le_bytes());
    data[0x0D] = sectors_per_cluster;
    data[0x15] = 0xF8;
    data[0x28..0x30].copy_from_slice(&total_sectors.to_le_bytes());
    data[0x30..0x38].copy_from_slice(&mft_lcn.to_le_bytes());
    data[0x38..0x40].copy_from_slice(&mirror_lcn.to_le_bytes());
    data[0x40] = 0xF6;
    data[0x1FE] = 0x55;
    data[0x1FF] = 0xAA;
    data
}

/// Copy `bytes` into `image` at `offset`, growing it if needed
pub fn place(image: &mut Vec<u8>, offset: usize, bytes: &[u8]) {
    if image.len() < offset + bytes.len() {
        image.resize(offset + bytes.len(), 0);
    }
    image[offset..offset + bytes.len()].copy_from_slice(bytes);
}
