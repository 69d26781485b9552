// NTFS Data Run decoder
// Decode runlists for non-resident attributes

use log::trace;
use std::collections::BTreeMap;

/// Cluster runs of a non-resident attribute, keyed by starting LCN.
///
/// Iteration is in ascending LCN order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunList {
    runs: BTreeMap<u64, u64>,
}

impl RunList {
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// `(lcn, length in clusters)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.runs.iter().map(|(&lcn, &len)| (lcn, len))
    }

    /// Lowest LCN of any run
    pub fn first_cluster(&self) -> Option<u64> {
        self.runs.keys().next().copied()
    }

    pub fn total_clusters(&self) -> u64 {
        self.runs.values().sum()
    }
}

impl FromIterator<(u64, u64)> for RunList {
    fn from_iter<I: IntoIterator<Item = (u64, u64)>>(iter: I) -> Self {
        Self {
            runs: iter.into_iter().collect(),
        }
    }
}

/// Decode NTFS data runs from raw bytes.
///
/// Each entry is a header byte whose low nibble is the width of the run
/// length and whose high nibble is the width of the signed LCN delta that
/// follows it. The delta is applied to a running LCN which then advances by
/// the run length. A zero header ends the list; a truncated entry ends it too.
pub fn decode_data_runs(data: &[u8]) -> RunList {
    let mut runs = BTreeMap::new();
    let mut pos = 0;
    let mut lcn = 0u64;

    while pos < data.len() {
        let header = data[pos];
        if header == 0 {
            break; // End marker
        }
        pos += 1;

        let length_size = (header & 0x0F) as usize;
        let offset_size = ((header >> 4) & 0x0F) as usize;

        if pos + length_size + offset_size > data.len() {
            trace!("Data run truncated at byte {}", pos - 1);
            break;
        }

        let length = read_le_bytes(&data[pos..pos + length_size]);
        pos += length_size;

        let delta = read_le_bytes_signed(&data[pos..pos + offset_size]);
        pos += offset_size;

        lcn = lcn.wrapping_add(delta as u64);
        trace!("run: lcn {:#x}, {:#x} clusters", lcn, length);
        runs.insert(lcn, length);
        lcn = lcn.wrapping_add(length);
    }

    RunList { runs }
}

/// Read little-endian bytes as unsigned integer
fn read_le_bytes(bytes: &[u8]) -> u64 {
    let mut value = 0u64;
    for (i, &byte) in bytes.iter().take(8).enumerate() {
        value |= (byte as u64) << (i * 8);
    }
    value
}

/// Read little-endian bytes as signed integer
fn read_le_bytes_signed(bytes: &[u8]) -> i64 {
    if bytes.is_empty() {
        return 0;
    }
    let bytes = &bytes[..bytes.len().min(8)];
    let value = read_le_bytes(bytes) as i64;

    // Sign extend if negative
    let bits = bytes.len() * 8;
    if bits < 64 && (value & (1 << (bits - 1))) != 0 {
        value | !((1i64 << bits) - 1)
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::encode_runs;

    #[test]
    fn test_decode_simple_run() {
        // 16 clusters at LCN 100: 1-byte length, 2-byte offset
        let data = vec![0x21, 0x10, 0x64, 0x00, 0x00];

        let runs = decode_data_runs(&data);
        assert_eq!(runs.iter().collect::<Vec<_>>(), vec![(100, 16)]);
        assert_eq!(runs.first_cluster(), Some(100));
    }

    #[test]
    fn test_delta_base_advances_by_length() {
        // 10 clusters at 100, then +100 from the end of that run (110)
        let data = vec![
            0x21, 0x0A, 0x64, 0x00,
            0x21, 0x14, 0x64, 0x00,
            0x00,
        ];

        let runs = decode_data_runs(&data);
        assert_eq!(runs.iter().collect::<Vec<_>>(), vec![(100, 10), (210, 20)]);
        assert_eq!(runs.total_clusters(), 30);
    }

    #[test]
    fn test_negative_delta_is_sign_extended() {
        // 10 clusters at 1000, then -100 relative to 1010
        let data = vec![
            0x22, 0x0A, 0x00, 0xE8, 0x03,
            0x11, 0x05, 0x9C,
            0x00,
        ];

        let runs = decode_data_runs(&data);
        assert_eq!(runs.iter().collect::<Vec<_>>(), vec![(910, 5), (1000, 10)]);
    }

    #[test]
    fn test_stops_at_end_of_buffer() {
        // No terminator, and a truncated trailing entry
        let data = vec![0x11, 0x02, 0x08, 0x21, 0x01];
        let runs = decode_data_runs(&data);
        assert_eq!(runs.iter().collect::<Vec<_>>(), vec![(8, 2)]);

        assert!(decode_data_runs(&[]).is_empty());
        assert!(decode_data_runs(&[0x00, 0x11, 0x01, 0x01]).is_empty());
    }

    #[test]
    fn test_round_trip_with_backward_run() {
        let runs = [(0x1000, 0x20), (0x40, 3), (0x3_0000, 0x180), (0x2_FF00, 1)];
        let decoded = decode_data_runs(&encode_runs(&runs));
        let expected: RunList = runs.iter().copied().collect();
        assert_eq!(decoded, expected);
        assert_eq!(decoded.len(), 4);
    }
}
