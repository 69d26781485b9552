// Disk geometry inference
// Derives the volume start and cluster size from where $MFT entries and boot
// sectors were found relative to each other.

use crate::ntfs::structures::SECTOR_SIZE;
use crate::scan::ScanEvidence;
use log::{info, warn};
use ntfsrd_core::{RecoveryError, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

pub const MIN_CLUSTER_SIZE: u32 = 0x200;
pub const MAX_CLUSTER_SIZE: u32 = 0x1_0000;

/// Where the volume's two boot sector copies are
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BootBracket {
    /// Both copies located or inferred; every `$MFT` entry lies between them
    Bracketed {
        first_boot: u64,
        second_boot: u64,
        /// Distance between the copies when it disagrees with the sector count
        size_mismatch: Option<u64>,
    },
    /// Not enough boot sector evidence to bracket the volume
    Underdetermined { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteSource {
    Mft,
    Mirror,
}

/// One `$MFT` entry's vote for a disk start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoteEntry {
    pub record_index: usize,
    pub offset: u64,
    pub cluster_size: u32,
    pub source: VoteSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiskStartCandidate {
    pub disk_start: u64,
    pub cluster_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeometryReport {
    pub bracket: BootBracket,
    /// Plausible disk starts in ascending order
    pub candidates: Vec<DiskStartCandidate>,
}

fn all_between(entries: &BTreeSet<u64>, low: u64, high: u64) -> bool {
    entries.iter().all(|&e| low < e && e < high)
}

/// Check that the `$MFT` entries sit inside the volume the boot sectors
/// delimit. Inconsistent placements are fatal.
pub fn check_boot_bracket(
    boot_offsets: &BTreeSet<u64>,
    mft_entries: &BTreeSet<u64>,
    sector_count: Option<u64>,
) -> Result<BootBracket> {
    let boots: Vec<u64> = boot_offsets.iter().copied().collect();
    let volume_size = sector_count.and_then(|n| n.checked_mul(SECTOR_SIZE));

    match (boots.as_slice(), volume_size) {
        (&[first, second], _) => {
            if !all_between(mft_entries, first, second) {
                return Err(RecoveryError::Geometry(format!(
                    "not all entries between boot sectors {:#x} .. {:#x}, mft: {:x?}; reduce disk size",
                    first, second, mft_entries
                )));
            }
            let span = second - first;
            let size_mismatch = match volume_size {
                Some(size) if size != span => {
                    warn!(
                        "boot sectors {:#x} apart, sector count says {:#x}",
                        span, size
                    );
                    Some(span)
                }
                _ => None,
            };
            Ok(BootBracket::Bracketed {
                first_boot: first,
                second_boot: second,
                size_mismatch,
            })
        }
        (&[found], Some(size)) => {
            if mft_entries.iter().all(|&e| found < e) {
                let second = found.checked_add(size).ok_or_else(|| {
                    RecoveryError::Geometry(format!("volume at {:#x} overflows", found))
                })?;
                if !mft_entries.iter().all(|&e| e < second) {
                    return Err(RecoveryError::Geometry(format!(
                        "entries after inferred second boot sector {:#x}: multiple volumes, specify a better disk size",
                        second
                    )));
                }
                Ok(BootBracket::Bracketed {
                    first_boot: found,
                    second_boot: second,
                    size_mismatch: None,
                })
            } else if mft_entries.iter().all(|&e| e < found) {
                let first = found.checked_sub(size).ok_or_else(|| {
                    RecoveryError::Geometry(format!(
                        "inferred first boot sector before disk start ({:#x} < {:#x}): specify a smaller disk start",
                        found, size
                    ))
                })?;
                if !mft_entries.iter().all(|&e| first < e) {
                    return Err(RecoveryError::Geometry(format!(
                        "entries before inferred first boot sector {:#x}: multiple volumes, specify a better disk start",
                        first
                    )));
                }
                Ok(BootBracket::Bracketed {
                    first_boot: first,
                    second_boot: found,
                    size_mismatch: None,
                })
            } else {
                Err(RecoveryError::Geometry(format!(
                    "entries before and after boot sector {:#x}: multiple volumes, reduce disk size",
                    found
                )))
            }
        }
        (&[_], None) => Ok(BootBracket::Underdetermined {
            reason: "one boot sector and no sector count".to_string(),
        }),
        _ => Ok(BootBracket::Underdetermined {
            reason: format!(
                "{} boot sectors found: cluster size and disk start must be given to extract files",
                boots.len()
            ),
        }),
    }
}

/// Cluster sizes worth trying: the known one, or every power of two in range
pub fn candidate_cluster_sizes(known: Option<u32>) -> Vec<u32> {
    match known {
        Some(size) if size > 0 => vec![size],
        _ => std::iter::successors(Some(MIN_CLUSTER_SIZE), |&cs| cs.checked_mul(2))
            .take_while(|&cs| cs <= MAX_CLUSTER_SIZE)
            .collect(),
    }
}

/// For every entry and cluster size, the disk start implied by reading the
/// entry as the MFT copy and as the mirror copy.
pub fn collect_votes(
    mft_entries: &BTreeSet<u64>,
    mft_cluster: u64,
    mirror_cluster: u64,
    cluster_size: Option<u32>,
) -> BTreeMap<u64, Vec<VoteEntry>> {
    let mut votes: BTreeMap<u64, Vec<VoteEntry>> = BTreeMap::new();
    let sizes = candidate_cluster_sizes(cluster_size);

    for (record_index, &offset) in mft_entries.iter().enumerate() {
        for &cs in &sizes {
            for (lcn, source) in [(mirror_cluster, VoteSource::Mirror), (mft_cluster, VoteSource::Mft)] {
                let start = lcn
                    .checked_mul(cs as u64)
                    .and_then(|bytes| offset.checked_sub(bytes));
                if let Some(disk_start) = start {
                    votes.entry(disk_start).or_default().push(VoteEntry {
                        record_index,
                        offset,
                        cluster_size: cs,
                        source,
                    });
                }
            }
        }
    }
    votes
}

/// Buckets holding exactly one MFT and one mirror vote at the same size
pub fn plausible_disk_starts(votes: &BTreeMap<u64, Vec<VoteEntry>>) -> Vec<DiskStartCandidate> {
    votes
        .iter()
        .filter_map(|(&disk_start, entries)| match entries.as_slice() {
            [a, b] if a.cluster_size == b.cluster_size && a.source != b.source => {
                Some(DiskStartCandidate {
                    disk_start,
                    cluster_size: a.cluster_size,
                })
            }
            _ => None,
        })
        .collect()
}

/// Run both checks over the scan evidence. A bracket inconsistency is fatal;
/// missing evidence only leaves parts of the report empty.
pub fn infer_geometry(evidence: &ScanEvidence) -> Result<GeometryReport> {
    let bracket = check_boot_bracket(
        &evidence.boot_offsets,
        &evidence.mft_entry_offsets,
        evidence.sector_count.get(),
    )?;
    if let BootBracket::Underdetermined { reason } = &bracket {
        info!("cannot derive geometry from boot sectors: {}", reason);
    }

    let candidates = match (evidence.mft_cluster.get(), evidence.mirror_cluster.get()) {
        (Some(mft), Some(mirror)) => {
            let votes = collect_votes(
                &evidence.mft_entry_offsets,
                mft,
                mirror,
                evidence.cluster_size,
            );
            plausible_disk_starts(&votes)
        }
        _ => {
            info!("MFT and mirror clusters both needed to vote on disk start");
            Vec::new()
        }
    };
    for candidate in &candidates {
        info!(
            "possible diskstart: {:#x} (cluster size {:#x})",
            candidate.disk_start, candidate.cluster_size
        );
    }

    Ok(GeometryReport { bracket, candidates })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(values: &[u64]) -> BTreeSet<u64> {
        values.iter().copied().collect()
    }

    #[test]
    fn test_two_boots_bracket_entries() {
        let bracket = check_boot_bracket(&set(&[0x1000, 0x800]), &set(&[0x900, 0xF00]), Some(4)).unwrap();
        assert_eq!(
            bracket,
            BootBracket::Bracketed {
                first_boot: 0x800,
                second_boot: 0x1000,
                size_mismatch: None,
            }
        );
    }

    #[test]
    fn test_two_boots_with_entry_outside_fail() {
        let err = check_boot_bracket(&set(&[0x800, 0x1000]), &set(&[0x900, 0x1200]), Some(4)).unwrap_err();
        assert!(matches!(err, RecoveryError::Geometry(_)));
        assert!(err.is_fatal());

        // An entry on a boot sector is not strictly between
        assert!(check_boot_bracket(&set(&[0x800, 0x1000]), &set(&[0x800]), None).is_err());
    }

    #[test]
    fn test_two_boots_size_mismatch_is_reported() {
        let bracket = check_boot_bracket(&set(&[0, 0x1000]), &set(&[0x400]), Some(4)).unwrap();
        assert_eq!(
            bracket,
            BootBracket::Bracketed {
                first_boot: 0,
                second_boot: 0x1000,
                size_mismatch: Some(0x1000),
            }
        );
    }

    #[test]
    fn test_single_boot_as_first_copy() {
        let bracket = check_boot_bracket(&set(&[0x200]), &set(&[0x400, 0x800]), Some(8)).unwrap();
        assert_eq!(
            bracket,
            BootBracket::Bracketed {
                first_boot: 0x200,
                second_boot: 0x1200,
                size_mismatch: None,
            }
        );

        let err = check_boot_bracket(&set(&[0x200]), &set(&[0x400, 0x2000]), Some(8)).unwrap_err();
        assert!(err.to_string().contains("multiple volumes"));
    }

    #[test]
    fn test_single_boot_as_second_copy() {
        let bracket = check_boot_bracket(&set(&[0x3000]), &set(&[0x2400]), Some(8)).unwrap();
        assert_eq!(
            bracket,
            BootBracket::Bracketed {
                first_boot: 0x2000,
                second_boot: 0x3000,
                size_mismatch: None,
            }
        );

        // Inferred first copy would start before the source
        assert!(check_boot_bracket(&set(&[0x800]), &set(&[0x400]), Some(8)).is_err());
        // Entry before the inferred first copy
        assert!(check_boot_bracket(&set(&[0x3000]), &set(&[0x1000, 0x2400]), Some(8)).is_err());
    }

    #[test]
    fn test_single_boot_with_entries_on_both_sides_fails() {
        let err = check_boot_bracket(&set(&[0x1000]), &set(&[0x400, 0x1400]), Some(8)).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_underdetermined_cases() {
        for boots in [set(&[]), set(&[0, 0x1000, 0x2000])] {
            assert!(matches!(
                check_boot_bracket(&boots, &set(&[0x400]), Some(8)).unwrap(),
                BootBracket::Underdetermined { .. }
            ));
        }
        assert!(matches!(
            check_boot_bracket(&set(&[0x200]), &set(&[0x400]), None).unwrap(),
            BootBracket::Underdetermined { .. }
        ));
    }

    #[test]
    fn test_candidate_sizes() {
        assert_eq!(candidate_cluster_sizes(Some(4096)), vec![4096]);
        let all = candidate_cluster_sizes(None);
        assert_eq!(all.first(), Some(&0x200));
        assert_eq!(all.last(), Some(&0x1_0000));
        assert_eq!(all.len(), 8);
        assert_eq!(candidate_cluster_sizes(Some(0)).len(), 8);
    }

    #[test]
    fn test_voting_finds_disk_start() {
        let disk_start = 0x10_0000u64;
        let entries = set(&[disk_start + 4 * 4096, disk_start + 4096 * 4096]);

        let votes = collect_votes(&entries, 4, 4096, None);
        assert_eq!(
            plausible_disk_starts(&votes),
            vec![DiskStartCandidate {
                disk_start,
                cluster_size: 4096,
            }]
        );

        let bucket = &votes[&disk_start];
        assert_eq!(bucket.len(), 2);
        assert!(bucket.iter().any(|v| v.source == VoteSource::Mft && v.record_index == 0));
        assert!(bucket.iter().any(|v| v.source == VoteSource::Mirror && v.record_index == 1));
    }

    #[test]
    fn test_voting_with_known_cluster_size() {
        let entries = set(&[4 * 4096, 4096 * 4096]);
        let votes = collect_votes(&entries, 4, 4096, Some(4096));
        assert_eq!(votes.values().map(Vec::len).sum::<usize>(), 3); // one negative start dropped
        assert_eq!(
            plausible_disk_starts(&votes),
            vec![DiskStartCandidate {
                disk_start: 0,
                cluster_size: 4096,
            }]
        );
    }

    #[test]
    fn test_single_entry_has_no_candidates() {
        let votes = collect_votes(&set(&[0x10_4000]), 4, 4096, None);
        assert!(plausible_disk_starts(&votes).is_empty());
    }

    #[test]
    fn test_infer_without_clusters_skips_voting() {
        let evidence = ScanEvidence {
            mft_entry_offsets: set(&[0x4000]),
            ..ScanEvidence::default()
        };
        let report = infer_geometry(&evidence).unwrap();
        assert!(report.candidates.is_empty());
        assert!(matches!(report.bracket, BootBracket::Underdetermined { .. }));
    }
}
