// ntfsrd recovery library
// Signature scanning, NTFS metadata parsing, file extraction and geometry inference

pub mod geometry;
pub mod ntfs;
pub mod scan;

#[cfg(test)]
mod test_helpers;

pub use geometry::{infer_geometry, BootBracket, DiskStartCandidate, GeometryReport};
pub use ntfs::{BootSector, DirectorySink, MftRecord, NtfsDisk, SinkFactory};
pub use scan::{ScanEvidence, ScanOptions, Scanner};
