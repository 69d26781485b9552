// NTFS on-disk structures used for recovery
// Read-only parsers; nothing here writes to the source

pub mod attributes;
pub mod boot_sector;
pub mod data_runs;
pub mod disk;
pub mod extract;
pub mod mft;
pub mod structures;

pub use attributes::{parse_attribute, Attribute, AttributeBody, FileName};
pub use boot_sector::BootSector;
pub use data_runs::{decode_data_runs, RunList};
pub use disk::NtfsDisk;
pub use extract::{extract_file, DirectorySink, SinkFactory};
pub use mft::MftRecord;
pub use structures::AttributeType;
