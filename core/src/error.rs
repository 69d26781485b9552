use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Read of {len} bytes at {position:#x} beyond end of source ({size:#x})")]
    OutOfRange { position: u64, len: u64, size: u64 },

    #[error("Not an NTFS boot sector")]
    NotBootSector,

    #[error("Not an MFT record: magic {0:#010x}")]
    NotMftRecord(u32),

    #[error("Attribute out of range: {0}")]
    AttributeBounds(String),

    #[error("Attribute too large: {0} bytes")]
    AttributeTooLarge(u64),

    #[error("Cluster size unknown, can't save {0}")]
    ClusterSizeUnknown(String),

    #[error("Geometry inconsistent: {0}")]
    Geometry(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl RecoveryError {
    /// Whole-run preconditions the user has to resolve. Everything else is
    /// scoped to a single scan position.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RecoveryError::ClusterSizeUnknown(_) | RecoveryError::Geometry(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RecoveryError>;
