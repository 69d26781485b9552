pub mod conflict;
pub mod device;
pub mod error;
pub mod source;
pub mod timer;

pub use conflict::ConflictTracked;
pub use device::{is_block_device, open_source, DeviceSource};
pub use error::{RecoveryError, Result};
pub use source::{ByteSource, MemorySource, MmapSource, OffsetSource, SliceSource};
pub use timer::RateTimer;
