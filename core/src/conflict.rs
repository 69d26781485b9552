// First-writer-wins values
// Quantities that should be constant across a volume (cluster size, MFT cluster,
// sector count) are observed many times during a scan; the first observation is kept
// and any disagreement is reported to the caller.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictTracked<T> {
    value: Option<T>,
    conflicts: u32,
}

impl<T: Copy + PartialEq> ConflictTracked<T> {
    pub fn new() -> Self {
        Self {
            value: None,
            conflicts: 0,
        }
    }

    /// Record an observation. Returns `true` when it disagreed with the value
    /// already held; the held value is never replaced.
    pub fn set(&mut self, value: T) -> bool {
        match self.value {
            None => {
                self.value = Some(value);
                false
            }
            Some(held) if held == value => false,
            Some(_) => {
                self.conflicts += 1;
                true
            }
        }
    }

    pub fn get(&self) -> Option<T> {
        self.value
    }

    pub fn is_known(&self) -> bool {
        self.value.is_some()
    }

    /// Number of disagreeing observations seen so far
    pub fn conflicts(&self) -> u32 {
        self.conflicts
    }
}

impl<T: Copy + PartialEq> From<Option<T>> for ConflictTracked<T> {
    fn from(value: Option<T>) -> Self {
        Self {
            value,
            conflicts: 0,
        }
    }
}
