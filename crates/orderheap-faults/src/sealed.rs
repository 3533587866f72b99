//! Counters stamped with their own checksum.
//!
//! A damaged counter is still a `u64`, so without the stamp a reader could
//! not tell the placeholder from a real value.

use crate::ops::ValueOps;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SealedCounter {
    value: u64,
    stamp: u32,
}

impl SealedCounter {
    pub fn new(value: u64) -> Self {
        Self { value, stamp: stamp(value) }
    }

    /// The counter, or `None` when the stamp does not match.
    pub fn read(&self) -> Option<u64> {
        (self.stamp == stamp(self.value)).then_some(self.value)
    }

    pub fn is_intact(&self) -> bool {
        self.read().is_some()
    }
}

fn stamp(value: u64) -> u32 {
    crc32c::crc32c(&value.to_le_bytes())
}

/// Damages a counter by inverting its stamp.
#[derive(Debug, Clone, Copy, Default)]
pub struct SealedOps;

impl ValueOps<SealedCounter> for SealedOps {
    fn duplicate(&self, value: &SealedCounter) -> SealedCounter {
        *value
    }

    fn damage(&self, value: &mut SealedCounter) {
        value.stamp = !value.stamp;
    }
}
