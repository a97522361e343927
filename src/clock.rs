//! Timestamp sources
//!
//! Every event starts with an 8-byte timestamp that the clock writes straight
//! into the arena. Clocks are trusted: they must write exactly 8 bytes at the
//! given offset and must not allocate, since the GC path calls them too.

use std::time::Instant;

/// Source of event timestamps.
pub trait Clock {
    /// Write the current time as 8 little-endian bytes at `buf[offset..offset + 8]`.
    fn write_timestamp(&self, buf: &mut [u8], offset: usize);
}

/// Nanoseconds elapsed since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }

    /// Nanoseconds since creation, saturating at `u64::MAX`.
    pub fn now_ns(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn write_timestamp(&self, buf: &mut [u8], offset: usize) {
        buf[offset..offset + 8].copy_from_slice(&self.now_ns().to_le_bytes());
    }
}
