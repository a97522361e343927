//! Ring buffer geometry configuration
//!
//! ```rust
//! use tasktrace::TraceConfig;
//!
//! let config = TraceConfig::from_yaml_str("buffer_size: 4096\npacket_count: 4\n").unwrap();
//! assert_eq!(config.packet_size(), 1024);
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::packet::PACKET_HEADER_SIZE;
use crate::types::Opcode;
use crate::{Result, TraceError};

/// Default arena size: 1 MiB.
pub const DEFAULT_BUFFER_SIZE: usize = 1 << 20;

/// Default number of packets the arena is split into.
pub const DEFAULT_PACKET_COUNT: usize = 4;

/// Largest packet whose size in bits fits the 32-bit header field.
pub const MAX_PACKET_SIZE: usize = (u32::MAX / 8) as usize;

/// Smallest packet that can hold its header plus any fixed-shape event.
///
/// The extra byte accounts for the rollover rule: an event may end at most
/// one byte before the packet end.
pub const MIN_PACKET_SIZE: usize = PACKET_HEADER_SIZE + Opcode::MAX_FIXED_RECORD + 1;

/// Geometry of a ring buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TraceConfig {
    /// Total arena size in bytes
    pub buffer_size: usize,
    /// Number of packets; the last one absorbs any remainder
    pub packet_count: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self { buffer_size: DEFAULT_BUFFER_SIZE, packet_count: DEFAULT_PACKET_COUNT }
    }
}

impl TraceConfig {
    pub fn new(buffer_size: usize, packet_count: usize) -> Self {
        Self { buffer_size, packet_count }
    }

    /// Parse and validate a YAML configuration.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: TraceConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        debug!(
            buffer_size = config.buffer_size,
            packet_count = config.packet_count,
            "Loaded trace configuration"
        );
        Ok(config)
    }

    /// Size of every packet except possibly the last.
    pub fn packet_size(&self) -> usize {
        self.buffer_size.checked_div(self.packet_count).unwrap_or(0)
    }

    /// Size of the last packet, which absorbs the remainder.
    pub fn last_packet_size(&self) -> usize {
        match self.packet_count {
            0 => 0,
            n => self.buffer_size - self.packet_size() * (n - 1),
        }
    }

    /// Reject geometry the ring buffer cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.packet_count == 0 {
            return Err(TraceError::invalid_config("packet_count must be at least 1"));
        }

        let packet_size = self.packet_size();
        if packet_size < MIN_PACKET_SIZE {
            return Err(TraceError::invalid_config(format!(
                "packets of {} bytes cannot hold a {}-byte header plus a {}-byte event",
                packet_size,
                PACKET_HEADER_SIZE,
                Opcode::MAX_FIXED_RECORD
            )));
        }

        let last = self.last_packet_size();
        if last > MAX_PACKET_SIZE {
            return Err(TraceError::invalid_config(format!(
                "packet of {} bytes exceeds the {} byte limit of the header size field",
                last, MAX_PACKET_SIZE
            )));
        }

        Ok(())
    }
}
