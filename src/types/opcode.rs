//! Event opcodes and their payload shapes

use serde::{Deserialize, Serialize};

use crate::{Result, TraceError};

/// Bytes in front of every payload: 8-byte timestamp plus the opcode byte.
pub const EVENT_HEADER_SIZE: usize = 9;

/// One-byte tag identifying an event's kind and payload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    /// parent id, child id, task kind
    Create = 0,
    /// observer id, observed id
    Read = 1,
    /// current id, task id
    Fulfill = 2,
    /// current id, task id, NUL-terminated message
    Fail = 3,
    /// old id, new id
    Becomes = 4,
    /// task id, NUL-terminated label
    Label = 5,
    /// current id, signed amount, NUL-terminated counter name
    Increase = 6,
    /// new active id
    Switch = 7,
    /// pause duration in nanoseconds
    Gc = 8,
}

impl Opcode {
    /// Length of the fixed-width part of the payload.
    ///
    /// For `Fail`, `Label` and `Increase` the NUL-terminated string follows.
    pub const fn fixed_payload_len(self) -> usize {
        match self {
            Opcode::Create => 17,
            Opcode::Read | Opcode::Fulfill | Opcode::Fail | Opcode::Becomes => 16,
            Opcode::Label => 8,
            Opcode::Increase => 16,
            Opcode::Switch | Opcode::Gc => 8,
        }
    }

    /// Whether the payload ends with a NUL-terminated string.
    pub const fn has_text(self) -> bool {
        matches!(self, Opcode::Fail | Opcode::Label | Opcode::Increase)
    }

    /// Largest record any fixed-shape event produces.
    pub const MAX_FIXED_RECORD: usize = EVENT_HEADER_SIZE + 17;
}

impl TryFrom<u8> for Opcode {
    type Error = TraceError;

    fn try_from(byte: u8) -> Result<Self> {
        Ok(match byte {
            0 => Opcode::Create,
            1 => Opcode::Read,
            2 => Opcode::Fulfill,
            3 => Opcode::Fail,
            4 => Opcode::Becomes,
            5 => Opcode::Label,
            6 => Opcode::Increase,
            7 => Opcode::Switch,
            8 => Opcode::Gc,
            other => {
                let details = format!("unknown opcode {other}");
                return Err(TraceError::parse_error("event opcode", details));
            }
        })
    }
}
