//! Core types shared by the write path and its callers.
//!
//! - [`TaskId`] is the runtime's opaque 64-bit task handle, with
//!   [`TaskId::NONE`] as the "no task" sentinel
//! - [`TaskKind`] is the closed set of ways a task can be created
//! - [`Opcode`] tags each event and fixes its payload shape

mod opcode;
mod task;

pub use opcode::{EVENT_HEADER_SIZE, Opcode};
pub use task::{TaskId, TaskKind};
