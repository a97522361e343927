//! Binary tracing of task lifecycles for cooperative runtimes.
//!
//! tasktrace records what a runtime's tasks do (who created whom, who waited
//! on whom, when the scheduler switched between them) into a fixed-size,
//! preallocated ring buffer. The buffer is split into self-describing packets,
//! so after a session stops its bytes can be handed to any reader that knows
//! the packet format, without further framing.
//!
//! # Features
//!
//! - **Bounded memory**: one allocation at start, oldest packets are overwritten
//! - **Cheap when off**: every hook is a no-op without an active session
//! - **GC safe**: pause notifications never allocate, even mid-write
//! - **Async aware**: labelled wait points and cancellable tasks for tokio
//!
//! # Quick Start
//!
//! ```rust
//! use tasktrace::{PacketHeader, RingBuffer, TaskId, TaskKind, TraceConfig};
//!
//! let ring = RingBuffer::new(&TraceConfig::new(4096, 4))?;
//!
//! tasktrace::note_switch(TaskId::new(1));
//! let handle = tasktrace::start(ring)?;
//!
//! let child = TaskId::fresh();
//! tasktrace::note_created(TaskId::new(1), child, TaskKind::Task);
//! tasktrace::note_label(child, "load config");
//! tasktrace::note_resolved(child, None);
//!
//! let ring = tasktrace::stop(handle)?;
//! let header = PacketHeader::parse_from_memory(ring.as_bytes())?;
//! assert!(!header.is_empty());
//! # Ok::<(), tasktrace::TraceError>(())
//! ```

// Core types and error handling
mod clock;
mod config;
mod encode;
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Buffer and write path
mod hooks;
mod packet;
mod ring;
mod session;

// Runtime-facing surface
pub mod global;
pub mod primitives;

// Core exports
pub use clock::{Clock, MonotonicClock};
pub use config::{
    DEFAULT_BUFFER_SIZE, DEFAULT_PACKET_COUNT, MAX_PACKET_SIZE, MIN_PACKET_SIZE, TraceConfig,
};
pub use error::*;
pub use types::*;

// Buffer exports
pub use hooks::{Hooks, NoopHooks, TraceHooks};
pub use packet::{FORMAT_ID, PACKET_HEADER_SIZE, PACKET_MAGIC, PacketHeader};
pub use ring::RingBuffer;
pub use session::{Session, SessionHandle};

// Facade exports
pub use global::*;
