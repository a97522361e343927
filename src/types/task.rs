//! Task identifiers and task kinds

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

static NEXT_FRESH_ID: AtomicI64 = AtomicI64::new(TaskId::FRESH_BASE);

/// Opaque 64-bit handle for a lightweight task.
///
/// Ids are assigned by the host runtime and never interpreted here, with one
/// exception: [`TaskId::NONE`] means "no task is running" and encodes as `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl TaskId {
    /// Sentinel for "no current task".
    pub const NONE: TaskId = TaskId(-1);

    /// Create a task id from the runtime's raw value.
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// First id handed out by [`TaskId::fresh`].
    ///
    /// Ids from `2^62` upward are reserved for primitives this crate creates
    /// itself; a host runtime must not issue ids in this range.
    pub const FRESH_BASE: i64 = 1 << 62;

    /// Allocate an id from the process-wide counter in the reserved range.
    pub fn fresh() -> Self {
        Self(NEXT_FRESH_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Whether this id came from [`TaskId::fresh`].
    pub const fn is_fresh(self) -> bool {
        self.0 >= Self::FRESH_BASE
    }

    /// Raw value as written to the trace.
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Whether this is the "no current task" sentinel.
    pub const fn is_none(self) -> bool {
        self.0 == Self::NONE.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        TaskId::NONE
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() { f.write_str("none") } else { write!(f, "{}", self.0) }
    }
}

/// How a task came into existence.
///
/// Written as a single byte in CREATE events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TaskKind {
    Wait = 0,
    Task = 1,
    Bind = 2,
    Try = 3,
    Choose = 4,
    Pick = 5,
    Join = 6,
    Map = 7,
    Condition = 8,
    OnSuccess = 9,
    OnFailure = 10,
    OnTermination = 11,
    OnAny = 12,
    IgnoreResult = 13,
    Async = 14,
}

impl TaskKind {
    /// Every kind, in code order.
    pub const ALL: [TaskKind; 15] = [
        TaskKind::Wait,
        TaskKind::Task,
        TaskKind::Bind,
        TaskKind::Try,
        TaskKind::Choose,
        TaskKind::Pick,
        TaskKind::Join,
        TaskKind::Map,
        TaskKind::Condition,
        TaskKind::OnSuccess,
        TaskKind::OnFailure,
        TaskKind::OnTermination,
        TaskKind::OnAny,
        TaskKind::IgnoreResult,
        TaskKind::Async,
    ];

    /// One-byte code written to the trace.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Look up a kind by its trace code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}
