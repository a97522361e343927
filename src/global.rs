//! Runtime-facing trace facade
//!
//! The host runtime drives tracing through free functions backed by one
//! [`Session`] per runtime thread. Every entry point checks for an active
//! session first and does nothing otherwise.
//!
//! # Threads
//!
//! The session is not shared between threads. A runtime that schedules tasks
//! on one thread sees one trace; hook calls from any other thread, including
//! the worker threads of a multi-threaded tokio runtime, are silently
//! dropped. Each thread may run its own session, so several buffers can be
//! active in one process at the same time.
//!
//! [`stop`] must be called on the thread that called [`start`]. Anywhere
//! else it fails with [`TraceError::NotActive`](crate::TraceError::NotActive)
//! and the session keeps running.
//!
//! # GC pauses
//!
//! [`note_gc`] may fire while another event is half written, for example
//! from inside the clock. In that case the session is already borrowed, so
//! the pause is parked in a plain `Cell` and written as its own GC event
//! right after the interrupted event completes. Nothing on this path
//! allocates.

use std::cell::{Cell, RefCell};
use std::fmt::Display;
use std::time::Duration;

use crate::hooks::{Hooks, TraceHooks};
use crate::ring::RingBuffer;
use crate::session::{Session, SessionHandle};
use crate::types::{TaskId, TaskKind};
use crate::Result;

/// Callback a memory manager invokes after each pause.
pub type GcCallback = fn(Duration);

thread_local! {
    static SESSION: RefCell<Session> = const { RefCell::new(Session::new()) };
    static CURRENT_TASK: Cell<TaskId> = const { Cell::new(TaskId::NONE) };
    static PENDING_GC_NS: Cell<Option<u64>> = const { Cell::new(None) };
}

/// Run `f` against the installed hooks, then write any GC pause that fired
/// while `f` was running.
fn with_hooks(f: impl FnOnce(&mut Hooks<'_>)) {
    let _ = SESSION.try_with(|cell| {
        // A borrowed session means we are inside another event's write; only
        // the GC path is expected to get here and it has its own handling.
        let Ok(mut session) = cell.try_borrow_mut() else {
            return;
        };
        let mut hooks = session.hooks();
        f(&mut hooks);
        flush_pending_gc(&mut hooks);
    });
}

/// Pauses that fire while a parked one is being written are parked again and
/// picked up by the next iteration. Without an active session they are
/// dropped.
fn flush_pending_gc(hooks: &mut Hooks<'_>) {
    while let Some(nanos) = PENDING_GC_NS.with(Cell::take) {
        hooks.note_gc(Duration::from_nanos(nanos));
    }
}

/// Start tracing into `ring` on this thread.
///
/// The trace opens with a SWITCH to the task last reported through
/// [`note_switch`]. Only hook calls made on this thread are recorded, and the
/// session has to be stopped from this thread too.
pub fn start(ring: RingBuffer) -> Result<SessionHandle> {
    let current = current_task();
    SESSION.with(|cell| {
        let mut session = cell.borrow_mut();
        let handle = session.start(ring, current)?;
        flush_pending_gc(&mut session.hooks());
        Ok(handle)
    })
}

/// Stop the session started under `handle` and return its ring buffer.
///
/// Fails when no session is running on this thread or `handle` belongs to a
/// different one. A session started on another thread counts as not running.
pub fn stop(handle: SessionHandle) -> Result<RingBuffer> {
    SESSION.with(|cell| {
        let mut session = cell.borrow_mut();
        flush_pending_gc(&mut session.hooks());
        session.stop(handle)
    })
}

/// Whether a session is running on this thread.
pub fn is_active() -> bool {
    SESSION
        .try_with(|cell| cell.try_borrow().map(|s| s.is_active()).unwrap_or(true))
        .unwrap_or(false)
}

/// The task the runtime last reported as running.
pub fn current_task() -> TaskId {
    CURRENT_TASK.with(Cell::get)
}

/// Attach `text` as a label to the current task.
pub fn label(text: &str) {
    let current = current_task();
    with_hooks(|hooks| hooks.note_label(current, text));
}

/// The scheduler is about to block with no task running.
pub fn note_suspend() {
    with_hooks(|hooks| hooks.note_suspend());
}

/// The scheduler woke up and continues with the current task.
pub fn note_resume() {
    let current = current_task();
    with_hooks(|hooks| hooks.note_switch(current));
}

/// Adjust a named counter on behalf of the current task.
pub fn note_increase(counter: &str, amount: i64) {
    let current = current_task();
    with_hooks(|hooks| hooks.note_increase(current, counter, amount));
}

/// `child` was created while `parent` ran.
pub fn note_created(parent: TaskId, child: TaskId, kind: TaskKind) {
    with_hooks(|hooks| hooks.note_created(parent, child, kind));
}

/// The current task observed the result of `observed`.
pub fn note_read(observed: TaskId) {
    let current = current_task();
    with_hooks(|hooks| hooks.note_read(current, observed));
}

/// `task` completed, failing with `failure` if given.
pub fn note_resolved(task: TaskId, failure: Option<&dyn Display>) {
    let current = current_task();
    with_hooks(|hooks| hooks.note_resolved(current, task, failure));
}

/// `old` now goes by `new`.
pub fn note_becomes(old: TaskId, new: TaskId) {
    with_hooks(|hooks| hooks.note_becomes(old, new));
}

/// Attach `text` as a label to `task`.
pub fn note_label(task: TaskId, text: &str) {
    with_hooks(|hooks| hooks.note_label(task, text));
}

/// The runtime now runs `task`, or nothing for [`TaskId::NONE`].
///
/// Remembered even while tracing is off, so a later [`start`] knows which
/// task is current.
pub fn note_switch(task: TaskId) {
    CURRENT_TASK.with(|c| c.set(task));
    with_hooks(|hooks| hooks.note_switch(task));
}

/// Record a memory-manager pause. Safe to call while another event is being
/// written, and never allocates.
pub fn note_gc(duration: Duration) {
    let _ = SESSION.try_with(|cell| match cell.try_borrow_mut() {
        Ok(mut session) => {
            let mut hooks = session.hooks();
            hooks.note_gc(duration);
            flush_pending_gc(&mut hooks);
        }
        Err(_) => {
            let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
            PENDING_GC_NS.with(|p| p.set(Some(p.get().unwrap_or(0).saturating_add(nanos))));
        }
    });
}

/// The function to register with a memory manager for pause notifications.
pub fn gc_callback() -> GcCallback {
    note_gc
}
