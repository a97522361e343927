//! Instrumentation hook interface
//!
//! A host runtime reports task lifecycle transitions through [`TraceHooks`].
//! The ring buffer is the only real implementer; [`NoopHooks`] stands in
//! while no session is running, and [`Hooks`] picks between the two.

use std::fmt::Display;
use std::time::Duration;

use crate::ring::RingBuffer;
use crate::types::{TaskId, TaskKind};

/// Capability set a runtime calls on task lifecycle transitions.
///
/// All ids are passed explicitly; implementations keep no notion of the
/// runtime's current task beyond what [`note_switch`](Self::note_switch)
/// tells them.
pub trait TraceHooks {
    /// `child` was spawned by `parent`.
    fn note_created(&mut self, parent: TaskId, child: TaskId, kind: TaskKind);

    /// `observer` looked at the result of `observed`. Ignored when they are equal.
    fn note_read(&mut self, observer: TaskId, observed: TaskId);

    /// `task` completed, successfully when `failure` is `None`.
    fn note_resolved(&mut self, current: TaskId, task: TaskId, failure: Option<&dyn Display>);

    /// `old` now goes by `new`. Ignored when they are equal.
    fn note_becomes(&mut self, old: TaskId, new: TaskId);

    /// Attach a human-readable label to `task`.
    fn note_label(&mut self, task: TaskId, label: &str);

    /// The scheduler now runs `task`, or nothing when it is [`TaskId::NONE`].
    /// Ignored when `task` is already the last recorded one.
    fn note_switch(&mut self, task: TaskId);

    /// The scheduler stopped running any task.
    fn note_suspend(&mut self) {
        self.note_switch(TaskId::NONE);
    }

    /// Adjust the counter `counter` by `amount` on behalf of `current`.
    fn note_increase(&mut self, current: TaskId, counter: &str, amount: i64);

    /// The memory manager paused for `duration`. Must not allocate.
    fn note_gc(&mut self, duration: Duration);
}

/// Hooks that record nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl TraceHooks for NoopHooks {
    fn note_created(&mut self, _parent: TaskId, _child: TaskId, _kind: TaskKind) {}
    fn note_read(&mut self, _observer: TaskId, _observed: TaskId) {}
    fn note_resolved(&mut self, _current: TaskId, _task: TaskId, _failure: Option<&dyn Display>) {}
    fn note_becomes(&mut self, _old: TaskId, _new: TaskId) {}
    fn note_label(&mut self, _task: TaskId, _label: &str) {}
    fn note_switch(&mut self, _task: TaskId) {}
    fn note_increase(&mut self, _current: TaskId, _counter: &str, _amount: i64) {}
    fn note_gc(&mut self, _duration: Duration) {}
}

/// The hooks currently installed: nothing, or the active ring buffer.
#[derive(Debug)]
pub enum Hooks<'a> {
    Noop(NoopHooks),
    Active(&'a mut RingBuffer),
}

impl Hooks<'_> {
    pub fn is_active(&self) -> bool {
        matches!(self, Hooks::Active(_))
    }
}

macro_rules! dispatch {
    ($self:ident, $hooks:ident => $call:expr) => {
        match $self {
            Hooks::Noop($hooks) => $call,
            Hooks::Active($hooks) => $call,
        }
    };
}

impl TraceHooks for Hooks<'_> {
    fn note_created(&mut self, parent: TaskId, child: TaskId, kind: TaskKind) {
        dispatch!(self, h => h.note_created(parent, child, kind))
    }

    fn note_read(&mut self, observer: TaskId, observed: TaskId) {
        dispatch!(self, h => h.note_read(observer, observed))
    }

    fn note_resolved(&mut self, current: TaskId, task: TaskId, failure: Option<&dyn Display>) {
        dispatch!(self, h => h.note_resolved(current, task, failure))
    }

    fn note_becomes(&mut self, old: TaskId, new: TaskId) {
        dispatch!(self, h => h.note_becomes(old, new))
    }

    fn note_label(&mut self, task: TaskId, label: &str) {
        dispatch!(self, h => h.note_label(task, label))
    }

    fn note_switch(&mut self, task: TaskId) {
        dispatch!(self, h => h.note_switch(task))
    }

    fn note_increase(&mut self, current: TaskId, counter: &str, amount: i64) {
        dispatch!(self, h => h.note_increase(current, counter, amount))
    }

    fn note_gc(&mut self, duration: Duration) {
        dispatch!(self, h => h.note_gc(duration))
    }
}
