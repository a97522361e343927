//! Trace session lifecycle
//!
//! A [`Session`] is either inactive or owns exactly one [`RingBuffer`]. While
//! inactive, [`Session::hooks`] hands out no-op hooks, so instrumented code
//! runs untraced at the cost of a single branch.
//!
//! ```rust
//! use tasktrace::{RingBuffer, Session, TaskId, TraceConfig, TraceHooks};
//!
//! let mut session = Session::new();
//! let ring = RingBuffer::new(&TraceConfig::new(4096, 4))?;
//! let handle = session.start(ring, TaskId::new(1))?;
//!
//! session.hooks().note_label(TaskId::new(1), "main");
//!
//! let ring = session.stop(handle)?;
//! assert!(session.stop(handle).is_err());
//! # Ok::<(), tasktrace::TraceError>(())
//! ```

use std::fmt;
use tracing::debug;

use crate::hooks::{Hooks, NoopHooks, TraceHooks};
use crate::ring::RingBuffer;
use crate::types::TaskId;
use crate::{Result, TraceError};

/// Identity of a started ring buffer.
///
/// Returned by [`Session::start`] and required by [`Session::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(u64);

impl SessionHandle {
    /// Rebuild a handle from its raw value.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
enum SessionState {
    Inactive,
    Active { handle: SessionHandle, ring: RingBuffer },
}

/// Holder of at most one active ring buffer.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    next_handle: u64,
}

impl Session {
    pub const fn new() -> Self {
        Self { state: SessionState::Inactive, next_handle: 1 }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active { .. })
    }

    /// Handle of the running session, if any.
    pub fn active_handle(&self) -> Option<SessionHandle> {
        match &self.state {
            SessionState::Active { handle, .. } => Some(*handle),
            SessionState::Inactive => None,
        }
    }

    /// Install `ring` as the recipient of hook calls.
    ///
    /// Immediately records a SWITCH to `current`, the task the runtime is
    /// running right now.
    pub fn start(&mut self, mut ring: RingBuffer, current: TaskId) -> Result<SessionHandle> {
        if let Some(active) = self.active_handle() {
            return Err(TraceError::AlreadyActive { active });
        }

        let handle = SessionHandle(self.next_handle);
        self.next_handle += 1;

        ring.begin_session();
        ring.note_switch(current);
        debug!(session = %handle, buffer_size = ring.len(), %current, "Trace session started");
        self.state = SessionState::Active { handle, ring };
        Ok(handle)
    }

    /// Detach the ring buffer started under `handle` and return it.
    ///
    /// The active packet is finalized at the write cursor so the returned
    /// buffer describes itself completely.
    pub fn stop(&mut self, handle: SessionHandle) -> Result<RingBuffer> {
        match self.active_handle() {
            None => return Err(TraceError::NotActive),
            Some(active) if active != handle => {
                return Err(TraceError::WrongSession { requested: handle, active });
            }
            Some(_) => {}
        }

        match std::mem::replace(&mut self.state, SessionState::Inactive) {
            SessionState::Active { mut ring, .. } => {
                ring.finalize_active();
                debug!(
                    session = %handle,
                    rollovers = ring.rollovers(),
                    cursor = ring.cursor(),
                    "Trace session stopped"
                );
                Ok(ring)
            }
            SessionState::Inactive => Err(TraceError::NotActive),
        }
    }

    /// The hooks hook calls should go to right now.
    pub fn hooks(&mut self) -> Hooks<'_> {
        match &mut self.state {
            SessionState::Active { ring, .. } => Hooks::Active(ring),
            SessionState::Inactive => Hooks::Noop(NoopHooks),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TraceConfig;
    use crate::test_utils::{ManualClock, Payload, decode_bytes};
    use crate::types::TaskKind;

    fn ring() -> RingBuffer {
        let config = TraceConfig::new(4096, 4);
        RingBuffer::with_clock(&config, Box::new(ManualClock::default())).unwrap()
    }

    #[test]
    fn inactive_session_hands_out_noop_hooks() {
        let mut session = Session::new();
        assert!(!session.is_active());
        let mut hooks = session.hooks();
        assert!(!hooks.is_active());
        hooks.note_label(TaskId(1), "ignored");
    }

    #[test]
    fn start_records_the_current_task() -> anyhow::Result<()> {
        let mut session = Session::new();
        let handle = session.start(ring(), TaskId(9))?;
        session.hooks().note_created(TaskId(9), TaskId(10), TaskKind::Task);
        let ring = session.stop(handle)?;

        let events = decode_bytes(ring.as_bytes())?;
        assert_eq!(
            events,
            vec![
                Payload::Switch { task: TaskId(9) },
                Payload::Create { parent: TaskId(9), child: TaskId(10), kind: 1 },
            ]
        );
        Ok(())
    }

    #[test]
    fn double_stop_is_protocol_misuse() -> anyhow::Result<()> {
        let mut session = Session::new();
        let handle = session.start(ring(), TaskId::NONE)?;
        session.stop(handle)?;
        let err = session.stop(handle).unwrap_err();
        assert!(matches!(err, TraceError::NotActive));
        assert!(err.is_protocol_misuse());
        Ok(())
    }

    #[test]
    fn stopping_with_a_stale_handle_is_rejected() -> anyhow::Result<()> {
        let mut session = Session::new();
        let first = session.start(ring(), TaskId::NONE)?;
        session.stop(first)?;
        let second = session.start(ring(), TaskId::NONE)?;
        assert_ne!(first, second);

        let err = session.stop(first).unwrap_err();
        assert!(matches!(err, TraceError::WrongSession { requested, active }
            if requested == first && active == second));
        assert!(session.is_active());
        session.stop(second)?;
        Ok(())
    }

    #[test]
    fn second_start_is_rejected_while_active() -> anyhow::Result<()> {
        let mut session = Session::new();
        let handle = session.start(ring(), TaskId::NONE)?;
        let err = session.start(ring(), TaskId::NONE).unwrap_err();
        assert!(matches!(err, TraceError::AlreadyActive { active } if active == handle));
        Ok(())
    }

    #[test]
    fn restarting_the_same_ring_writes_another_switch() -> anyhow::Result<()> {
        let mut session = Session::new();
        let handle = session.start(ring(), TaskId(1))?;
        let ring = session.stop(handle)?;
        let before = decode_bytes(ring.as_bytes())?.len();

        let handle = session.start(ring, TaskId(1))?;
        let ring = session.stop(handle)?;
        let events = decode_bytes(ring.as_bytes())?;
        assert_eq!(events.len(), before + 1);
        assert_eq!(events, vec![Payload::Switch { task: TaskId(1) }; 2]);
        Ok(())
    }

    #[test]
    fn restart_begins_with_a_single_switch() -> anyhow::Result<()> {
        let mut session = Session::new();
        let handle = session.start(ring(), TaskId(3))?;
        session.hooks().note_switch(TaskId(4));
        session.stop(handle)?;

        let handle = session.start(ring(), TaskId(4))?;
        let ring = session.stop(handle)?;
        assert_eq!(decode_bytes(ring.as_bytes())?, vec![Payload::Switch { task: TaskId(4) }]);
        Ok(())
    }
}
