//! Error types for trace sessions.
//!
//! The write path itself never returns errors: hook calls are no-ops when no
//! session is running, and a corrupted write cursor is a fatal invariant
//! violation that panics. What remains are the programmer-facing failures
//! around configuration and the session lifecycle.
//!
//! ## Error Categories
//!
//! - **Configuration Errors**: buffer geometry that cannot hold the event mix
//! - **Protocol Misuse**: stopping a session that is not running, or stopping
//!   with a handle that does not belong to the active session
//! - **Parse Errors**: packet headers that fail inspection
//!
//! ## Helper Constructors
//!
//! ```rust
//! use tasktrace::TraceError;
//!
//! let config_error = TraceError::invalid_config("packet_count must be at least 1");
//! assert!(!config_error.is_protocol_misuse());
//!
//! let parse_error = TraceError::parse_error("packet header", "bad magic");
//! assert!(parse_error.to_string().contains("bad magic"));
//! ```

use thiserror::Error;

use crate::session::SessionHandle;

/// Result type alias for trace operations.
pub type Result<T, E = TraceError> = std::result::Result<T, E>;

/// Main error type for trace operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    #[error("Invalid trace configuration: {reason}")]
    Config { reason: String },

    #[error("Failed to parse trace configuration")]
    ConfigFormat {
        #[source]
        source: serde_yaml_ng::Error,
    },

    #[error("No trace session is active")]
    NotActive,

    #[error("Trace session {active} is already active")]
    AlreadyActive { active: SessionHandle },

    #[error("Session {requested} is not the active trace session ({active})")]
    WrongSession { requested: SessionHandle, active: SessionHandle },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },
}

impl TraceError {
    /// Returns whether this error reports a misuse of the start/stop protocol.
    pub fn is_protocol_misuse(&self) -> bool {
        matches!(
            self,
            TraceError::NotActive
                | TraceError::AlreadyActive { .. }
                | TraceError::WrongSession { .. }
        )
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            TraceError::Config { .. } => vec![
                "Increase buffer_size or reduce packet_count",
                "Keep labels and counter names shorter than a packet",
            ],
            TraceError::ConfigFormat { .. } => vec![
                "Check the YAML syntax of the trace configuration",
                "Only buffer_size and packet_count are recognised",
            ],
            TraceError::NotActive => vec![
                "Call stop exactly once per start",
                "Check the session was started on this thread",
            ],
            TraceError::AlreadyActive { .. } => {
                vec!["Stop the running session before starting another"]
            }
            TraceError::WrongSession { .. } => {
                vec!["Stop the session with the handle returned by its start call"]
            }
            TraceError::Parse { .. } => vec![
                "Only inspect the buffer while writing is paused",
                "Verify the bytes came from a tasktrace ring buffer",
            ],
        }
    }

    /// Helper constructor for configuration errors.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        TraceError::Config { reason: reason.into() }
    }

    /// Helper constructor for parse errors.
    pub fn parse_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        TraceError::Parse { context: context.into(), details: details.into() }
    }
}

impl From<serde_yaml_ng::Error> for TraceError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        TraceError::ConfigFormat { source: err }
    }
}
