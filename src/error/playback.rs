// Playback error types and constants

use crate::engine::backend::BackendKind;
use crate::error::{AdapterError, ErrorCode};
use flutter_rust_bridge::frb;
use log::error;
use serde::Serialize;
use std::fmt;

/// Playback error code constants exposed to Dart via FFI
///
/// Error code range: 1201-1202
#[frb(unignore)]
pub struct PlaybackErrorCodes {}

impl PlaybackErrorCodes {
    /// The backend rejected play/pause/stop/seek on a loaded handle
    pub const REJECTED: i32 = 1201;

    /// Playback state lock was poisoned
    pub const LOCK_POISONED: i32 = 1202;
}

/// Log a playback error with structured context
pub fn log_playback_error(err: &PlaybackError, context: &str) {
    error!(
        "Playback error in {}: code={}, component=PlaybackController, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Playback control errors
///
/// Calls on an empty controller are no-ops rather than errors, so the only
/// failures here come from the backend itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaybackError {
    /// The backend refused the operation
    Rejected {
        backend: BackendKind,
        operation: &'static str,
        error: AdapterError,
    },

    /// Mutex was poisoned by a panicking status listener
    LockPoisoned { component: String },
}

impl ErrorCode for PlaybackError {
    fn code(&self) -> i32 {
        match self {
            PlaybackError::Rejected { .. } => PlaybackErrorCodes::REJECTED,
            PlaybackError::LockPoisoned { .. } => PlaybackErrorCodes::LOCK_POISONED,
        }
    }

    fn message(&self) -> String {
        match self {
            PlaybackError::Rejected {
                backend,
                operation,
                error,
            } => format!("{} rejected {}: {}", backend, operation, error),
            PlaybackError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
        }
    }
}

impl fmt::Display for PlaybackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlaybackError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for PlaybackError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_message_names_backend_and_operation() {
        let err = PlaybackError::Rejected {
            backend: BackendKind::MediaElement,
            operation: "seek",
            error: AdapterError::Rejected {
                reason: "not seekable".to_string(),
            },
        };
        assert_eq!(err.code(), PlaybackErrorCodes::REJECTED);
        assert_eq!(
            err.message(),
            "media_element rejected seek: rejected: not seekable"
        );
    }
}
