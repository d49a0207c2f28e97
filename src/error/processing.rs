// Processing error types and constants

use crate::error::ErrorCode;
use flutter_rust_bridge::frb;
use log::error;
use serde::Serialize;
use std::fmt;

/// Processing error code constants exposed to Dart via FFI
///
/// Error code range: 3001-3010
#[frb(unignore)]
pub struct ProcessingErrorCodes {}

impl ProcessingErrorCodes {
    /// Options failed validation before any work started
    pub const INVALID_OPTIONS: i32 = 3001;

    /// Transport kept failing after the retry ceiling
    pub const NETWORK_FAILURE: i32 = 3002;

    /// Server answered with a non-retryable status
    pub const SERVER_REJECTED: i32 = 3003;

    /// Job did not reach a terminal state within the poll ceiling
    pub const TIMEOUT: i32 = 3004;

    /// Server reported the job as failed
    pub const JOB_FAILED: i32 = 3005;

    /// No audio is loaded
    pub const NO_SOURCE: i32 = 3006;

    /// Caller abandoned the job
    pub const CANCELLED: i32 = 3007;

    /// Response or audio could not be decoded
    pub const DECODE: i32 = 3008;

    /// Job id is not tracked (never submitted or already consumed)
    pub const UNKNOWN_JOB: i32 = 3009;

    /// The engine was disposed
    pub const ENGINE_DISPOSED: i32 = 3010;
}

/// Where a processing failure originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingOrigin {
    Local,
    Cloud,
}

/// Processing failure kinds.
///
/// Only `NetworkFailure` is ever produced by retrying; every other kind is
/// reported on first occurrence.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessingErrorKind {
    InvalidOptions { reason: String },
    NetworkFailure { reason: String, attempts: u32 },
    ServerRejected { status: u16, message: String },
    Timeout { job_id: String, attempts: u32 },
    JobFailed { job_id: String, message: String },
    NoSource,
    Cancelled { job_id: String },
    Decode { reason: String },
    UnknownJob { job_id: String },
    EngineDisposed,
}

/// Processing error with its origin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingError {
    pub origin: ProcessingOrigin,
    pub kind: ProcessingErrorKind,
}

impl ProcessingError {
    pub fn local(kind: ProcessingErrorKind) -> Self {
        Self {
            origin: ProcessingOrigin::Local,
            kind,
        }
    }

    pub fn cloud(kind: ProcessingErrorKind) -> Self {
        Self {
            origin: ProcessingOrigin::Cloud,
            kind,
        }
    }

    pub fn invalid_options(origin: ProcessingOrigin, reason: impl Into<String>) -> Self {
        Self {
            origin,
            kind: ProcessingErrorKind::InvalidOptions {
                reason: reason.into(),
            },
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, ProcessingErrorKind::Cancelled { .. })
    }
}

/// Log a processing error with structured context
pub fn log_processing_error(err: &ProcessingError, context: &str) {
    error!(
        "Processing error in {}: code={}, origin={:?}, message={}",
        context,
        err.code(),
        err.origin,
        err.message()
    );
}

impl ErrorCode for ProcessingError {
    fn code(&self) -> i32 {
        match &self.kind {
            ProcessingErrorKind::InvalidOptions { .. } => ProcessingErrorCodes::INVALID_OPTIONS,
            ProcessingErrorKind::NetworkFailure { .. } => ProcessingErrorCodes::NETWORK_FAILURE,
            ProcessingErrorKind::ServerRejected { .. } => ProcessingErrorCodes::SERVER_REJECTED,
            ProcessingErrorKind::Timeout { .. } => ProcessingErrorCodes::TIMEOUT,
            ProcessingErrorKind::JobFailed { .. } => ProcessingErrorCodes::JOB_FAILED,
            ProcessingErrorKind::NoSource => ProcessingErrorCodes::NO_SOURCE,
            ProcessingErrorKind::Cancelled { .. } => ProcessingErrorCodes::CANCELLED,
            ProcessingErrorKind::Decode { .. } => ProcessingErrorCodes::DECODE,
            ProcessingErrorKind::UnknownJob { .. } => ProcessingErrorCodes::UNKNOWN_JOB,
            ProcessingErrorKind::EngineDisposed => ProcessingErrorCodes::ENGINE_DISPOSED,
        }
    }

    fn message(&self) -> String {
        match &self.kind {
            ProcessingErrorKind::InvalidOptions { reason } => {
                format!("Invalid processing options: {}", reason)
            }
            ProcessingErrorKind::NetworkFailure { reason, attempts } => {
                format!("Network failure after {} attempts: {}", attempts, reason)
            }
            ProcessingErrorKind::ServerRejected { status, message } => {
                format!("Server rejected request ({}): {}", status, message)
            }
            ProcessingErrorKind::Timeout { job_id, attempts } => {
                format!("Job {} still running after {} polls", job_id, attempts)
            }
            ProcessingErrorKind::JobFailed { job_id, message } => {
                format!("Job {} failed: {}", job_id, message)
            }
            ProcessingErrorKind::NoSource => {
                "No audio loaded. Call load_audio() first.".to_string()
            }
            ProcessingErrorKind::Cancelled { job_id } => format!("Job {} was cancelled", job_id),
            ProcessingErrorKind::Decode { reason } => format!("Decode failed: {}", reason),
            ProcessingErrorKind::UnknownJob { job_id } => format!("Unknown job {}", job_id),
            ProcessingErrorKind::EngineDisposed => "Audio engine has been disposed".to_string(),
        }
    }
}

impl fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ProcessingError::{:?} (code {}): {}",
            self.origin,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for ProcessingError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_error_codes() {
        assert_eq!(
            ProcessingError::invalid_options(ProcessingOrigin::Cloud, "x").code(),
            ProcessingErrorCodes::INVALID_OPTIONS
        );
        assert_eq!(
            ProcessingError::cloud(ProcessingErrorKind::Timeout {
                job_id: "j".to_string(),
                attempts: 5
            })
            .code(),
            3004
        );
        assert_eq!(
            ProcessingError::local(ProcessingErrorKind::NoSource).code(),
            ProcessingErrorCodes::NO_SOURCE
        );
    }

    #[test]
    fn test_timeout_and_job_failed_are_distinct() {
        let timeout = ProcessingError::cloud(ProcessingErrorKind::Timeout {
            job_id: "j1".to_string(),
            attempts: 5,
        });
        let failed = ProcessingError::cloud(ProcessingErrorKind::JobFailed {
            job_id: "j1".to_string(),
            message: "unsupported codec".to_string(),
        });
        assert_ne!(timeout.code(), failed.code());
        assert!(failed.message().contains("unsupported codec"));
        assert!(timeout.message().contains("5 polls"));
    }

    #[test]
    fn test_display_includes_origin() {
        let err = ProcessingError::local(ProcessingErrorKind::Decode {
            reason: "truncated".to_string(),
        });
        let display = format!("{}", err);
        assert!(display.contains("Local"));
        assert!(display.contains("3008"));
    }
}
