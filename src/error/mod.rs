// Error types for the mastering engine
//
// This module defines custom error types for backend loading, playback control
// and audio processing, providing structured error handling with error codes
// suitable for FFI communication.

mod load;
mod playback;
mod processing;

pub use load::{log_load_error, AdapterError, AdapterFailure, LoadError, LoadErrorCodes};
pub use playback::{log_playback_error, PlaybackError, PlaybackErrorCodes};
pub use processing::{
    log_processing_error, ProcessingError, ProcessingErrorCodes, ProcessingErrorKind,
    ProcessingOrigin,
};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the FFI boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
