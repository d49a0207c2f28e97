// Backend load error types and constants

use crate::engine::backend::BackendKind;
use crate::error::ErrorCode;
use flutter_rust_bridge::frb;
use log::error;
use serde::Serialize;
use std::fmt;

/// Load error code constants exposed to Dart via FFI
///
/// Error code range: 1101-1104
#[frb(unignore)]
pub struct LoadErrorCodes {}

impl LoadErrorCodes {
    /// No backend adapter is available for the source on this platform
    pub const NO_BACKENDS: i32 = 1101;

    /// Every candidate backend adapter failed to load the source
    pub const EXHAUSTED: i32 = 1102;

    /// A newer load replaced this one before it completed
    pub const SUPERSEDED: i32 = 1103;

    /// The engine was disposed
    pub const ENGINE_DISPOSED: i32 = 1104;
}

/// Failure reported by a single backend adapter.
///
/// Adapters never retry on their own; the selector moves on to the next
/// candidate as soon as one of these comes back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdapterError {
    /// The adapter cannot handle this kind of source reference
    UnsupportedSource { uri: String },

    /// The source does not exist (missing file, unknown blob, HTTP 404)
    NotFound { uri: String },

    /// The source exists but could not be decoded
    Decode { reason: String },

    /// Local I/O failure
    Io { reason: String },

    /// The adapter gave up waiting for the source to become ready
    Timeout { after_ms: u64 },

    /// Remote fetch failed
    Network { reason: String },

    /// The underlying player refused the operation
    Rejected { reason: String },
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterError::UnsupportedSource { uri } => write!(f, "unsupported source {}", uri),
            AdapterError::NotFound { uri } => write!(f, "source not found: {}", uri),
            AdapterError::Decode { reason } => write!(f, "decode failed: {}", reason),
            AdapterError::Io { reason } => write!(f, "i/o error: {}", reason),
            AdapterError::Timeout { after_ms } => write!(f, "load timed out after {}ms", after_ms),
            AdapterError::Network { reason } => write!(f, "network error: {}", reason),
            AdapterError::Rejected { reason } => write!(f, "rejected: {}", reason),
        }
    }
}

impl std::error::Error for AdapterError {}

impl From<hound::Error> for AdapterError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(io) => AdapterError::Io {
                reason: io.to_string(),
            },
            other => AdapterError::Decode {
                reason: other.to_string(),
            },
        }
    }
}

/// One entry of the fallback chain: which backend was tried and why it failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdapterFailure {
    pub backend: BackendKind,
    pub error: AdapterError,
}

/// Log a load error with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_load_error(err: &LoadError, context: &str) {
    error!(
        "Load error in {}: code={}, component=BackendSelector, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors surfaced by `load_audio`
///
/// A load error never leaves the engine unusable; the playback controller
/// returns to `Empty` and accepts the next load.
///
/// Error code range: 1101-1104
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoadError {
    /// No adapter is registered for this source on this platform
    NoBackends { uri: String },

    /// All candidate adapters failed, in the order they were tried
    Exhausted {
        uri: String,
        failures: Vec<AdapterFailure>,
    },

    /// A newer load started before this one settled; its result was discarded
    Superseded { uri: String },

    /// The engine was disposed
    EngineDisposed,
}

impl ErrorCode for LoadError {
    fn code(&self) -> i32 {
        match self {
            LoadError::NoBackends { .. } => LoadErrorCodes::NO_BACKENDS,
            LoadError::Exhausted { .. } => LoadErrorCodes::EXHAUSTED,
            LoadError::Superseded { .. } => LoadErrorCodes::SUPERSEDED,
            LoadError::EngineDisposed => LoadErrorCodes::ENGINE_DISPOSED,
        }
    }

    fn message(&self) -> String {
        match self {
            LoadError::NoBackends { uri } => {
                format!("No playback backend available for {}", uri)
            }
            LoadError::Exhausted { uri, failures } => {
                let chain = failures
                    .iter()
                    .map(|failure| format!("{}: {}", failure.backend, failure.error))
                    .collect::<Vec<_>>()
                    .join("; ");
                format!("All playback backends failed for {} ({})", uri, chain)
            }
            LoadError::Superseded { uri } => {
                format!("Load of {} was replaced by a newer load", uri)
            }
            LoadError::EngineDisposed => "Audio engine has been disposed".to_string(),
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LoadError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for LoadError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_codes() {
        assert_eq!(
            LoadError::NoBackends {
                uri: "a".to_string()
            }
            .code(),
            LoadErrorCodes::NO_BACKENDS
        );
        assert_eq!(
            LoadError::Exhausted {
                uri: "a".to_string(),
                failures: vec![]
            }
            .code(),
            LoadErrorCodes::EXHAUSTED
        );
        assert_eq!(LoadError::EngineDisposed.code(), 1104);
    }

    #[test]
    fn test_exhausted_message_lists_chain_in_order() {
        let err = LoadError::Exhausted {
            uri: "song.wav".to_string(),
            failures: vec![
                AdapterFailure {
                    backend: BackendKind::NativePlayer,
                    error: AdapterError::Decode {
                        reason: "bad header".to_string(),
                    },
                },
                AdapterFailure {
                    backend: BackendKind::AudioBuffer,
                    error: AdapterError::Timeout { after_ms: 500 },
                },
            ],
        };

        let message = err.message();
        let native = message.find("native_player").unwrap();
        let buffer = message.find("audio_buffer").unwrap();
        assert!(native < buffer);
        assert!(message.contains("bad header"));
        assert!(format!("{}", err).contains("1102"));
    }

    #[test]
    fn test_from_hound_error() {
        let err: AdapterError = hound::Error::FormatError("not a wav").into();
        assert!(matches!(err, AdapterError::Decode { .. }));

        let io = std::io::Error::other("disk gone");
        let err: AdapterError = hound::Error::IoError(io).into();
        match err {
            AdapterError::Io { reason } => assert!(reason.contains("disk gone")),
            other => panic!("Expected Io, got {:?}", other),
        }
    }
}
