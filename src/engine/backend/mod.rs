//! Backend abstractions for playback.
//!
//! Every playback technology (platform media player, decode-to-memory audio
//! context, streaming media element) sits behind [`BackendAdapter`]. The
//! playback controller only ever talks to this trait; the selector decides
//! which concrete adapter gets built for a source.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::AdapterError;

mod audio_buffer;
mod blob;
mod cursor;
pub mod decode;
mod media_element;
mod native_player;

pub use audio_buffer::AudioBufferAdapter;
pub use blob::BlobRegistry;
pub use decode::{PcmBuffer, SourceRef};
pub use media_element::MediaElementAdapter;
pub use native_player::NativePlayerAdapter;

pub(crate) use cursor::PlaybackCursor;

/// Playback technology behind a sound handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    NativePlayer,
    AudioBuffer,
    MediaElement,
    /// Embedder-supplied adapter
    Custom(String),
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::NativePlayer => write!(f, "native_player"),
            BackendKind::AudioBuffer => write!(f, "audio_buffer"),
            BackendKind::MediaElement => write!(f, "media_element"),
            BackendKind::Custom(name) => write!(f, "custom:{}", name),
        }
    }
}

/// Reported once an adapter has the source ready to play.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadyInfo {
    /// Duration in seconds
    pub duration: f64,
}

/// Playback progress as seen by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AdapterStatus {
    pub is_playing: bool,
    pub position: f64,
    pub duration: f64,
    /// Set exactly once when the media reaches its end
    pub did_just_finish: bool,
}

/// Callback invoked on every meaningful playback transition.
pub type StatusListener = Arc<dyn Fn(AdapterStatus) + Send + Sync>;

/// Trait implemented by each playback backend.
///
/// All operations may suspend. After `unload()` every operation is a no-op
/// returning `Ok(())`, so a racing caller never crashes on a released handle.
pub trait BackendAdapter: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn load<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, Result<ReadyInfo, AdapterError>>;

    fn play(&self) -> BoxFuture<'_, Result<(), AdapterError>>;

    fn pause(&self) -> BoxFuture<'_, Result<(), AdapterError>>;

    fn stop(&self) -> BoxFuture<'_, Result<(), AdapterError>>;

    fn seek(&self, seconds: f64) -> BoxFuture<'_, Result<(), AdapterError>>;

    fn status(&self) -> AdapterStatus;

    fn set_status_listener(&self, listener: StatusListener);

    fn unload(&self) -> BoxFuture<'_, ()>;

    /// Decoded PCM, for backends that hold the whole source in memory.
    fn decoded_buffer(&self) -> Option<Arc<PcmBuffer>> {
        None
    }
}

/// Constructor for one backend kind, consumed by the selector.
#[derive(Clone)]
pub struct AdapterFactory {
    kind: BackendKind,
    build: Arc<dyn Fn() -> Box<dyn BackendAdapter> + Send + Sync>,
}

impl AdapterFactory {
    pub fn new<F>(kind: BackendKind, build: F) -> Self
    where
        F: Fn() -> Box<dyn BackendAdapter> + Send + Sync + 'static,
    {
        Self {
            kind,
            build: Arc::new(build),
        }
    }

    pub fn kind(&self) -> &BackendKind {
        &self.kind
    }

    pub fn build(&self) -> Box<dyn BackendAdapter> {
        (self.build)()
    }
}

impl fmt::Debug for AdapterFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterFactory")
            .field("kind", &self.kind)
            .finish()
    }
}

/// Trait representing a monotonic time source used by playback cursors.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

/// Default time source backed by `Instant::now`.
#[derive(Default)]
pub struct SystemTimeSource {
    _unit: (),
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
