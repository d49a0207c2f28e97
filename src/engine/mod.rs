//! Engine module housing playback and the engine facade.
//!
//! `backend` holds the adapters behind one trait, `selector` drives the
//! fallback between them, `playback` owns the loaded sound, `events` defines
//! what observers receive and `core` ties it all into `AudioEngine`.

pub mod backend;
pub mod core;
pub mod events;
pub mod playback;
pub mod selector;

pub use backend::{
    AdapterFactory, AdapterStatus, BackendAdapter, BackendKind, BlobRegistry, PcmBuffer,
    ReadyInfo, SystemTimeSource, TimeSource,
};
pub use core::{AudioEngine, EngineBuilder};
pub use events::{EngineEvent, EventKind};
pub use playback::{PlaybackController, PlaybackSnapshot, PlaybackState};
pub use selector::{BackendEnvironment, BackendSelector, LoadedAdapter};
