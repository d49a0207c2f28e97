// Public API for flutter_rust_bridge integration
// This module provides FFI functions for Flutter to drive the audio engine

#![allow(dead_code)] // FFI functions are called from Dart, not detected by Rust analyzer

use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result;
use once_cell::sync::Lazy;

use crate::engine::AudioEngine;
use crate::error::{LoadError, PlaybackError, ProcessingError, ProcessingOrigin};
use crate::processing::{ProcessOptions, ProcessingMode, ProcessingModule};

mod streams;
mod types;

pub use streams::{engine_event_stream, EngineEventStream};
pub use types::PlaybackInfo;

// Re-export error code constants for FFI exposure
pub use crate::error::{LoadErrorCodes, PlaybackErrorCodes, ProcessingErrorCodes};

/// Global engine instance used by the Flutter shell
///
/// Created lazily from the platform configuration on first use. Disposing
/// through `dispose_engine` swaps in a fresh instance so the shell can
/// start over without restarting the process.
static ENGINE: Lazy<RwLock<Arc<AudioEngine>>> = Lazy::new(|| {
    crate::init_logging();
    RwLock::new(Arc::new(AudioEngine::from_platform()))
});

/// Current global engine
pub(crate) fn engine() -> Arc<AudioEngine> {
    Arc::clone(&ENGINE.read().unwrap_or_else(PoisonError::into_inner))
}

/// Get the version of the audio engine
#[flutter_rust_bridge::frb(sync)]
pub fn get_version() -> Result<String> {
    Ok(env!("CARGO_PKG_VERSION").to_string())
}

/// Initialize the engine
///
/// # Returns
/// * `true` on the first call, `false` once already initialized
#[flutter_rust_bridge::frb(sync)]
pub fn initialize_engine() -> bool {
    engine().initialize()
}

/// Load an audio source and return its duration in seconds
///
/// Accepts plain paths, `file://`, `http(s)://` and `blob:` URIs. Backends
/// are tried in platform preference order until one reports ready.
///
/// # Errors
/// - No backend can play the source (every failure is listed in order)
/// - A newer load superseded this one
/// - The engine was disposed
#[flutter_rust_bridge::frb]
pub async fn load_audio(uri: String) -> Result<f64, LoadError> {
    engine().load_audio(&uri).await
}

#[flutter_rust_bridge::frb]
pub async fn play() -> Result<(), PlaybackError> {
    engine().play().await
}

#[flutter_rust_bridge::frb]
pub async fn pause() -> Result<(), PlaybackError> {
    engine().pause().await
}

#[flutter_rust_bridge::frb]
pub async fn stop() -> Result<(), PlaybackError> {
    engine().stop().await
}

/// Seek to `seconds`, clamped to the track bounds
#[flutter_rust_bridge::frb]
pub async fn seek_to(seconds: f64) -> Result<(), PlaybackError> {
    engine().seek_to(seconds).await
}

/// Current playback position, duration and backend
#[flutter_rust_bridge::frb(sync)]
pub fn get_playback_info() -> PlaybackInfo {
    PlaybackInfo::from(engine().playback_snapshot())
}

/// Register in-memory audio (e.g. a recording) and return its `blob:` URI
#[flutter_rust_bridge::frb(sync)]
pub fn register_audio_bytes(bytes: Vec<u8>) -> String {
    engine().register_blob(bytes)
}

#[flutter_rust_bridge::frb(sync)]
pub fn set_processing_mode(mode: ProcessingMode) {
    engine().set_processing_mode(mode);
}

#[flutter_rust_bridge::frb(sync)]
pub fn get_processing_mode() -> ProcessingMode {
    engine().processing_mode()
}

/// Append a processing module described as JSON
///
/// # Arguments
/// * `module_json` - `{"kind": "gain", "parameters": {"gain_db": -3.0}}`;
///   `id` and `enabled` are optional
///
/// # Returns
/// * `Ok(String)` - Id the module is stored under
/// * `Err(ProcessingError)` - JSON does not describe a module
#[flutter_rust_bridge::frb(sync)]
pub fn add_processing_module(module_json: String) -> Result<String, ProcessingError> {
    let module = parse_module(&module_json)?;
    Ok(engine().add_processing_module(module))
}

#[flutter_rust_bridge::frb(sync)]
pub fn remove_processing_module(id: String) {
    engine().remove_processing_module(&id);
}

#[flutter_rust_bridge::frb(sync)]
pub fn set_processing_module_enabled(id: String, enabled: bool) -> bool {
    engine().set_module_enabled(&id, enabled)
}

#[flutter_rust_bridge::frb(sync)]
pub fn clear_processing_chain() {
    engine().clear_processing_chain();
}

/// Processing chain as a JSON array, in application order
#[flutter_rust_bridge::frb(sync)]
pub fn get_processing_chain() -> String {
    serde_json::to_string(&engine().get_processing_chain()).unwrap_or_else(|_| "[]".to_string())
}

/// Process the loaded source in the current mode
///
/// # Arguments
/// * `user_id` - Account the cloud job is billed to
/// * `options_json` - Serialized `ProcessOptions`; empty means defaults
///
/// # Returns
/// * `Ok(String)` - Serialized `ProcessingResult`
/// * `Err(ProcessingError)` - Validation, network, server or timeout failure
#[flutter_rust_bridge::frb]
pub async fn process_audio(
    user_id: String,
    options_json: String,
) -> Result<String, ProcessingError> {
    let engine = engine();
    let origin = if engine.processing_mode().is_cloud() {
        ProcessingOrigin::Cloud
    } else {
        ProcessingOrigin::Local
    };
    let options = parse_options(&options_json, origin)?;
    let result = engine.process_audio(&user_id, options).await?;
    to_json(&result, origin)
}

/// Cloud analysis of the loaded source, as serialized `CloudResult`
#[flutter_rust_bridge::frb]
pub async fn analyze_audio(user_id: String) -> Result<String, ProcessingError> {
    let result = engine().analyze_audio(&user_id).await?;
    to_json(&result, ProcessingOrigin::Cloud)
}

/// Abandon the cloud job being awaited, if any
#[flutter_rust_bridge::frb(sync)]
pub fn cancel_processing() -> bool {
    engine().cancel_processing()
}

/// Dispose the engine and replace it with a fresh instance
///
/// Safe to call in any state and repeatedly.
#[flutter_rust_bridge::frb]
pub async fn dispose_engine() {
    let previous = {
        let mut slot = ENGINE.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, Arc::new(AudioEngine::from_platform()))
    };
    previous.dispose().await;
}

/// Get LoadErrorCodes as a structured object with all error code constants
#[flutter_rust_bridge::frb(sync)]
pub fn get_load_error_codes() -> LoadErrorCodes {
    LoadErrorCodes {}
}

/// Get PlaybackErrorCodes as a structured object with all error code constants
#[flutter_rust_bridge::frb(sync)]
pub fn get_playback_error_codes() -> PlaybackErrorCodes {
    PlaybackErrorCodes {}
}

/// Get ProcessingErrorCodes as a structured object with all error code constants
#[flutter_rust_bridge::frb(sync)]
pub fn get_processing_error_codes() -> ProcessingErrorCodes {
    ProcessingErrorCodes {}
}

fn parse_module(json: &str) -> Result<ProcessingModule, ProcessingError> {
    serde_json::from_str(json).map_err(|err| {
        ProcessingError::invalid_options(
            ProcessingOrigin::Local,
            format!("invalid module JSON: {}", err),
        )
    })
}

fn parse_options(json: &str, origin: ProcessingOrigin) -> Result<ProcessOptions, ProcessingError> {
    if json.trim().is_empty() {
        return Ok(ProcessOptions::default());
    }
    serde_json::from_str(json).map_err(|err| {
        ProcessingError::invalid_options(origin, format!("invalid options JSON: {}", err))
    })
}

fn to_json<T: serde::Serialize>(
    value: &T,
    origin: ProcessingOrigin,
) -> Result<String, ProcessingError> {
    serde_json::to_string(value).map_err(|err| ProcessingError {
        origin,
        kind: crate::error::ProcessingErrorKind::Decode {
            reason: err.to_string(),
        },
    })
}

#[cfg(test)]
mod tests;
