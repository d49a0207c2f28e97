//! Engine lifecycle events delivered through the event bus.

use serde::Serialize;

use crate::error::ProcessingError;
use crate::processing::{ProcessingMode, ProcessingResult};

/// Event emitted by the engine.
///
/// Events are transient: they are delivered to the subscribers present at
/// emission time and never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EngineEvent {
    AudioLoaded {
        duration: f64,
    },
    PlaybackStateChanged {
        is_playing: bool,
        current_time: f64,
        duration: f64,
    },
    ProcessingStarted {
        mode: ProcessingMode,
    },
    ProcessingCompleted {
        result: ProcessingResult,
    },
    ProcessingFailed {
        error: ProcessingError,
    },
}

/// Discriminant of [`EngineEvent`], used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AudioLoaded,
    PlaybackStateChanged,
    ProcessingStarted,
    ProcessingCompleted,
    ProcessingFailed,
}

impl EngineEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            EngineEvent::AudioLoaded { .. } => EventKind::AudioLoaded,
            EngineEvent::PlaybackStateChanged { .. } => EventKind::PlaybackStateChanged,
            EngineEvent::ProcessingStarted { .. } => EventKind::ProcessingStarted,
            EngineEvent::ProcessingCompleted { .. } => EventKind::ProcessingCompleted,
            EngineEvent::ProcessingFailed { .. } => EventKind::ProcessingFailed,
        }
    }
}
