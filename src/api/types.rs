use crate::engine::PlaybackSnapshot;

/// Playback view handed to Dart
///
/// Mirrors the engine snapshot with the state and backend flattened to
/// strings so the shell does not need the Rust enums.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PlaybackInfo {
    /// `empty`, `loading`, `ready`, `playing`, `paused` or `unloaded`
    pub state: String,
    pub is_playing: bool,
    /// Position in seconds
    pub current_time: f64,
    /// Duration in seconds, 0 until a source is ready
    pub duration: f64,
    pub uri: Option<String>,
    /// Backend that won the fallback, e.g. `native_player`
    pub backend: Option<String>,
}

impl From<PlaybackSnapshot> for PlaybackInfo {
    fn from(snapshot: PlaybackSnapshot) -> Self {
        let state = serde_json::to_value(snapshot.state)
            .ok()
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_default();
        Self {
            state,
            is_playing: snapshot.is_playing,
            current_time: snapshot.current_time,
            duration: snapshot.duration,
            uri: snapshot.uri,
            backend: snapshot.backend.map(|kind| kind.to_string()),
        }
    }
}
