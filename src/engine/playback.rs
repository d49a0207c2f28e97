// PlaybackController: owns the loaded sound handle and its state machine
//
// Empty -> Loading -> Ready <-> Playing <-> Paused, stop = Ready@0,
// terminal Unloaded after dispose.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::engine::backend::{AdapterStatus, BackendAdapter, BackendKind, PcmBuffer, StatusListener};
use crate::engine::events::EngineEvent;
use crate::engine::selector::BackendSelector;
use crate::error::{log_load_error, AdapterError, LoadError, PlaybackError};
use crate::managers::EventBus;

/// Playback state as seen by the engine's callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    #[default]
    Empty,
    Loading,
    Ready,
    Playing,
    Paused,
    /// Terminal; the controller was disposed
    Unloaded,
}

impl PlaybackState {
    fn has_media(&self) -> bool {
        matches!(
            self,
            PlaybackState::Ready | PlaybackState::Playing | PlaybackState::Paused
        )
    }
}

/// Point-in-time view of the controller.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub is_playing: bool,
    pub current_time: f64,
    pub duration: f64,
    pub uri: Option<String>,
    pub backend: Option<BackendKind>,
}

impl PlaybackSnapshot {
    fn event(&self) -> EngineEvent {
        EngineEvent::PlaybackStateChanged {
            is_playing: self.is_playing,
            current_time: self.current_time,
            duration: self.duration,
        }
    }
}

struct SoundHandle {
    kind: BackendKind,
    adapter: Box<dyn BackendAdapter>,
}

#[derive(Default)]
struct Tracked {
    state: PlaybackState,
    position: f64,
    duration: f64,
    uri: Option<String>,
    backend: Option<BackendKind>,
}

impl Tracked {
    fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            state: self.state,
            is_playing: self.state == PlaybackState::Playing,
            current_time: self.position,
            duration: self.duration,
            uri: self.uri.clone(),
            backend: self.backend.clone(),
        }
    }

    fn clamp(&self, seconds: f64) -> f64 {
        if seconds.is_finite() {
            seconds.clamp(0.0, self.duration)
        } else {
            0.0
        }
    }
}

fn lock_tracked(tracked: &Mutex<Tracked>) -> MutexGuard<'_, Tracked> {
    tracked.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drives one sound handle through the playback state machine.
///
/// At most one handle exists at a time. Loads are not queued: each load
/// bumps a generation counter, and a load that completes after a newer one
/// started is discarded. Status callbacks from a discarded handle are
/// ignored the same way.
///
/// Events are published after internal locks are released.
pub struct PlaybackController {
    selector: BackendSelector,
    bus: Arc<EventBus>,
    generation: Arc<AtomicU64>,
    handle: tokio::sync::Mutex<Option<SoundHandle>>,
    tracked: Arc<Mutex<Tracked>>,
}

impl PlaybackController {
    pub fn new(selector: BackendSelector, bus: Arc<EventBus>) -> Self {
        Self {
            selector,
            bus,
            generation: Arc::new(AtomicU64::new(0)),
            handle: tokio::sync::Mutex::new(None),
            tracked: Arc::new(Mutex::new(Tracked::default())),
        }
    }

    fn tracked(&self) -> MutexGuard<'_, Tracked> {
        lock_tracked(&self.tracked)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Apply `change` only if `generation` is still the live one.
    ///
    /// The generation only moves while `tracked` is held, so the check and
    /// the write cannot interleave with a newer load or a release.
    fn commit<R>(&self, generation: u64, change: impl FnOnce(&mut Tracked) -> R) -> Option<R> {
        let mut tracked = self.tracked();
        if !self.is_current(generation) {
            return None;
        }
        Some(change(&mut tracked))
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.tracked().snapshot()
    }

    pub fn state(&self) -> PlaybackState {
        self.tracked().state
    }

    /// Load a source, releasing whatever was loaded before.
    ///
    /// # Returns
    /// The source duration in seconds
    ///
    /// # Errors
    /// - `LoadError::NoBackends` / `Exhausted` when no adapter could load it;
    ///   the controller is left `Empty`
    /// - `LoadError::Superseded` when a newer load started meanwhile
    /// - `LoadError::EngineDisposed` after `dispose`
    pub async fn load(&self, uri: &str) -> Result<f64, LoadError> {
        let generation = {
            let mut tracked = self.tracked();
            if tracked.state == PlaybackState::Unloaded {
                return Err(LoadError::EngineDisposed);
            }
            *tracked = Tracked {
                state: PlaybackState::Loading,
                uri: Some(uri.to_string()),
                ..Tracked::default()
            };
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };

        let previous = self.handle.lock().await.take();
        if let Some(previous) = previous {
            log::debug!("[Playback] Releasing {} before loading {}", previous.kind, uri);
            previous.adapter.unload().await;
        }
        if !self.is_current(generation) {
            return Err(self.discarded(uri));
        }

        let candidates = self.selector.candidates(uri);
        let loaded = match self.selector.load_with_fallback(uri, candidates).await {
            Ok(loaded) => loaded,
            Err(err) => {
                let reset = self.commit(generation, |tracked| {
                    *tracked = Tracked::default();
                    tracked.snapshot()
                });
                let Some(reset) = reset else {
                    return Err(self.discarded(uri));
                };
                log_load_error(&err, "PlaybackController::load");
                self.bus.publish(&reset.event());
                return Err(err);
            }
        };

        let duration = loaded.ready.duration.max(0.0);
        let kind = loaded.adapter.kind();
        loaded
            .adapter
            .set_status_listener(self.listener_for(generation));

        let committed = {
            let mut handle = self.handle.lock().await;
            let snapshot = self.commit(generation, |tracked| {
                *tracked = Tracked {
                    state: PlaybackState::Ready,
                    position: 0.0,
                    duration,
                    uri: Some(uri.to_string()),
                    backend: Some(kind.clone()),
                };
                tracked.snapshot()
            });
            match snapshot {
                Some(snapshot) => {
                    *handle = Some(SoundHandle {
                        kind: kind.clone(),
                        adapter: loaded.adapter,
                    });
                    Ok(snapshot)
                }
                None => Err(loaded.adapter),
            }
        };

        let snapshot = match committed {
            Ok(snapshot) => snapshot,
            Err(stale) => {
                stale.unload().await;
                return Err(self.discarded(uri));
            }
        };

        log::info!(
            "[Playback] Loaded {} via {} ({:.2}s)",
            uri,
            kind,
            duration
        );
        self.bus.publish(&EngineEvent::AudioLoaded { duration });
        self.bus.publish(&snapshot.event());
        Ok(duration)
    }

    fn discarded(&self, uri: &str) -> LoadError {
        if self.state() == PlaybackState::Unloaded {
            return LoadError::EngineDisposed;
        }
        log::info!("[Playback] Load of {} superseded by a newer load", uri);
        LoadError::Superseded {
            uri: uri.to_string(),
        }
    }

    fn listener_for(&self, generation: u64) -> StatusListener {
        let current = Arc::clone(&self.generation);
        let tracked = Arc::clone(&self.tracked);
        let bus = Arc::clone(&self.bus);
        Arc::new(move |status: AdapterStatus| {
            let events = {
                let mut tracked = lock_tracked(&tracked);
                if current.load(Ordering::SeqCst) != generation {
                    return;
                }
                apply_status(&mut tracked, status)
            };
            for event in events {
                bus.publish(&event);
            }
        })
    }

    /// Play from the current position; no-op without media or while playing.
    pub async fn play(&self) -> Result<(), PlaybackError> {
        let handle = self.handle.lock().await;
        let Some(sound) = handle.as_ref() else {
            return Ok(());
        };
        let generation = self.generation.load(Ordering::SeqCst);
        if !matches!(self.state(), PlaybackState::Ready | PlaybackState::Paused) {
            return Ok(());
        }

        sound
            .adapter
            .play()
            .await
            .map_err(|error| rejected(sound, "play", error))?;
        let position = sound.adapter.status().position;
        let snapshot = self.transition(generation, PlaybackState::Playing, position);
        drop(handle);

        self.publish_change(snapshot);
        Ok(())
    }

    /// Pause; only meaningful while playing, otherwise nothing happens.
    pub async fn pause(&self) -> Result<(), PlaybackError> {
        let handle = self.handle.lock().await;
        let Some(sound) = handle.as_ref() else {
            return Ok(());
        };
        let generation = self.generation.load(Ordering::SeqCst);
        if self.state() != PlaybackState::Playing {
            return Ok(());
        }

        sound
            .adapter
            .pause()
            .await
            .map_err(|error| rejected(sound, "pause", error))?;
        let position = sound.adapter.status().position;
        let snapshot = self.transition(generation, PlaybackState::Paused, position);
        drop(handle);

        self.publish_change(snapshot);
        Ok(())
    }

    /// Stop and rewind to the start.
    pub async fn stop(&self) -> Result<(), PlaybackError> {
        let handle = self.handle.lock().await;
        let Some(sound) = handle.as_ref() else {
            return Ok(());
        };
        let generation = self.generation.load(Ordering::SeqCst);
        if !self.state().has_media() {
            return Ok(());
        }

        sound
            .adapter
            .stop()
            .await
            .map_err(|error| rejected(sound, "stop", error))?;
        let snapshot = self.transition(generation, PlaybackState::Ready, 0.0);
        drop(handle);

        self.publish_change(snapshot);
        Ok(())
    }

    /// Seek to `seconds`, clamped to `[0, duration]`.
    ///
    /// The tracked position only moves once the backend accepted the seek.
    pub async fn seek(&self, seconds: f64) -> Result<(), PlaybackError> {
        let handle = self.handle.lock().await;
        let Some(sound) = handle.as_ref() else {
            return Ok(());
        };
        let generation = self.generation.load(Ordering::SeqCst);

        let (state, target) = {
            let tracked = self.tracked();
            if !tracked.state.has_media() {
                return Ok(());
            }
            (tracked.state, tracked.clamp(seconds))
        };

        sound
            .adapter
            .seek(target)
            .await
            .map_err(|error| rejected(sound, "seek", error))?;
        let snapshot = self.transition(generation, state, target);
        drop(handle);

        self.publish_change(snapshot);
        Ok(())
    }

    fn transition(
        &self,
        generation: u64,
        state: PlaybackState,
        position: f64,
    ) -> Option<PlaybackSnapshot> {
        self.commit(generation, |tracked| {
            tracked.state = state;
            tracked.position = tracked.clamp(position);
            tracked.snapshot()
        })
    }

    fn publish_change(&self, snapshot: Option<PlaybackSnapshot>) {
        if let Some(snapshot) = snapshot {
            self.bus.publish(&snapshot.event());
        }
    }

    /// Decoded PCM of the loaded source, when its backend holds one.
    pub async fn decoded_buffer(&self) -> Option<Arc<PcmBuffer>> {
        self.handle
            .lock()
            .await
            .as_ref()
            .and_then(|sound| sound.adapter.decoded_buffer())
    }

    /// URI of the loaded source, once ready.
    pub fn current_uri(&self) -> Option<String> {
        let tracked = self.tracked();
        if tracked.state.has_media() {
            tracked.uri.clone()
        } else {
            None
        }
    }

    /// Release the loaded handle and return to `Empty`.
    pub async fn unload(&self) {
        self.release(PlaybackState::Empty).await;
    }

    /// Release the handle and enter the terminal `Unloaded` state.
    ///
    /// Safe to call repeatedly.
    pub async fn dispose(&self) {
        self.release(PlaybackState::Unloaded).await;
    }

    async fn release(&self, next: PlaybackState) {
        {
            let mut tracked = self.tracked();
            if tracked.state == PlaybackState::Unloaded {
                return;
            }
            *tracked = Tracked {
                state: next,
                ..Tracked::default()
            };
            self.generation.fetch_add(1, Ordering::SeqCst);
        }

        let previous = self.handle.lock().await.take();
        if let Some(previous) = previous {
            log::debug!("[Playback] Unloading {}", previous.kind);
            previous.adapter.unload().await;
            if next == PlaybackState::Empty {
                self.bus.publish(&self.snapshot().event());
            }
        }
    }
}

fn rejected(sound: &SoundHandle, operation: &'static str, error: AdapterError) -> PlaybackError {
    log::warn!("[Playback] {} rejected {}: {}", sound.kind, operation, error);
    PlaybackError::Rejected {
        backend: sound.kind.clone(),
        operation,
        error,
    }
}

/// Fold an adapter status report into the tracked state.
///
/// Returns the events to publish once the lock is released. Progress is
/// only reported while playing and when the position actually moved; end of
/// media reports the end position, then the rewind.
fn apply_status(tracked: &mut Tracked, status: AdapterStatus) -> Vec<EngineEvent> {
    if status.did_just_finish {
        if !tracked.state.has_media() {
            return Vec::new();
        }
        tracked.state = PlaybackState::Ready;
        tracked.position = tracked.duration;
        let at_end = tracked.snapshot().event();
        tracked.position = 0.0;
        let rewound = tracked.snapshot().event();
        return vec![at_end, rewound];
    }

    if tracked.state != PlaybackState::Playing || !status.is_playing {
        return Vec::new();
    }
    let position = tracked.clamp(status.position);
    if (position - tracked.position).abs() < f64::EPSILON {
        return Vec::new();
    }
    tracked.position = position;
    vec![tracked.snapshot().event()]
}
