use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use super::{AdapterStatus, StatusListener, TimeSource};

#[derive(Default)]
struct CursorState {
    loaded: bool,
    duration: f64,
    /// Position when the cursor last stopped moving
    anchor: f64,
    /// Set while playing
    started_at: Option<Instant>,
}

impl CursorState {
    fn position(&self, now: Instant) -> f64 {
        let elapsed = self
            .started_at
            .map(|start| now.saturating_duration_since(start).as_secs_f64())
            .unwrap_or(0.0);
        (self.anchor + elapsed).clamp(0.0, self.duration.max(0.0))
    }

    fn snapshot(&self, now: Instant) -> AdapterStatus {
        AdapterStatus {
            is_playing: self.started_at.is_some(),
            position: self.position(now),
            duration: self.duration,
            did_just_finish: false,
        }
    }
}

/// Clock-driven playhead shared by the built-in adapters.
///
/// None of the built-in backends render audio frames themselves, so position
/// is derived from a [`TimeSource`]. A ticker task on the current tokio
/// runtime reports progress and detects end of media.
pub(crate) struct PlaybackCursor {
    clock: Arc<dyn TimeSource>,
    progress_interval: Duration,
    state: Mutex<CursorState>,
    listener: Mutex<Option<StatusListener>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackCursor {
    pub(crate) fn new(clock: Arc<dyn TimeSource>, progress_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            clock,
            progress_interval,
            state: Mutex::new(CursorState::default()),
            listener: Mutex::new(None),
            ticker: Mutex::new(None),
        })
    }

    fn state(&self) -> MutexGuard<'_, CursorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_loaded(&self) -> bool {
        self.state().loaded
    }

    pub(crate) fn reset(&self, duration: f64) {
        self.stop_ticker();
        let mut state = self.state();
        *state = CursorState {
            loaded: true,
            duration: duration.max(0.0),
            anchor: 0.0,
            started_at: None,
        };
    }

    pub(crate) fn status(&self) -> AdapterStatus {
        self.state().snapshot(self.clock.now())
    }

    pub(crate) fn set_listener(&self, listener: StatusListener) {
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    pub(crate) fn play(self: &Arc<Self>) {
        let status = {
            let mut state = self.state();
            if !state.loaded || state.started_at.is_some() {
                return;
            }
            let now = self.clock.now();
            if state.duration > 0.0 && state.anchor >= state.duration {
                state.anchor = 0.0;
            }
            state.started_at = Some(now);
            state.snapshot(now)
        };
        self.start_ticker();
        self.notify(status);
    }

    pub(crate) fn pause(&self) {
        let status = {
            let mut state = self.state();
            if !state.loaded {
                return;
            }
            let now = self.clock.now();
            state.anchor = state.position(now);
            state.started_at = None;
            state.snapshot(now)
        };
        self.stop_ticker();
        self.notify(status);
    }

    pub(crate) fn stop(&self) {
        let status = {
            let mut state = self.state();
            if !state.loaded {
                return;
            }
            state.anchor = 0.0;
            state.started_at = None;
            state.snapshot(self.clock.now())
        };
        self.stop_ticker();
        self.notify(status);
    }

    pub(crate) fn seek(&self, seconds: f64) {
        let status = {
            let mut state = self.state();
            if !state.loaded {
                return;
            }
            let now = self.clock.now();
            let target = if seconds.is_finite() { seconds } else { 0.0 };
            state.anchor = target.clamp(0.0, state.duration);
            if state.started_at.is_some() {
                state.started_at = Some(now);
            }
            state.snapshot(now)
        };
        self.notify(status);
    }

    pub(crate) fn unload(&self) {
        self.stop_ticker();
        *self.state() = CursorState::default();
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Report progress; returns false once the cursor stopped moving.
    pub(crate) fn tick(&self) -> bool {
        let (status, still_playing) = {
            let mut state = self.state();
            if !state.loaded || state.started_at.is_none() {
                return false;
            }
            let now = self.clock.now();
            let position = state.position(now);
            if state.duration > 0.0 && position >= state.duration {
                // Rewind so the next play starts from the top.
                state.started_at = None;
                state.anchor = 0.0;
                let finished = AdapterStatus {
                    is_playing: false,
                    position: state.duration,
                    duration: state.duration,
                    did_just_finish: true,
                };
                (finished, false)
            } else {
                (state.snapshot(now), true)
            }
        };
        self.notify(status);
        still_playing
    }

    fn notify(&self, status: AdapterStatus) {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            listener(status);
        }
    }

    fn start_ticker(self: &Arc<Self>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::debug!("[PlaybackCursor] No tokio runtime; progress updates disabled");
            return;
        };

        let weak = Arc::downgrade(self);
        let period = self.progress_interval;
        let handle = runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            // First tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(cursor) = weak.upgrade() else {
                    break;
                };
                if !cursor.tick() {
                    break;
                }
            }
        });

        if let Some(previous) = self
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle)
        {
            previous.abort();
        }
    }

    fn stop_ticker(&self) {
        if let Some(handle) = self
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}
