use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::engine::backend::{
    AdapterFactory, AdapterStatus, BackendAdapter, BackendKind, ReadyInfo, StatusListener,
};
use crate::error::AdapterError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Observations shared by every adapter a [`ScriptedBackend`] builds.
#[derive(Default)]
pub struct AdapterProbe {
    loads: AtomicUsize,
    unloads: AtomicUsize,
    calls: Mutex<Vec<String>>,
    listener: Mutex<Option<StatusListener>>,
}

impl AdapterProbe {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn unloads(&self) -> usize {
        self.unloads.load(Ordering::SeqCst)
    }

    /// Operation names in call order, e.g. `["load:/a.wav", "play", "seek:3"]`.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Push a status through the most recently registered listener.
    ///
    /// Returns false when no listener is registered.
    pub fn emit(&self, status: AdapterStatus) -> bool {
        let listener = lock(&self.listener).clone();
        match listener {
            Some(listener) => {
                listener(status);
                true
            }
            None => false,
        }
    }

    /// Listener registered by the controller for a given built adapter,
    /// captured so tests can replay callbacks from a stale handle.
    pub fn current_listener(&self) -> Option<StatusListener> {
        lock(&self.listener).clone()
    }

    fn record(&self, call: String) {
        lock(&self.calls).push(call);
    }
}

#[derive(Clone)]
struct Script {
    outcome: Result<f64, AdapterError>,
    load_delay: Duration,
    uri_delays: HashMap<String, Duration>,
    uri_durations: HashMap<String, f64>,
    reject_play: bool,
    reject_seek: bool,
}

/// Backend whose behaviour is fixed up front.
///
/// Every adapter it builds reports as `BackendKind::Custom(name)`.
pub struct ScriptedBackend {
    name: String,
    script: Script,
    probe: Arc<AdapterProbe>,
}

impl ScriptedBackend {
    /// Loads succeed with `duration` seconds.
    pub fn ready(name: &str, duration: f64) -> Self {
        Self::with_outcome(name, Ok(duration))
    }

    /// Loads fail with `error`.
    pub fn failing(name: &str, error: AdapterError) -> Self {
        Self::with_outcome(name, Err(error))
    }

    fn with_outcome(name: &str, outcome: Result<f64, AdapterError>) -> Self {
        Self {
            name: name.to_string(),
            script: Script {
                outcome,
                load_delay: Duration::ZERO,
                uri_delays: HashMap::new(),
                uri_durations: HashMap::new(),
                reject_play: false,
                reject_seek: false,
            },
            probe: Arc::new(AdapterProbe::default()),
        }
    }

    /// Delay every load by `delay` (tokio time).
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.script.load_delay = delay;
        self
    }

    /// Delay loads of `uri` by `delay`, overriding the global delay.
    pub fn with_uri_delay(mut self, uri: &str, delay: Duration) -> Self {
        self.script.uri_delays.insert(uri.to_string(), delay);
        self
    }

    /// Report `duration` for `uri` instead of the default.
    pub fn with_uri_duration(mut self, uri: &str, duration: f64) -> Self {
        self.script.uri_durations.insert(uri.to_string(), duration);
        self
    }

    /// `play()` fails with `AdapterError::Rejected`.
    pub fn rejecting_play(mut self) -> Self {
        self.script.reject_play = true;
        self
    }

    /// `seek()` fails with `AdapterError::Rejected`.
    pub fn rejecting_seek(mut self) -> Self {
        self.script.reject_seek = true;
        self
    }

    pub fn kind(&self) -> BackendKind {
        BackendKind::Custom(self.name.clone())
    }

    pub fn probe(&self) -> Arc<AdapterProbe> {
        Arc::clone(&self.probe)
    }

    pub fn factory(&self) -> AdapterFactory {
        let kind = self.kind();
        let script = self.script.clone();
        let probe = Arc::clone(&self.probe);
        AdapterFactory::new(kind.clone(), move || {
            Box::new(ScriptedAdapter {
                kind: kind.clone(),
                script: script.clone(),
                probe: Arc::clone(&probe),
                status: Mutex::new(AdapterStatus::default()),
                loaded: Mutex::new(false),
            })
        })
    }
}

struct ScriptedAdapter {
    kind: BackendKind,
    script: Script,
    probe: Arc<AdapterProbe>,
    status: Mutex<AdapterStatus>,
    loaded: Mutex<bool>,
}

impl ScriptedAdapter {
    fn is_loaded(&self) -> bool {
        *lock(&self.loaded)
    }

    /// Apply `change` to the status and return the new snapshot, or `None`
    /// when nothing is loaded.
    fn update(&self, change: impl FnOnce(&mut AdapterStatus)) -> Option<AdapterStatus> {
        if !self.is_loaded() {
            return None;
        }
        let mut status = lock(&self.status);
        change(&mut status);
        Some(*status)
    }

    async fn open(&self, uri: &str) -> Result<ReadyInfo, AdapterError> {
        self.probe.loads.fetch_add(1, Ordering::SeqCst);
        self.probe.record(format!("load:{}", uri));

        let delay = self
            .script
            .uri_delays
            .get(uri)
            .copied()
            .unwrap_or(self.script.load_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let duration = match &self.script.outcome {
            Ok(default) => self
                .script
                .uri_durations
                .get(uri)
                .copied()
                .unwrap_or(*default),
            Err(err) => return Err(err.clone()),
        };

        *lock(&self.loaded) = true;
        *lock(&self.status) = AdapterStatus {
            duration,
            ..AdapterStatus::default()
        };
        Ok(ReadyInfo { duration })
    }
}

impl BackendAdapter for ScriptedAdapter {
    fn kind(&self) -> BackendKind {
        self.kind.clone()
    }

    fn load<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, Result<ReadyInfo, AdapterError>> {
        self.open(uri).boxed()
    }

    fn play(&self) -> BoxFuture<'_, Result<(), AdapterError>> {
        self.probe.record("play".to_string());
        let result = if self.script.reject_play && self.is_loaded() {
            Err(AdapterError::Rejected {
                reason: "scripted rejection".to_string(),
            })
        } else {
            self.update(|status| status.is_playing = true);
            Ok(())
        };
        futures::future::ready(result).boxed()
    }

    fn pause(&self) -> BoxFuture<'_, Result<(), AdapterError>> {
        self.probe.record("pause".to_string());
        self.update(|status| status.is_playing = false);
        futures::future::ready(Ok(())).boxed()
    }

    fn stop(&self) -> BoxFuture<'_, Result<(), AdapterError>> {
        self.probe.record("stop".to_string());
        self.update(|status| {
            status.is_playing = false;
            status.position = 0.0;
        });
        futures::future::ready(Ok(())).boxed()
    }

    fn seek(&self, seconds: f64) -> BoxFuture<'_, Result<(), AdapterError>> {
        self.probe.record(format!("seek:{}", seconds));
        if self.script.reject_seek && self.is_loaded() {
            return futures::future::ready(Err(AdapterError::Rejected {
                reason: "scripted rejection".to_string(),
            }))
            .boxed();
        }
        self.update(|status| status.position = seconds.clamp(0.0, status.duration));
        futures::future::ready(Ok(())).boxed()
    }

    fn status(&self) -> AdapterStatus {
        *lock(&self.status)
    }

    fn set_status_listener(&self, listener: StatusListener) {
        *lock(&self.probe.listener) = Some(listener);
    }

    fn unload(&self) -> BoxFuture<'_, ()> {
        self.probe.unloads.fetch_add(1, Ordering::SeqCst);
        self.probe.record("unload".to_string());
        *lock(&self.loaded) = false;
        *lock(&self.status) = AdapterStatus::default();
        futures::future::ready(()).boxed()
    }
}
