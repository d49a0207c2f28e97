//! AudioEngine: the per-instance facade over playback, the processing
//! chain, cloud jobs and the event bus.
//!
//! One engine owns one controller, one chain, one orchestrator and one bus.
//! Nothing is global here; the FFI layer keeps its own lazily-created
//! instance and the CLI and tests build as many as they need.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio::sync::mpsc;

use crate::cloud::{
    CloudBackend, CloudOrchestrator, CloudRequest, CloudResult, JobHandle, PollPolicy,
    RetryPolicy, Submission,
};
use crate::config::EngineConfig;
use crate::engine::backend::decode::{decode_wav_bytes, decode_wav_file, encode_wav};
use crate::engine::backend::{BlobRegistry, PcmBuffer, SourceRef, SystemTimeSource, TimeSource};
use crate::engine::events::{EngineEvent, EventKind};
use crate::engine::playback::{PlaybackController, PlaybackSnapshot};
use crate::engine::selector::{BackendEnvironment, BackendSelector};
use crate::error::{
    log_processing_error, LoadError, PlaybackError, ProcessingError, ProcessingErrorKind,
    ProcessingOrigin,
};
use crate::managers::{ChainManager, EventBus, SubscriptionToken};
use crate::processing::{
    now_timestamp_ms, AudioTransform, LocalProcessor, LocalResult, ModuleKind, ProcessOptions,
    ProcessingMode, ProcessingModule, ProcessingResult,
};

/// Builder for engines that need something other than platform defaults.
///
/// Tests inject scripted backends and transports here; production code
/// normally goes through [`AudioEngine::new`].
pub struct EngineBuilder {
    config: EngineConfig,
    selector: Option<BackendSelector>,
    cloud: Option<CloudBackend>,
    time_source: Option<Arc<dyn TimeSource>>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            selector: None,
            cloud: None,
            time_source: None,
        }
    }

    /// Replace the built-in adapters with a custom selector.
    pub fn selector(mut self, selector: BackendSelector) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Replace the cloud backend resolved from `config.cloud`.
    pub fn cloud_backend(mut self, backend: CloudBackend) -> Self {
        self.cloud = Some(backend);
        self
    }

    /// Clock used by the built-in adapters' playback cursors.
    pub fn time_source(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.time_source = Some(clock);
        self
    }

    pub fn build(self) -> AudioEngine {
        let config = self.config;
        let blobs = BlobRegistry::new();
        let bus = Arc::new(EventBus::new());

        let selector = self.selector.unwrap_or_else(|| {
            let clock = self
                .time_source
                .unwrap_or_else(|| Arc::new(SystemTimeSource::default()));
            BackendSelector::new(
                config.playback.capabilities,
                BackendEnvironment {
                    clock,
                    blobs: blobs.clone(),
                    http: reqwest::Client::new(),
                    load_timeout: config.playback.load_timeout(),
                    progress_interval: config.playback.progress_interval(),
                },
            )
        });

        let backend = self
            .cloud
            .unwrap_or_else(|| CloudBackend::from_config(&config.cloud));
        let cloud = CloudOrchestrator::new(
            backend,
            RetryPolicy::from(&config.retry),
            PollPolicy::from(&config.polling),
        );

        AudioEngine {
            playback: PlaybackController::new(selector, Arc::clone(&bus)),
            chain: ChainManager::new(),
            local: LocalProcessor::new(),
            cloud,
            blobs,
            bus,
            mode: RwLock::new(ProcessingMode::default()),
            active_job: Mutex::new(None),
            initialized: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            config,
        }
    }
}

/// Audio engine instance.
pub struct AudioEngine {
    config: EngineConfig,
    bus: Arc<EventBus>,
    playback: PlaybackController,
    chain: ChainManager,
    local: LocalProcessor,
    cloud: CloudOrchestrator,
    blobs: BlobRegistry,
    mode: RwLock<ProcessingMode>,
    /// Cloud job started by the current `process_audio` call, if any
    active_job: Mutex<Option<JobHandle>>,
    initialized: AtomicBool,
    disposed: AtomicBool,
}

impl AudioEngine {
    /// Create an engine from an explicit configuration.
    pub fn new(config: EngineConfig) -> Self {
        EngineBuilder::new(config).build()
    }

    /// Create an engine with the configuration for the running platform.
    pub fn from_platform() -> Self {
        Self::new(EngineConfig::load())
    }

    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Mark the engine ready and log its resolved setup.
    ///
    /// Returns false when already initialized. Every other operation works
    /// without it; the call exists so shells have one place to trigger the
    /// startup log and any platform audio-session setup.
    pub fn initialize(&self) -> bool {
        if self.is_disposed() {
            log::warn!("[AudioEngine] initialize called after dispose");
            return false;
        }
        if self
            .initialized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        log::info!(
            "[AudioEngine] Initialized (capabilities={:?}, cloud={}, retry={}x{}ms, polling={}x{}ms)",
            self.config.playback.capabilities,
            if self.cloud.is_mock() { "mock" } else { "live" },
            self.config.retry.max_attempts,
            self.config.retry.base_delay_ms,
            self.config.polling.max_attempts,
            self.config.polling.interval_ms
        );
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    // ---- playback ----

    /// Load a source, falling back across backends; returns its duration.
    pub async fn load_audio(&self, uri: &str) -> Result<f64, LoadError> {
        if self.is_disposed() {
            return Err(LoadError::EngineDisposed);
        }
        self.playback.load(uri).await
    }

    pub async fn play(&self) -> Result<(), PlaybackError> {
        self.playback.play().await
    }

    pub async fn pause(&self) -> Result<(), PlaybackError> {
        self.playback.pause().await
    }

    pub async fn stop(&self) -> Result<(), PlaybackError> {
        self.playback.stop().await
    }

    pub async fn seek_to(&self, seconds: f64) -> Result<(), PlaybackError> {
        self.playback.seek(seconds).await
    }

    pub async fn unload_audio(&self) {
        self.playback.unload().await;
    }

    pub fn playback_snapshot(&self) -> PlaybackSnapshot {
        self.playback.snapshot()
    }

    /// Make in-memory audio loadable as a `blob:` source.
    ///
    /// Returns an empty string once disposed.
    pub fn register_blob(&self, bytes: Vec<u8>) -> String {
        if self.is_disposed() {
            return String::new();
        }
        self.blobs.register(bytes)
    }

    /// Bytes behind a `blob:` URI, e.g. a locally rendered result.
    pub fn blob(&self, uri: &str) -> Option<Arc<Vec<u8>>> {
        self.blobs.get(uri)
    }

    pub fn release_blob(&self, uri: &str) -> bool {
        self.blobs.release(uri)
    }

    // ---- processing chain ----

    pub fn set_processing_mode(&self, mode: ProcessingMode) {
        if self.is_disposed() {
            return;
        }
        let mut current = self.mode.write().unwrap_or_else(PoisonError::into_inner);
        if *current != mode {
            log::info!("[AudioEngine] Processing mode {:?} -> {:?}", *current, mode);
            *current = mode;
        }
    }

    pub fn processing_mode(&self) -> ProcessingMode {
        *self.mode.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a module; returns the id it is stored under, or an empty
    /// string once disposed.
    pub fn add_processing_module(&self, module: ProcessingModule) -> String {
        if self.is_disposed() {
            return String::new();
        }
        self.chain.add(module)
    }

    pub fn remove_processing_module(&self, id: &str) {
        if self.is_disposed() {
            return;
        }
        self.chain.remove(id);
    }

    pub fn set_module_enabled(&self, id: &str, enabled: bool) -> bool {
        if self.is_disposed() {
            return false;
        }
        self.chain.set_enabled(id, enabled)
    }

    pub fn clear_processing_chain(&self) {
        self.chain.clear();
    }

    pub fn get_processing_chain(&self) -> Vec<ProcessingModule> {
        self.chain.list()
    }

    /// Install the local implementation for a module kind.
    pub fn register_transform(&self, kind: ModuleKind, transform: Arc<dyn AudioTransform>) {
        if self.is_disposed() {
            return;
        }
        self.local.register(kind, transform);
    }

    // ---- processing ----

    /// Process the loaded source in the current mode.
    ///
    /// Emits `ProcessingStarted`, then exactly one of `ProcessingCompleted`
    /// or `ProcessingFailed`. A cancelled cloud job resolves the caller with
    /// `Cancelled` and emits nothing after `ProcessingStarted`.
    pub async fn process_audio(
        &self,
        user_id: &str,
        options: ProcessOptions,
    ) -> Result<ProcessingResult, ProcessingError> {
        let mode = self.processing_mode();
        let origin = origin_for(mode);
        if self.is_disposed() {
            return Err(ProcessingError {
                origin,
                kind: ProcessingErrorKind::EngineDisposed,
            });
        }

        self.bus.publish(&EngineEvent::ProcessingStarted { mode });

        let outcome = match mode {
            ProcessingMode::Local => self.process_local().await.map(ProcessingResult::Local),
            ProcessingMode::CloudMastering | ProcessingMode::CloudEnhancement => {
                let policy = options.polling.unwrap_or_else(|| self.cloud.default_poll());
                match self.playback.current_uri() {
                    Some(uri) => {
                        let request = if mode == ProcessingMode::CloudMastering {
                            CloudRequest::mastering(user_id, &uri, options.mastering)
                        } else {
                            CloudRequest::enhancement(user_id, &uri, options.enhancement)
                        };
                        self.run_cloud(&request, policy)
                            .await
                            .map(ProcessingResult::Cloud)
                    }
                    None => Err(ProcessingError::cloud(ProcessingErrorKind::NoSource)),
                }
            }
        };

        match &outcome {
            Ok(result) => {
                log::info!("[AudioEngine] Processing completed ({:?})", mode);
                self.bus.publish(&EngineEvent::ProcessingCompleted {
                    result: result.clone(),
                });
            }
            Err(err) if err.is_cancelled() => {
                log::info!("[AudioEngine] Processing cancelled ({:?})", mode);
            }
            Err(err) => {
                log_processing_error(err, "process_audio");
                self.bus
                    .publish(&EngineEvent::ProcessingFailed { error: err.clone() });
            }
        }
        outcome
    }

    /// Cloud analysis of the loaded source. Emits no events.
    pub async fn analyze_audio(&self, user_id: &str) -> Result<CloudResult, ProcessingError> {
        if self.is_disposed() {
            return Err(ProcessingError::cloud(ProcessingErrorKind::EngineDisposed));
        }
        let uri = self
            .playback
            .current_uri()
            .ok_or_else(|| ProcessingError::cloud(ProcessingErrorKind::NoSource))?;
        let request = CloudRequest::analysis(user_id, &uri);
        self.run_cloud(&request, self.cloud.default_poll()).await
    }

    /// Cancel the cloud job of the running `process_audio` call.
    ///
    /// Returns false when no job is being awaited (local mode, nothing
    /// running, or the submit has not been accepted yet).
    pub fn cancel_processing(&self) -> bool {
        let active = self.lock_active_job().clone();
        match active {
            Some(handle) => self.cloud.cancel(&handle.job_id),
            None => false,
        }
    }

    async fn run_cloud(
        &self,
        request: &CloudRequest,
        policy: PollPolicy,
    ) -> Result<CloudResult, ProcessingError> {
        let handle = match self.cloud.submit(request).await? {
            Submission::Completed(result) => return Ok(result),
            Submission::Job(handle) => handle,
        };

        *self.lock_active_job() = Some(handle.clone());
        let result = self.cloud.await_completion(&handle, policy).await;

        let mut active = self.lock_active_job();
        if active.as_ref().map(|job| &job.job_id) == Some(&handle.job_id) {
            *active = None;
        }
        result
    }

    async fn process_local(&self) -> Result<LocalResult, ProcessingError> {
        let source_uri = self
            .playback
            .current_uri()
            .ok_or_else(|| ProcessingError::local(ProcessingErrorKind::NoSource))?;
        let input = self.local_input(&source_uri).await?;

        let modules = self.chain.list();
        let run = self.local.run(&input, &modules)?;

        let bytes = encode_wav(&run.buffer).map_err(|err| {
            ProcessingError::local(ProcessingErrorKind::Decode {
                reason: err.to_string(),
            })
        })?;
        let output_uri = self.blobs.register(bytes);

        log::info!(
            "[AudioEngine] Local chain rendered {} -> {} ({} module(s) applied)",
            source_uri,
            output_uri,
            run.modules_applied.len()
        );

        Ok(LocalResult {
            source_uri,
            output_uri,
            peak_level: run.buffer.peak(),
            rms_level: run.buffer.rms(),
            modules_applied: run.modules_applied,
            created_at: now_timestamp_ms(),
        })
    }

    /// PCM for the loaded source.
    ///
    /// Buffer-backed adapters already hold it; otherwise local and blob
    /// sources are decoded here. Streamed sources cannot be processed
    /// locally.
    async fn local_input(&self, uri: &str) -> Result<PcmBuffer, ProcessingError> {
        if let Some(buffer) = self.playback.decoded_buffer().await {
            return Ok(buffer.as_ref().clone());
        }

        let decoded = match SourceRef::parse(uri) {
            SourceRef::File(path) => tokio::task::spawn_blocking(move || decode_wav_file(&path))
                .await
                .map_err(|err| decode_error(err.to_string()))?,
            SourceRef::Blob(blob) => match self.blobs.get(&blob) {
                Some(bytes) => decode_wav_bytes(&bytes),
                None => return Err(decode_error(format!("blob {} is not registered", blob))),
            },
            SourceRef::Remote(_) | SourceRef::Unknown(_) => {
                return Err(decode_error(format!(
                    "{} has no decodable local representation",
                    uri
                )))
            }
        };
        decoded.map_err(|err| decode_error(err.to_string()))
    }

    fn lock_active_job(&self) -> MutexGuard<'_, Option<JobHandle>> {
        self.active_job
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ---- events ----
    //
    // A disposed engine hands out inert tokens and registers nothing.

    pub fn add_event_listener<F>(&self, kind: EventKind, handler: F) -> SubscriptionToken
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        if self.is_disposed() {
            return SubscriptionToken::inert();
        }
        self.bus.subscribe(kind, handler)
    }

    /// Listen to every event kind.
    pub fn add_global_listener<F>(&self, handler: F) -> SubscriptionToken
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        if self.is_disposed() {
            return SubscriptionToken::inert();
        }
        self.bus.subscribe_all(handler)
    }

    /// Channel-backed subscription for consumers that pull events.
    ///
    /// Once disposed the receiver is already closed.
    pub fn event_channel(&self) -> (SubscriptionToken, mpsc::UnboundedReceiver<EngineEvent>) {
        if self.is_disposed() {
            let (_closed, rx) = mpsc::unbounded_channel();
            return (SubscriptionToken::inert(), rx);
        }
        self.bus.subscribe_channel()
    }

    pub fn subscriber_count(&self) -> usize {
        self.bus.subscriber_count()
    }

    pub fn remove_event_listener(&self, token: SubscriptionToken) -> bool {
        self.bus.unsubscribe(token)
    }

    // ---- lifecycle ----

    /// Release everything the engine holds.
    ///
    /// Cancels in-flight cloud jobs, unloads the sound, clears the chain,
    /// drops registered blobs and all subscribers. Safe from any state;
    /// later calls are no-ops, as are setters and subscriptions.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.cloud.cancel_all();
        self.playback.dispose().await;
        self.chain.clear();
        self.blobs.clear();
        self.bus.clear();
        log::info!("[AudioEngine] Disposed");
    }
}

fn origin_for(mode: ProcessingMode) -> ProcessingOrigin {
    if mode.is_cloud() {
        ProcessingOrigin::Cloud
    } else {
        ProcessingOrigin::Local
    }
}

fn decode_error(reason: String) -> ProcessingError {
    ProcessingError::local(ProcessingErrorKind::Decode { reason })
}

#[cfg(test)]
mod tests;
