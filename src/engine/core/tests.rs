use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::*;
use crate::cloud::{LoudnessStandard, MasteringOptions, MasteringProfile, StatusReply};
use crate::testing::{write_test_wav, ScriptedBackend, ScriptedTransport};

type Recorded = Arc<Mutex<Vec<EngineEvent>>>;

fn record_all(engine: &AudioEngine) -> Recorded {
    let events: Recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    engine.add_global_listener(move |event| sink.lock().unwrap().push(event.clone()));
    events
}

fn kinds(events: &Recorded) -> Vec<EventKind> {
    events.lock().unwrap().iter().map(EngineEvent::kind).collect()
}

fn remote_engine(backend: &ScriptedBackend, transport: &Arc<ScriptedTransport>) -> AudioEngine {
    let mut config = EngineConfig::default();
    config.polling.interval_ms = 1_000;
    config.polling.max_attempts = 10;
    AudioEngine::builder(config)
        .selector(BackendSelector::with_factories(vec![backend.factory()]))
        .cloud_backend(CloudBackend::Remote(transport.clone()))
        .build()
}

fn mastering_metrics() -> serde_json::Value {
    serde_json::json!({
        "loudness": -14.0,
        "dynamics": 9.5,
        "stereo_width": 1.1,
        "spectral_balance": {"low": 0.3, "mid": 0.4, "high": 0.3}
    })
}

#[tokio::test(start_paused = true)]
async fn test_cloud_mastering_end_to_end() {
    let backend = ScriptedBackend::ready("player", 180.0);
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .push_status(Ok(StatusReply::queued()))
        .push_status(Ok(StatusReply::processing()))
        .push_status(Ok(StatusReply::succeeded(
            Some("https://cdn.example.com/take-mastered.wav".to_string()),
            mastering_metrics(),
        )));
    let engine = remote_engine(&backend, &transport);

    assert_eq!(engine.load_audio("/music/take.wav").await.unwrap(), 180.0);
    let events = record_all(&engine);
    engine.set_processing_mode(ProcessingMode::CloudMastering);

    let options = ProcessOptions {
        mastering: MasteringOptions {
            profile: MasteringProfile::Balanced,
            ..Default::default()
        },
        ..Default::default()
    };
    let result = engine.process_audio("user-7", options).await.unwrap();

    match &result {
        ProcessingResult::Cloud(cloud) => {
            assert_eq!(cloud.original_uri, "/music/take.wav");
            assert_eq!(
                cloud.processed_uri.as_deref(),
                Some("https://cdn.example.com/take-mastered.wav")
            );
        }
        other => panic!("Expected a cloud result, got {:?}", other),
    }
    assert_eq!(transport.status_calls(), 3);
    assert_eq!(
        kinds(&events),
        vec![EventKind::ProcessingStarted, EventKind::ProcessingCompleted]
    );
    assert_eq!(
        events.lock().unwrap()[1],
        EngineEvent::ProcessingCompleted { result }
    );

    let payloads = transport.payloads();
    assert_eq!(payloads[0].1["user_id"], "user-7");
    assert_eq!(payloads[0].1["options"]["profile"], "balanced");
}

#[tokio::test]
async fn test_local_gain_renders_playable_blob() {
    let path = write_test_wav("engine_local_gain.wav", 1.0, 8_000).unwrap();
    let engine = AudioEngine::new(EngineConfig::default());
    engine.load_audio(path.to_str().unwrap()).await.unwrap();
    let events = record_all(&engine);

    let gain_id = engine.add_processing_module(
        ProcessingModule::new(ModuleKind::Gain).with_param("gain_db", -6.0),
    );
    engine.add_processing_module(ProcessingModule::new(ModuleKind::Reverb));

    let result = engine
        .process_audio("user-1", ProcessOptions::default())
        .await
        .unwrap();

    let local = match result {
        ProcessingResult::Local(local) => local,
        other => panic!("Expected a local result, got {:?}", other),
    };
    assert_eq!(local.modules_applied, vec![gain_id]);
    assert!(local.peak_level > 0.2 && local.peak_level < 0.3);
    assert!(local.output_uri.starts_with("blob:"));
    assert_eq!(
        kinds(&events),
        vec![EventKind::ProcessingStarted, EventKind::ProcessingCompleted]
    );

    let duration = engine.load_audio(&local.output_uri).await.unwrap();
    assert!((duration - 1.0).abs() < 1e-3);
}

#[tokio::test]
async fn test_processing_without_source_fails_once() {
    let engine = AudioEngine::new(EngineConfig::default());
    let events = record_all(&engine);

    let err = engine
        .process_audio("user-1", ProcessOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.origin, ProcessingOrigin::Local);
    assert_eq!(err.kind, ProcessingErrorKind::NoSource);
    assert_eq!(
        kinds(&events),
        vec![EventKind::ProcessingStarted, EventKind::ProcessingFailed]
    );
}

#[tokio::test(start_paused = true)]
async fn test_invalid_cloud_options_fail_without_submit() {
    let backend = ScriptedBackend::ready("player", 60.0);
    let transport = Arc::new(ScriptedTransport::new());
    let engine = remote_engine(&backend, &transport);
    engine.load_audio("/music/take.wav").await.unwrap();
    engine.set_processing_mode(ProcessingMode::CloudMastering);
    let events = record_all(&engine);

    let options = ProcessOptions {
        mastering: MasteringOptions {
            loudness_standard: LoudnessStandard::Custom,
            custom_loudness: None,
            ..Default::default()
        },
        ..Default::default()
    };
    let err = engine.process_audio("user-1", options).await.unwrap_err();

    assert!(matches!(err.kind, ProcessingErrorKind::InvalidOptions { .. }));
    assert_eq!(transport.submit_calls(), 0);
    match &events.lock().unwrap()[1] {
        EngineEvent::ProcessingFailed { error } => assert_eq!(*error, err),
        other => panic!("Expected ProcessingFailed, got {:?}", other),
    };
}

#[tokio::test(start_paused = true)]
async fn test_cancel_processing_emits_nothing_further() {
    let backend = ScriptedBackend::ready("player", 60.0);
    let transport = Arc::new(ScriptedTransport::new());
    transport.set_default_status(StatusReply::processing());
    let engine = remote_engine(&backend, &transport);
    engine.load_audio("/music/take.wav").await.unwrap();
    engine.set_processing_mode(ProcessingMode::CloudEnhancement);
    let events = record_all(&engine);

    assert!(!engine.cancel_processing());
    let (outcome, cancelled) = tokio::join!(
        engine.process_audio("user-1", ProcessOptions::default()),
        async {
            tokio::time::sleep(Duration::from_millis(2_500)).await;
            engine.cancel_processing()
        }
    );

    assert!(cancelled);
    assert!(outcome.unwrap_err().is_cancelled());
    assert_eq!(kinds(&events), vec![EventKind::ProcessingStarted]);
    assert!(!engine.cancel_processing());
}

#[tokio::test]
async fn test_analysis_uses_mock_and_emits_no_events() {
    let backend = ScriptedBackend::ready("player", 42.0);
    let engine = AudioEngine::builder(EngineConfig::default())
        .selector(BackendSelector::with_factories(vec![backend.factory()]))
        .build();
    engine.load_audio("/music/take.wav").await.unwrap();
    let events = record_all(&engine);

    let result = engine.analyze_audio("user-1").await.unwrap();

    assert_eq!(result.capability, crate::cloud::Capability::Analysis);
    assert!(result.processed_uri.is_none());
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_removed_listener_stops_receiving() {
    let backend = ScriptedBackend::ready("player", 10.0);
    let engine = AudioEngine::builder(EngineConfig::default())
        .selector(BackendSelector::with_factories(vec![backend.factory()]))
        .build();
    let loaded = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&loaded);
    let token = engine.add_event_listener(EventKind::AudioLoaded, move |_| {
        *counter.lock().unwrap() += 1;
    });

    engine.load_audio("a.wav").await.unwrap();
    assert!(engine.remove_event_listener(token));
    engine.load_audio("b.wav").await.unwrap();

    assert_eq!(*loaded.lock().unwrap(), 1);
    assert!(!engine.remove_event_listener(token));
}

#[test]
fn test_initialize_is_idempotent() {
    let engine = AudioEngine::new(EngineConfig::default());
    assert!(!engine.is_initialized());
    assert!(engine.initialize());
    assert!(!engine.initialize());
    assert!(engine.is_initialized());
}

#[test]
fn test_mode_and_chain_management() {
    let engine = AudioEngine::new(EngineConfig::default());
    assert_eq!(engine.processing_mode(), ProcessingMode::Local);
    engine.set_processing_mode(ProcessingMode::CloudEnhancement);
    assert_eq!(engine.processing_mode(), ProcessingMode::CloudEnhancement);

    let eq = engine.add_processing_module(ProcessingModule::new(ModuleKind::Equalizer));
    let comp = engine.add_processing_module(ProcessingModule::new(ModuleKind::Compressor));
    assert!(engine.set_module_enabled(&eq, false));
    engine.remove_processing_module(&comp);

    let chain = engine.get_processing_chain();
    assert_eq!(chain.len(), 1);
    assert!(!chain[0].enabled);
    engine.clear_processing_chain();
    assert!(engine.get_processing_chain().is_empty());
}

#[tokio::test]
async fn test_dispose_is_idempotent_and_terminal() {
    let backend = ScriptedBackend::ready("player", 30.0);
    let engine = AudioEngine::builder(EngineConfig::default())
        .selector(BackendSelector::with_factories(vec![backend.factory()]))
        .build();
    engine.load_audio("song.wav").await.unwrap();
    engine.add_processing_module(ProcessingModule::new(ModuleKind::Limiter));
    let events = record_all(&engine);

    engine.dispose().await;
    engine.dispose().await;

    assert!(engine.is_disposed());
    assert_eq!(backend.probe().unloads(), 1);
    assert!(engine.get_processing_chain().is_empty());
    assert_eq!(engine.subscriber_count(), 0);
    assert!(matches!(
        engine.load_audio("song.wav").await,
        Err(LoadError::EngineDisposed)
    ));
    let err = engine
        .process_audio("user-1", ProcessOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ProcessingErrorKind::EngineDisposed);
    engine.play().await.unwrap();
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_setters_and_subscriptions_after_dispose_change_nothing() {
    let engine = AudioEngine::new(EngineConfig::default());
    let rendered = engine.register_blob(vec![0; 16]);
    engine.dispose().await;

    assert!(engine
        .add_processing_module(ProcessingModule::new(ModuleKind::Gain).with_id("g"))
        .is_empty());
    assert!(!engine.set_module_enabled("g", false));
    engine.set_processing_mode(ProcessingMode::CloudMastering);
    let token = engine.add_event_listener(EventKind::AudioLoaded, |_| {});
    engine.add_global_listener(|_| {});
    let (_, mut rx) = engine.event_channel();

    assert!(engine.get_processing_chain().is_empty());
    assert_eq!(engine.processing_mode(), ProcessingMode::Local);
    assert_eq!(engine.subscriber_count(), 0);
    assert!(!engine.remove_event_listener(token));
    assert!(rx.recv().await.is_none());
    assert!(engine.blob(&rendered).is_none());
    assert!(engine.register_blob(vec![1, 2]).is_empty());
}
