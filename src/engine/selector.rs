//! Backend selection and ordered fallback.
//!
//! Adding a backend means extending the candidate list; the fallback
//! algorithm itself never changes.

use std::sync::Arc;
use std::time::Duration;

use crate::config::PlatformCapabilities;
use crate::engine::backend::{
    AdapterFactory, AudioBufferAdapter, BackendAdapter, BackendKind, BlobRegistry,
    MediaElementAdapter, NativePlayerAdapter, ReadyInfo, SourceRef, TimeSource,
};
use crate::error::{AdapterFailure, LoadError};

/// Shared resources handed to every built-in adapter.
#[derive(Clone)]
pub struct BackendEnvironment {
    pub clock: Arc<dyn TimeSource>,
    pub blobs: BlobRegistry,
    pub http: reqwest::Client,
    pub load_timeout: Duration,
    pub progress_interval: Duration,
}

/// An adapter that reported ready.
pub struct LoadedAdapter {
    pub adapter: Box<dyn BackendAdapter>,
    pub ready: ReadyInfo,
}

enum Registry {
    BuiltIn(BackendEnvironment),
    Fixed(Vec<AdapterFactory>),
}

/// Chooses candidate adapters for a source and drives the fallback sequence.
pub struct BackendSelector {
    capabilities: PlatformCapabilities,
    registry: Registry,
}

impl BackendSelector {
    /// Selector over the built-in adapters allowed by `capabilities`.
    pub fn new(capabilities: PlatformCapabilities, env: BackendEnvironment) -> Self {
        Self {
            capabilities,
            registry: Registry::BuiltIn(env),
        }
    }

    /// Selector that tries exactly `factories`, in order, for every source.
    pub fn with_factories(factories: Vec<AdapterFactory>) -> Self {
        Self {
            capabilities: PlatformCapabilities::default(),
            registry: Registry::Fixed(factories),
        }
    }

    pub fn capabilities(&self) -> PlatformCapabilities {
        self.capabilities
    }

    /// Ordered adapter constructors to try for `uri`.
    pub fn candidates(&self, uri: &str) -> Vec<AdapterFactory> {
        match &self.registry {
            Registry::Fixed(factories) => factories.clone(),
            Registry::BuiltIn(env) => preferred_order(&SourceRef::parse(uri), &self.capabilities)
                .into_iter()
                .map(|kind| built_in_factory(kind, env.clone()))
                .collect(),
        }
    }

    /// Try each candidate in order until one reports ready.
    ///
    /// A failing adapter is unloaded and discarded immediately; none is
    /// retried. The error, if every candidate fails, lists each failure in
    /// the order the candidates were tried.
    pub async fn load_with_fallback(
        &self,
        uri: &str,
        candidates: Vec<AdapterFactory>,
    ) -> Result<LoadedAdapter, LoadError> {
        if candidates.is_empty() {
            return Err(LoadError::NoBackends {
                uri: uri.to_string(),
            });
        }

        let mut failures = Vec::with_capacity(candidates.len());
        for factory in candidates {
            let adapter = factory.build();
            match adapter.load(uri).await {
                Ok(ready) => {
                    log::info!(
                        "[BackendSelector] {} ready for {} ({:.2}s) after {} failed attempt(s)",
                        factory.kind(),
                        uri,
                        ready.duration,
                        failures.len()
                    );
                    return Ok(LoadedAdapter { adapter, ready });
                }
                Err(error) => {
                    log::warn!(
                        "[BackendSelector] {} failed to load {}: {}",
                        factory.kind(),
                        uri,
                        error
                    );
                    adapter.unload().await;
                    failures.push(AdapterFailure {
                        backend: factory.kind().clone(),
                        error,
                    });
                }
            }
        }

        Err(LoadError::Exhausted {
            uri: uri.to_string(),
            failures,
        })
    }
}

/// Backend preference for a source on this platform.
fn preferred_order(source: &SourceRef, caps: &PlatformCapabilities) -> Vec<BackendKind> {
    let order = match source {
        SourceRef::File(_) if caps.web => vec![BackendKind::AudioBuffer],
        SourceRef::File(_) => vec![BackendKind::NativePlayer, BackendKind::AudioBuffer],
        SourceRef::Remote(_) => vec![BackendKind::MediaElement, BackendKind::AudioBuffer],
        SourceRef::Blob(_) => vec![BackendKind::AudioBuffer],
        SourceRef::Unknown(_) if caps.web => {
            vec![BackendKind::MediaElement, BackendKind::AudioBuffer]
        }
        SourceRef::Unknown(_) => vec![
            BackendKind::NativePlayer,
            BackendKind::AudioBuffer,
            BackendKind::MediaElement,
        ],
    };

    order
        .into_iter()
        .filter(|kind| match kind {
            BackendKind::NativePlayer => caps.native_player,
            BackendKind::AudioBuffer => caps.audio_buffer,
            BackendKind::MediaElement => caps.media_element,
            BackendKind::Custom(_) => true,
        })
        .collect()
}

fn built_in_factory(kind: BackendKind, env: BackendEnvironment) -> AdapterFactory {
    match kind {
        BackendKind::NativePlayer => AdapterFactory::new(kind, move || {
            Box::new(NativePlayerAdapter::new(
                Arc::clone(&env.clock),
                env.load_timeout,
                env.progress_interval,
            ))
        }),
        BackendKind::MediaElement => AdapterFactory::new(kind, move || {
            Box::new(MediaElementAdapter::new(
                Arc::clone(&env.clock),
                env.http.clone(),
                env.load_timeout,
                env.progress_interval,
            ))
        }),
        // Custom kinds never come out of `preferred_order`; decode to memory.
        BackendKind::AudioBuffer | BackendKind::Custom(_) => {
            AdapterFactory::new(BackendKind::AudioBuffer, move || {
                Box::new(AudioBufferAdapter::new(
                    Arc::clone(&env.clock),
                    env.blobs.clone(),
                    env.http.clone(),
                    env.load_timeout,
                    env.progress_interval,
                ))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::backend::SystemTimeSource;
    use crate::error::AdapterError;
    use crate::testing::ScriptedBackend;

    fn env() -> BackendEnvironment {
        BackendEnvironment {
            clock: Arc::new(SystemTimeSource::default()),
            blobs: BlobRegistry::new(),
            http: reqwest::Client::new(),
            load_timeout: Duration::from_secs(1),
            progress_interval: Duration::from_millis(100),
        }
    }

    fn kinds(factories: &[AdapterFactory]) -> Vec<BackendKind> {
        factories.iter().map(|f| f.kind().clone()).collect()
    }

    #[test]
    fn test_native_platform_prefers_native_player_for_files() {
        let selector = BackendSelector::new(PlatformCapabilities::default(), env());
        assert_eq!(
            kinds(&selector.candidates("/music/a.wav")),
            vec![BackendKind::NativePlayer, BackendKind::AudioBuffer]
        );
        assert_eq!(
            kinds(&selector.candidates("https://cdn.example.com/a.wav")),
            vec![BackendKind::MediaElement, BackendKind::AudioBuffer]
        );
        assert_eq!(
            kinds(&selector.candidates("blob:1")),
            vec![BackendKind::AudioBuffer]
        );
    }

    #[test]
    fn test_capability_flags_filter_candidates() {
        let caps = PlatformCapabilities {
            native_player: false,
            audio_buffer: true,
            media_element: false,
            web: false,
        };
        let selector = BackendSelector::new(caps, env());
        assert_eq!(
            kinds(&selector.candidates("/music/a.wav")),
            vec![BackendKind::AudioBuffer]
        );

        let none = PlatformCapabilities {
            audio_buffer: false,
            ..caps
        };
        let selector = BackendSelector::new(none, env());
        assert!(selector.candidates("blob:1").is_empty());
    }

    #[tokio::test]
    async fn test_falls_back_to_third_adapter() {
        let a = ScriptedBackend::failing("a", AdapterError::Decode { reason: "a".into() });
        let b = ScriptedBackend::failing("b", AdapterError::Timeout { after_ms: 10 });
        let c = ScriptedBackend::ready("c", 42.0);
        let selector =
            BackendSelector::with_factories(vec![a.factory(), b.factory(), c.factory()]);

        let loaded = selector
            .load_with_fallback("song.wav", selector.candidates("song.wav"))
            .await
            .unwrap();

        assert_eq!(loaded.adapter.kind(), BackendKind::Custom("c".to_string()));
        assert_eq!(loaded.ready.duration, 42.0);
        assert_eq!(a.probe().loads(), 1);
        assert_eq!(b.probe().loads(), 1);
        assert_eq!(a.probe().unloads(), 1);
    }

    #[tokio::test]
    async fn test_all_failing_aggregates_in_registration_order() {
        let backends = [
            ScriptedBackend::failing("a", AdapterError::Decode { reason: "a".into() }),
            ScriptedBackend::failing("b", AdapterError::Network { reason: "b".into() }),
            ScriptedBackend::failing("c", AdapterError::Io { reason: "c".into() }),
        ];
        let selector =
            BackendSelector::with_factories(backends.iter().map(|b| b.factory()).collect());

        let err = selector
            .load_with_fallback("song.wav", selector.candidates("song.wav"))
            .await
            .err()
            .unwrap();

        match err {
            LoadError::Exhausted { failures, .. } => {
                let order: Vec<_> = failures.iter().map(|f| f.backend.to_string()).collect();
                assert_eq!(order, vec!["custom:a", "custom:b", "custom:c"]);
            }
            other => panic!("Expected Exhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_candidate_list() {
        let selector = BackendSelector::with_factories(vec![]);
        let err = selector
            .load_with_fallback("x", vec![])
            .await
            .err()
            .unwrap();
        assert!(matches!(err, LoadError::NoBackends { .. }));
    }
}
