use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::StatusCode;

use crate::error::AdapterError;

use super::decode::{probe_wav_bytes, SourceRef};
use super::{
    AdapterStatus, BackendAdapter, BackendKind, PlaybackCursor, ReadyInfo, StatusListener,
    TimeSource,
};

/// Fetch a remote source in full, bounded by `timeout`.
pub(super) async fn fetch_remote(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<Vec<u8>, AdapterError> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|err| {
            if err.is_timeout() {
                AdapterError::Timeout {
                    after_ms: timeout.as_millis() as u64,
                }
            } else {
                AdapterError::Network {
                    reason: err.to_string(),
                }
            }
        })?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(AdapterError::NotFound {
            uri: url.to_string(),
        });
    }
    if !status.is_success() {
        return Err(AdapterError::Network {
            reason: format!("GET {} returned {}", url, status),
        });
    }

    let bytes = response.bytes().await.map_err(|err| AdapterError::Network {
        reason: err.to_string(),
    })?;
    Ok(bytes.to_vec())
}

/// Streaming media element over http(s).
pub struct MediaElementAdapter {
    cursor: Arc<PlaybackCursor>,
    client: reqwest::Client,
    load_timeout: Duration,
}

impl MediaElementAdapter {
    pub fn new(
        clock: Arc<dyn TimeSource>,
        client: reqwest::Client,
        load_timeout: Duration,
        progress_interval: Duration,
    ) -> Self {
        Self {
            cursor: PlaybackCursor::new(clock, progress_interval),
            client,
            load_timeout,
        }
    }

    async fn open(&self, uri: &str) -> Result<ReadyInfo, AdapterError> {
        let url = match SourceRef::parse(uri) {
            SourceRef::Remote(url) => url,
            _ => {
                return Err(AdapterError::UnsupportedSource {
                    uri: uri.to_string(),
                })
            }
        };

        let bytes = fetch_remote(&self.client, &url, self.load_timeout).await?;
        let duration = probe_wav_bytes(&bytes)?;
        self.cursor.reset(duration);
        log::debug!("[MediaElement] Opened {} ({:.2}s)", url, duration);
        Ok(ReadyInfo { duration })
    }
}

impl BackendAdapter for MediaElementAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::MediaElement
    }

    fn load<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, Result<ReadyInfo, AdapterError>> {
        self.open(uri).boxed()
    }

    fn play(&self) -> BoxFuture<'_, Result<(), AdapterError>> {
        self.cursor.play();
        futures::future::ready(Ok(())).boxed()
    }

    fn pause(&self) -> BoxFuture<'_, Result<(), AdapterError>> {
        self.cursor.pause();
        futures::future::ready(Ok(())).boxed()
    }

    fn stop(&self) -> BoxFuture<'_, Result<(), AdapterError>> {
        self.cursor.stop();
        futures::future::ready(Ok(())).boxed()
    }

    fn seek(&self, seconds: f64) -> BoxFuture<'_, Result<(), AdapterError>> {
        self.cursor.seek(seconds);
        futures::future::ready(Ok(())).boxed()
    }

    fn status(&self) -> AdapterStatus {
        self.cursor.status()
    }

    fn set_status_listener(&self, listener: StatusListener) {
        self.cursor.set_listener(listener);
    }

    fn unload(&self) -> BoxFuture<'_, ()> {
        self.cursor.unload();
        futures::future::ready(()).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::backend::SystemTimeSource;

    #[tokio::test]
    async fn test_rejects_local_sources_without_network() {
        let adapter = MediaElementAdapter::new(
            Arc::new(SystemTimeSource::default()),
            reqwest::Client::new(),
            Duration::from_millis(200),
            Duration::from_millis(50),
        );
        let err = adapter.load("/music/song.wav").await.unwrap_err();
        assert!(matches!(err, AdapterError::UnsupportedSource { .. }));
        assert_eq!(adapter.kind(), BackendKind::MediaElement);
    }
}
