use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::AdapterError;

use super::decode::{probe_wav_file, SourceRef};
use super::{
    AdapterStatus, BackendAdapter, BackendKind, PlaybackCursor, ReadyInfo, StatusListener,
    TimeSource,
};

/// Platform media player over local files.
///
/// Only the container header is read at load time; the player streams from
/// disk, so nothing is kept in memory.
pub struct NativePlayerAdapter {
    cursor: Arc<PlaybackCursor>,
    load_timeout: Duration,
}

impl NativePlayerAdapter {
    pub fn new(
        clock: Arc<dyn TimeSource>,
        load_timeout: Duration,
        progress_interval: Duration,
    ) -> Self {
        Self {
            cursor: PlaybackCursor::new(clock, progress_interval),
            load_timeout,
        }
    }

    async fn open(&self, uri: &str) -> Result<ReadyInfo, AdapterError> {
        let path = match SourceRef::parse(uri) {
            SourceRef::File(path) => path,
            _ => {
                return Err(AdapterError::UnsupportedSource {
                    uri: uri.to_string(),
                })
            }
        };

        let probe = tokio::task::spawn_blocking(move || probe_wav_file(&path));
        let duration = match tokio::time::timeout(self.load_timeout, probe).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_err)) => {
                return Err(AdapterError::Io {
                    reason: join_err.to_string(),
                })
            }
            Err(_) => {
                return Err(AdapterError::Timeout {
                    after_ms: self.load_timeout.as_millis() as u64,
                })
            }
        };

        self.cursor.reset(duration);
        log::debug!("[NativePlayer] Opened {} ({:.2}s)", uri, duration);
        Ok(ReadyInfo { duration })
    }
}

impl BackendAdapter for NativePlayerAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::NativePlayer
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
    use crate::testing::write_test_wav;

    fn adapter() -> NativePlayerAdapter {
        NativePlayerAdapter::new(
            Arc::new(SystemTimeSource::default()),
            Duration::from_secs(2),
            Duration::from_millis(50),
        )
    }

    #[tokio::test]
    async fn test_loads_local_wav() {
        let path = write_test_wav("native_player_load.wav", 2.0, 8_000).unwrap();
        let adapter = adapter();
        let ready = adapter.load(path.to_str().unwrap()).await.unwrap();
        assert!((ready.duration - 2.0).abs() < 1e-6);
        assert_eq!(adapter.status().duration, ready.duration);
    }

    #[tokio::test]
    async fn test_rejects_remote_sources() {
        let err = adapter()
            .load("https://cdn.example.com/song.wav")
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::UnsupportedSource { .. }));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = adapter()
            .load("file:///nonexistent/song.wav")
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::NotFound { .. }));
    }
}
