use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::AdapterError;

use super::decode::{decode_wav_bytes, decode_wav_file, PcmBuffer, SourceRef};
use super::media_element::fetch_remote;
use super::{
    AdapterStatus, BackendAdapter, BackendKind, BlobRegistry, PlaybackCursor, ReadyInfo,
    StatusListener, TimeSource,
};

/// Decode-to-memory audio context.
///
/// The whole source is decoded at load time, which makes this the only
/// built-in backend that can hand PCM to the local processing chain.
pub struct AudioBufferAdapter {
    cursor: Arc<PlaybackCursor>,
    blobs: BlobRegistry,
    client: reqwest::Client,
    load_timeout: Duration,
    buffer: Mutex<Option<Arc<PcmBuffer>>>,
}

impl AudioBufferAdapter {
    pub fn new(
        clock: Arc<dyn TimeSource>,
        blobs: BlobRegistry,
        client: reqwest::Client,
        load_timeout: Duration,
        progress_interval: Duration,
    ) -> Self {
        Self {
            cursor: PlaybackCursor::new(clock, progress_interval),
            blobs,
            client,
            load_timeout,
            buffer: Mutex::new(None),
        }
    }

    async fn decode(&self, uri: &str) -> Result<PcmBuffer, AdapterError> {
        match SourceRef::parse(uri) {
            SourceRef::File(path) => {
                let decode = tokio::task::spawn_blocking(move || decode_wav_file(&path));
                match tokio::time::timeout(self.load_timeout, decode).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(join_err)) => Err(AdapterError::Io {
                        reason: join_err.to_string(),
                    }),
                    Err(_) => Err(AdapterError::Timeout {
                        after_ms: self.load_timeout.as_millis() as u64,
                    }),
                }
            }
            SourceRef::Blob(blob_uri) => {
                let bytes = self
                    .blobs
                    .get(&blob_uri)
                    .ok_or(AdapterError::NotFound { uri: blob_uri })?;
                decode_wav_bytes(&bytes)
            }
            SourceRef::Remote(url) => {
                let bytes = fetch_remote(&self.client, &url, self.load_timeout).await?;
                decode_wav_bytes(&bytes)
            }
            SourceRef::Unknown(_) => Err(AdapterError::UnsupportedSource {
                uri: uri.to_string(),
            }),
        }
    }

    async fn open(&self, uri: &str) -> Result<ReadyInfo, AdapterError> {
        let pcm = self.decode(uri).await?;
        let duration = pcm.duration_secs();
        self.cursor.reset(duration);
        *self.buffer.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(pcm));
        log::debug!("[AudioBuffer] Decoded {} ({:.2}s)", uri, duration);
        Ok(ReadyInfo { duration })
    }
}

impl BackendAdapter for AudioBufferAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::AudioBuffer
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
        *self.buffer.lock().unwrap_or_else(PoisonError::into_inner) = None;
        futures::future::ready(()).boxed()
    }

    fn decoded_buffer(&self) -> Option<Arc<PcmBuffer>> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::backend::decode::encode_wav;
    use crate::engine::backend::SystemTimeSource;

    fn adapter(blobs: BlobRegistry) -> AudioBufferAdapter {
        AudioBufferAdapter::new(
            Arc::new(SystemTimeSource::default()),
            blobs,
            reqwest::Client::new(),
            Duration::from_secs(2),
            Duration::from_millis(50),
        )
    }

    #[tokio::test]
    async fn test_decodes_blob_and_exposes_buffer() {
        let blobs = BlobRegistry::new();
        let pcm = PcmBuffer {
            samples: vec![0.25; 16_000],
            channels: 2,
            sample_rate: 8_000,
        };
        let uri = blobs.register(encode_wav(&pcm).unwrap());

        let adapter = adapter(blobs);
        let ready = adapter.load(&uri).await.unwrap();
        assert!((ready.duration - 1.0).abs() < 1e-6);

        let buffer = adapter.decoded_buffer().unwrap();
        assert_eq!(buffer.channels, 2);
        assert_eq!(buffer.frames(), 8_000);

        adapter.unload().await;
        assert!(adapter.decoded_buffer().is_none());
    }

    #[tokio::test]
    async fn test_unknown_blob_is_not_found() {
        let err = adapter(BlobRegistry::new())
            .load("blob:404")
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::NotFound { .. }));
    }
}
