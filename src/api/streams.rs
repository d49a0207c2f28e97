use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::engine::{AudioEngine, EngineEvent};
use crate::managers::SubscriptionToken;

use super::engine;

/// Stream of engine events, in publish order
///
/// Dropping the stream removes its subscription from the engine it was
/// opened on.
pub struct EngineEventStream {
    inner: UnboundedReceiverStream<EngineEvent>,
    token: SubscriptionToken,
    engine: Arc<AudioEngine>,
}

impl EngineEventStream {
    pub(crate) fn open(engine: Arc<AudioEngine>) -> Self {
        let (token, rx) = engine.event_channel();
        Self {
            inner: UnboundedReceiverStream::new(rx),
            token,
            engine,
        }
    }
}

impl Stream for EngineEventStream {
    type Item = EngineEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for EngineEventStream {
    fn drop(&mut self) {
        self.engine.remove_event_listener(self.token);
    }
}

/// Stream of playback and processing events from the global engine
///
/// The stream ends when the engine is disposed.
#[flutter_rust_bridge::frb(ignore)]
pub fn engine_event_stream() -> EngineEventStream {
    EngineEventStream::open(engine())
}
