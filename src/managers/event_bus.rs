// EventBus: per-engine publish/subscribe for lifecycle events
// Single Responsibility: Subscriber bookkeeping and isolated delivery

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::engine::events::{EngineEvent, EventKind};

/// Handler invoked for each delivered event.
pub type EventHandler = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

/// Token returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

impl SubscriptionToken {
    /// Token that matches no subscription; issued tokens start at 1.
    pub fn inert() -> Self {
        SubscriptionToken(0)
    }
}

struct Subscription {
    token: SubscriptionToken,
    /// `None` receives every kind
    kind: Option<EventKind>,
    handler: EventHandler,
}

/// Manages engine event subscribers
///
/// Single Responsibility: Subscriber lifecycle and event delivery
///
/// - Handlers for a kind are invoked in subscription order
/// - A panicking handler is logged and skipped; delivery continues
/// - No replay: a subscriber added after an event never sees it
/// - Handlers run after the subscriber lock is released, so they may call
///   back into the engine (including subscribe/unsubscribe)
pub struct EventBus {
    subscriptions: Mutex<Vec<Subscription>>,
    next_token: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscriptions: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, kind: Option<EventKind>, handler: EventHandler) -> SubscriptionToken {
        let token = SubscriptionToken(self.next_token.fetch_add(1, Ordering::Relaxed) + 1);
        self.lock().push(Subscription {
            token,
            kind,
            handler,
        });
        token
    }

    /// Subscribe to one event kind
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionToken
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        self.insert(Some(kind), Arc::new(handler))
    }

    /// Subscribe to every event kind
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionToken
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        self.insert(None, Arc::new(handler))
    }

    /// Subscribe to every event kind through an unbounded channel
    ///
    /// The subscription stays registered until `unsubscribe` or `clear`;
    /// events sent after the receiver is dropped are discarded.
    pub fn subscribe_channel(&self) -> (SubscriptionToken, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = self.subscribe_all(move |event| {
            let _ = tx.send(event.clone());
        });
        (token, rx)
    }

    /// Remove a subscription; returns false if the token was unknown
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut subscriptions = self.lock();
        let before = subscriptions.len();
        subscriptions.retain(|subscription| subscription.token != token);
        subscriptions.len() != before
    }

    /// Deliver an event to all current subscribers of its kind
    ///
    /// # Returns
    /// Number of handlers that completed without panicking
    pub fn publish(&self, event: &EngineEvent) -> usize {
        let kind = event.kind();
        let handlers: Vec<EventHandler> = self
            .lock()
            .iter()
            .filter(|subscription| subscription.kind.map_or(true, |k| k == kind))
            .map(|subscription| Arc::clone(&subscription.handler))
            .collect();

        let mut delivered = 0;
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    log::warn!(
                        "[EventBus] Handler for {:?} panicked: {}",
                        kind,
                        panic_message(payload)
                    );
                }
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Drop every subscription
    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        return (*msg).to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(duration: f64) -> EngineEvent {
        EngineEvent::AudioLoaded { duration }
    }

    #[test]
    fn test_delivery_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for id in 0..3 {
            let order = Arc::clone(&order);
            bus.subscribe(EventKind::AudioLoaded, move |_| order.lock().unwrap().push(id));
        }

        assert_eq!(bus.publish(&loaded(1.0)), 3);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_only_matching_kind_is_delivered() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&hits);
        bus.subscribe(EventKind::ProcessingStarted, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(bus.publish(&loaded(2.0)), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_handler_does_not_block_others() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicU64::new(0));
        bus.subscribe(EventKind::AudioLoaded, |_| panic!("observer bug"));
        let counter = Arc::clone(&hits);
        bus.subscribe(EventKind::AudioLoaded, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(bus.publish(&loaded(1.0)), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_and_no_replay() {
        let bus = EventBus::new();
        bus.publish(&loaded(1.0));

        let hits = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&hits);
        let token = bus.subscribe_all(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        bus.publish(&loaded(1.0));
        assert!(bus.unsubscribe(token));
        assert!(!bus.unsubscribe(token));
        bus.publish(&loaded(1.0));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_may_unsubscribe_during_publish() {
        let bus = Arc::new(EventBus::new());
        let slot: Arc<Mutex<Option<SubscriptionToken>>> = Arc::new(Mutex::new(None));
        let inner_bus = Arc::clone(&bus);
        let inner_slot = Arc::clone(&slot);
        let token = bus.subscribe(EventKind::AudioLoaded, move |_| {
            if let Some(token) = *inner_slot.lock().unwrap() {
                inner_bus.unsubscribe(token);
            }
        });
        *slot.lock().unwrap() = Some(token);

        bus.publish(&loaded(1.0));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_inert_token_unsubscribes_nothing() {
        let bus = EventBus::new();
        bus.subscribe_all(|_| {});
        assert!(!bus.unsubscribe(SubscriptionToken::inert()));
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_channel_subscription() {
        let bus = EventBus::new();
        let (_token, mut rx) = bus.subscribe_channel();
        bus.publish(&loaded(4.0));
        assert_eq!(rx.try_recv().unwrap(), loaded(4.0));

        bus.clear();
        bus.publish(&loaded(5.0));
        assert!(rx.try_recv().is_err());
    }
}
