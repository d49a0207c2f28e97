// Managers Module
//
// Focused managers owned by each AudioEngine, one concern apiece:
// - ChainManager: ordered processing module descriptors
// - EventBus: typed publish/subscribe for playback and processing events

pub mod chain_manager;
pub mod event_bus;

pub use chain_manager::ChainManager;
pub use event_bus::{EventBus, EventHandler, SubscriptionToken};
