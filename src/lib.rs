// Mastering Engine Core - Rust Audio Engine
// Backend-agnostic playback, local processing chain and cloud mastering jobs

// Module declarations
pub mod api;
pub mod cloud;
pub mod config;
pub mod engine;
pub mod error;
pub mod managers;
pub mod processing;
pub mod testing;

// Re-exports for convenience
pub use config::EngineConfig;
pub use engine::{AudioEngine, EngineBuilder, EngineEvent, EventKind};
pub use processing::{ProcessOptions, ProcessingMode, ProcessingModule, ProcessingResult};

use std::sync::Once;

static LOGGING: Once = Once::new();

/// Install the process-wide log subscriber. Later calls are no-ops.
///
/// `log` records from the engine are bridged into `tracing`, so one
/// subscriber sees both.
pub fn init_logging() {
    LOGGING.call_once(install_subscriber);
}

/// Android logcat via tracing-android
#[cfg(target_os = "android")]
fn install_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    match tracing_android::layer("MasteringEngine") {
        Ok(layer) => {
            let _ = tracing_subscriber::registry()
                .with(tracing_subscriber::filter::LevelFilter::DEBUG)
                .with(layer)
                .try_init();
        }
        Err(err) => eprintln!("Failed to open logcat writer: {}", err),
    }
}

#[cfg(not(target_os = "android"))]
fn install_subscriber() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}
