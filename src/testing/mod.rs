//! Test doubles for the engine's seams.
//!
//! Scripted backends and transports let unit and integration tests drive
//! the playback controller and the cloud orchestrator deterministically,
//! without audio hardware or a network.

mod clock;
mod scripted_backend;
mod scripted_transport;
mod wav;

pub use clock::ManualTimeSource;
pub use scripted_backend::{AdapterProbe, ScriptedBackend};
pub use scripted_transport::ScriptedTransport;
pub use wav::write_test_wav;
