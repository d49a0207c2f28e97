// Cloud module - asynchronous mastering, enhancement and analysis jobs
//
// Components:
// - types: request options, job records, metrics and the wire format
// - transport: the CloudTransport seam and its reqwest implementation
// - retry: transport-level retry with exponential backoff
// - mock: synthetic provider for development builds
// - orchestrator: job table, polling, cancellation and shared awaiters

pub mod mock;
pub mod orchestrator;
pub mod retry;
pub mod transport;
pub mod types;

pub use mock::MockProvider;
pub use orchestrator::{CloudBackend, CloudOrchestrator, JobHandle, Submission};
pub use retry::RetryPolicy;
pub use transport::{CloudTransport, HttpTransport, TransportError};
pub use types::{
    AnalysisMetrics, Capability, CapabilityOptions, CloudJob, CloudMetrics, CloudRequest,
    CloudResult, EnhancementMetrics, EnhancementOptions, JobStatus, LoudnessStandard,
    MasteringMetrics, MasteringOptions, MasteringProfile, OutputFormat, PollPolicy, SnrChange,
    SpectralBalance, StatusReply, SubmitAck,
};
