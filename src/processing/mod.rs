// Processing module - local chain execution and processing request types
//
// The chain itself lives in the ChainManager; this module holds the mode,
// options and result types shared by the local and cloud paths.

pub mod local;
pub mod module;

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::cloud::{CloudResult, EnhancementOptions, MasteringOptions, PollPolicy};

pub use local::{AudioTransform, GainTransform, LocalProcessor, LocalRun};
pub use module::{ModuleKind, ParamValue, ProcessingModule};

/// Engine-wide processing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// Run the local chain over the decoded buffer
    #[default]
    Local,
    CloudMastering,
    CloudEnhancement,
}

impl ProcessingMode {
    pub fn is_cloud(&self) -> bool {
        !matches!(self, ProcessingMode::Local)
    }
}

/// Options for `process_audio`; only the section matching the mode is used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessOptions {
    pub mastering: MasteringOptions,
    pub enhancement: EnhancementOptions,
    /// Overrides the configured poll ceiling for this request
    pub polling: Option<PollPolicy>,
}

/// Result of a local chain run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalResult {
    pub source_uri: String,
    /// `blob:` reference to the rendered WAV, playable through `load_audio`
    pub output_uri: String,
    pub modules_applied: Vec<String>,
    pub peak_level: f32,
    pub rms_level: f32,
    pub created_at: u64,
}

/// Payload of `ProcessingCompleted`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "origin", content = "result", rename_all = "snake_case")]
pub enum ProcessingResult {
    Local(LocalResult),
    Cloud(CloudResult),
}

/// Current Unix time in milliseconds.
pub(crate) fn now_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
