use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::PollingConfig;
use crate::error::{ProcessingError, ProcessingErrorKind, ProcessingOrigin};

/// Cloud processing capability, also the path segment of its API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Mastering,
    Enhancement,
    Analysis,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Mastering => write!(f, "mastering"),
            Capability::Enhancement => write!(f, "enhancement"),
            Capability::Analysis => write!(f, "analysis"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasteringProfile {
    #[default]
    Balanced,
    Warm,
    Bright,
    Punchy,
    Gentle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Wav,
    Mp3,
    Flac,
    Aac,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Wav => "wav",
            OutputFormat::Mp3 => "mp3",
            OutputFormat::Flac => "flac",
            OutputFormat::Aac => "aac",
        }
    }
}

/// Integrated loudness target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoudnessStandard {
    /// -14 LUFS
    #[default]
    Streaming,
    /// -16 LUFS
    Apple,
    /// -23 LUFS (EBU R128)
    Broadcast,
    /// -9 LUFS
    Club,
    /// Caller-provided target in `custom_loudness`
    Custom,
}

impl LoudnessStandard {
    /// Fixed target in LUFS; `None` for `Custom`.
    pub fn target_lufs(&self) -> Option<f64> {
        match self {
            LoudnessStandard::Streaming => Some(-14.0),
            LoudnessStandard::Apple => Some(-16.0),
            LoudnessStandard::Broadcast => Some(-23.0),
            LoudnessStandard::Club => Some(-9.0),
            LoudnessStandard::Custom => None,
        }
    }
}

/// Accepted range for custom loudness targets, in LUFS.
pub const CUSTOM_LOUDNESS_RANGE: (f64, f64) = (-30.0, -5.0);

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MasteringOptions {
    pub profile: MasteringProfile,
    pub output_format: OutputFormat,
    pub stereo_enhancement: bool,
    pub loudness_standard: LoudnessStandard,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_loudness: Option<f64>,
}

impl MasteringOptions {
    pub fn validate(&self) -> Result<(), ProcessingError> {
        if self.loudness_standard != LoudnessStandard::Custom {
            return Ok(());
        }
        let (min, max) = CUSTOM_LOUDNESS_RANGE;
        match self.custom_loudness {
            Some(lufs) if lufs.is_finite() && (min..=max).contains(&lufs) => Ok(()),
            Some(lufs) => Err(ProcessingError::invalid_options(
                ProcessingOrigin::Cloud,
                format!("custom loudness {} LUFS outside [{}, {}]", lufs, min, max),
            )),
            None => Err(ProcessingError::invalid_options(
                ProcessingOrigin::Cloud,
                "custom loudness standard requires custom_loudness",
            )),
        }
    }

    /// Effective loudness target in LUFS.
    pub fn target_loudness(&self) -> f64 {
        self.loudness_standard
            .target_lufs()
            .or(self.custom_loudness)
            .unwrap_or(-14.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementOptions {
    /// 0.0 (off) to 1.0 (maximum)
    pub noise_reduction_level: f64,
    pub output_format: OutputFormat,
}

impl Default for EnhancementOptions {
    fn default() -> Self {
        Self {
            noise_reduction_level: 0.5,
            output_format: OutputFormat::Wav,
        }
    }
}

impl EnhancementOptions {
    pub fn validate(&self) -> Result<(), ProcessingError> {
        let level = self.noise_reduction_level;
        if level.is_finite() && (0.0..=1.0).contains(&level) {
            Ok(())
        } else {
            Err(ProcessingError::invalid_options(
                ProcessingOrigin::Cloud,
                format!("noise reduction level {} outside [0, 1]", level),
            ))
        }
    }
}

/// Capability-specific options of a cloud request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CapabilityOptions {
    Mastering(MasteringOptions),
    Enhancement(EnhancementOptions),
    Analysis,
}

/// A request to a cloud capability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CloudRequest {
    pub user_id: String,
    pub source_uri: String,
    pub options: CapabilityOptions,
}

impl CloudRequest {
    pub fn mastering(user_id: &str, source_uri: &str, options: MasteringOptions) -> Self {
        Self {
            user_id: user_id.to_string(),
            source_uri: source_uri.to_string(),
            options: CapabilityOptions::Mastering(options),
        }
    }

    pub fn enhancement(user_id: &str, source_uri: &str, options: EnhancementOptions) -> Self {
        Self {
            user_id: user_id.to_string(),
            source_uri: source_uri.to_string(),
            options: CapabilityOptions::Enhancement(options),
        }
    }

    pub fn analysis(user_id: &str, source_uri: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            source_uri: source_uri.to_string(),
            options: CapabilityOptions::Analysis,
        }
    }

    pub fn capability(&self) -> Capability {
        match self.options {
            CapabilityOptions::Mastering(_) => Capability::Mastering,
            CapabilityOptions::Enhancement(_) => Capability::Enhancement,
            CapabilityOptions::Analysis => Capability::Analysis,
        }
    }

    pub fn validate(&self) -> Result<(), ProcessingError> {
        if self.source_uri.trim().is_empty() {
            return Err(ProcessingError::invalid_options(
                ProcessingOrigin::Cloud,
                "source uri is empty",
            ));
        }
        match &self.options {
            CapabilityOptions::Mastering(options) => options.validate(),
            CapabilityOptions::Enhancement(options) => options.validate(),
            CapabilityOptions::Analysis => Ok(()),
        }
    }

    /// JSON body of the submit call.
    pub fn payload(&self) -> Value {
        let options = match &self.options {
            CapabilityOptions::Analysis => Value::Object(Default::default()),
            other => serde_json::to_value(other).unwrap_or(Value::Null),
        };
        serde_json::json!({
            "user_id": self.user_id,
            "source_uri": self.source_uri,
            "options": options,
        })
    }

    pub fn output_format(&self) -> OutputFormat {
        match &self.options {
            CapabilityOptions::Mastering(options) => options.output_format,
            CapabilityOptions::Enhancement(options) => options.output_format,
            CapabilityOptions::Analysis => OutputFormat::Wav,
        }
    }
}

/// Server-side job status. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Succeeded,
    Failed,
}

impl JobStatus {
    fn rank(&self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Processing => 1,
            JobStatus::Succeeded | JobStatus::Failed => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() == 2
    }
}

/// Orchestrator record for one in-flight job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CloudJob {
    pub id: String,
    pub capability: Capability,
    pub status: JobStatus,
    /// Status polls issued so far
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl CloudJob {
    pub fn new(id: String, capability: Capability) -> Self {
        Self {
            id,
            capability,
            status: JobStatus::Queued,
            attempts: 0,
            last_error: None,
        }
    }

    /// Move to `next` unless that would go backwards.
    ///
    /// Returns whether the status changed. A terminal status never changes.
    pub fn advance(&mut self, next: JobStatus) -> bool {
        if self.status.is_terminal() || next.rank() < self.status.rank() || next == self.status {
            return false;
        }
        self.status = next;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectralBalance {
    pub low: f64,
    pub mid: f64,
    pub high: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MasteringMetrics {
    /// Integrated loudness, LUFS
    pub loudness: f64,
    /// Loudness range, LU
    pub dynamics: f64,
    pub stereo_width: f64,
    pub spectral_balance: SpectralBalance,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnrChange {
    pub before: f64,
    pub after: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnhancementMetrics {
    /// Noise removed, dB
    pub noise_reduction_amount: f64,
    pub signal_to_noise_ratio: SnrChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMetrics {
    #[serde(flatten)]
    pub mastering: MasteringMetrics,
    pub signal_to_noise_ratio: f64,
    pub peak_level: f64,
    pub true_peak_level: f64,
    pub clipping_percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CloudMetrics {
    Mastering(MasteringMetrics),
    Enhancement(EnhancementMetrics),
    Analysis(AnalysisMetrics),
}

impl CloudMetrics {
    /// Decode the metrics object of a status reply for `capability`.
    pub fn from_wire(capability: Capability, value: Value) -> Result<Self, serde_json::Error> {
        Ok(match capability {
            Capability::Mastering => CloudMetrics::Mastering(serde_json::from_value(value)?),
            Capability::Enhancement => CloudMetrics::Enhancement(serde_json::from_value(value)?),
            Capability::Analysis => CloudMetrics::Analysis(serde_json::from_value(value)?),
        })
    }
}

/// Immutable result of one successful job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CloudResult {
    pub job_id: String,
    pub capability: Capability,
    pub original_uri: String,
    /// Absent for analysis, which produces no audio
    pub processed_uri: Option<String>,
    pub metrics: CloudMetrics,
    /// Unix milliseconds
    pub created_at: u64,
}

/// Poll ceiling for one `await_completion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl PollPolicy {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl From<&PollingConfig> for PollPolicy {
    fn from(config: &PollingConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            interval_ms: config.interval_ms,
        }
    }
}

/// Body of a successful submit call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitAck {
    pub job_id: String,
}

/// Body of a status poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusReply {
    pub fn queued() -> Self {
        Self {
            status: JobStatus::Queued,
            output: None,
            metrics: None,
            error: None,
        }
    }

    pub fn processing() -> Self {
        Self {
            status: JobStatus::Processing,
            ..Self::queued()
        }
    }

    pub fn succeeded(output: Option<String>, metrics: Value) -> Self {
        Self {
            status: JobStatus::Succeeded,
            output,
            metrics: Some(metrics),
            error: None,
        }
    }

    pub fn failed(message: &str) -> Self {
        Self {
            status: JobStatus::Failed,
            error: Some(message.to_string()),
            ..Self::queued()
        }
    }

    /// Build the result of a `Succeeded` reply.
    pub fn into_result(
        self,
        job_id: &str,
        capability: Capability,
        original_uri: &str,
        created_at: u64,
    ) -> Result<CloudResult, ProcessingError> {
        let metrics = self.metrics.ok_or_else(|| {
            ProcessingError::cloud(ProcessingErrorKind::Decode {
                reason: format!("job {} succeeded without metrics", job_id),
            })
        })?;
        let metrics = CloudMetrics::from_wire(capability, metrics).map_err(|err| {
            ProcessingError::cloud(ProcessingErrorKind::Decode {
                reason: format!("job {} metrics: {}", job_id, err),
            })
        })?;
        if capability != Capability::Analysis && self.output.is_none() {
            return Err(ProcessingError::cloud(ProcessingErrorKind::Decode {
                reason: format!("job {} succeeded without output", job_id),
            }));
        }

        Ok(CloudResult {
            job_id: job_id.to_string(),
            capability,
            original_uri: original_uri.to_string(),
            processed_uri: self.output,
            metrics,
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_loudness_range() {
        let mut options = MasteringOptions {
            loudness_standard: LoudnessStandard::Custom,
            ..Default::default()
        };
        assert!(options.validate().is_err());

        options.custom_loudness = Some(-31.0);
        assert!(options.validate().is_err());

        options.custom_loudness = Some(-12.5);
        assert!(options.validate().is_ok());
        assert_eq!(options.target_loudness(), -12.5);

        assert_eq!(MasteringOptions::default().target_loudness(), -14.0);
    }

    #[test]
    fn test_noise_reduction_range() {
        let options = EnhancementOptions {
            noise_reduction_level: 1.5,
            ..Default::default()
        };
        let err = options.validate().unwrap_err();
        assert!(matches!(err.kind, ProcessingErrorKind::InvalidOptions { .. }));
        assert!(EnhancementOptions::default().validate().is_ok());
    }

    #[test]
    fn test_job_status_only_moves_forward() {
        let mut job = CloudJob::new("j1".to_string(), Capability::Mastering);
        assert!(job.advance(JobStatus::Processing));
        assert!(!job.advance(JobStatus::Queued));
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.advance(JobStatus::Succeeded));
        assert!(!job.advance(JobStatus::Failed));
        assert_eq!(job.status, JobStatus::Succeeded);
    }

    #[test]
    fn test_payload_shape() {
        let request = CloudRequest::mastering("u1", "/a.wav", MasteringOptions::default());
        let payload = request.payload();
        assert_eq!(payload["user_id"], "u1");
        assert_eq!(payload["options"]["profile"], "balanced");
        assert_eq!(payload["options"]["loudness_standard"], "streaming");

        let analysis = CloudRequest::analysis("u1", "/a.wav").payload();
        assert!(analysis["options"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_analysis_metrics_flatten_on_the_wire() {
        let wire = serde_json::json!({
            "loudness": -10.0,
            "dynamics": 7.0,
            "stereo_width": 0.9,
            "spectral_balance": {"low": 0.3, "mid": 0.4, "high": 0.3},
            "signal_to_noise_ratio": 55.0,
            "peak_level": -0.5,
            "true_peak_level": -0.3,
            "clipping_percentage": 0.1
        });
        let reply = StatusReply::succeeded(None, wire);
        let result = reply
            .into_result("j9", Capability::Analysis, "/a.wav", 1)
            .unwrap();
        match result.metrics {
            CloudMetrics::Analysis(metrics) => {
                assert_eq!(metrics.mastering.loudness, -10.0);
                assert_eq!(metrics.clipping_percentage, 0.1);
            }
            other => panic!("Expected analysis metrics, got {:?}", other),
        }
    }

    #[test]
    fn test_success_without_metrics_is_decode_error() {
        let reply = StatusReply {
            metrics: None,
            ..StatusReply::succeeded(Some("https://out".to_string()), Value::Null)
        };
        let err = reply
            .into_result("j1", Capability::Mastering, "/a.wav", 1)
            .unwrap_err();
        assert!(matches!(err.kind, ProcessingErrorKind::Decode { .. }));
    }
}
