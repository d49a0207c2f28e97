use rand::Rng;

use crate::processing::now_timestamp_ms;

use super::types::{
    AnalysisMetrics, Capability, CapabilityOptions, CloudMetrics, CloudRequest, CloudResult,
    EnhancementMetrics, EnhancementOptions, MasteringMetrics, MasteringOptions, MasteringProfile,
    SnrChange, SpectralBalance,
};

/// Synthetic cloud provider for development builds.
///
/// Results are produced immediately at submit time. Metrics depend only on
/// the request options, so the same request always reports the same numbers;
/// only the job id is random.
#[derive(Debug, Clone, Default)]
pub struct MockProvider {
    _unit: (),
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn complete(&self, request: &CloudRequest) -> CloudResult {
        let job_id = format!("mock-{:08x}", rand::thread_rng().gen::<u32>());
        let capability = request.capability();
        let metrics = match &request.options {
            CapabilityOptions::Mastering(options) => {
                CloudMetrics::Mastering(mastering_metrics(options))
            }
            CapabilityOptions::Enhancement(options) => {
                CloudMetrics::Enhancement(enhancement_metrics(options))
            }
            CapabilityOptions::Analysis => CloudMetrics::Analysis(analysis_metrics()),
        };
        let processed_uri = match capability {
            Capability::Analysis => None,
            _ => Some(format!(
                "mock://{}/{}.{}",
                capability,
                job_id,
                request.output_format().extension()
            )),
        };

        log::info!(
            "[MockProvider] Completed {} job {} for {}",
            capability,
            job_id,
            request.source_uri
        );

        CloudResult {
            job_id,
            capability,
            original_uri: request.source_uri.clone(),
            processed_uri,
            metrics,
            created_at: now_timestamp_ms(),
        }
    }
}

fn profile_shape(profile: MasteringProfile) -> (f64, SpectralBalance) {
    let (dynamics, low, mid, high) = match profile {
        MasteringProfile::Balanced => (8.0, 0.33, 0.34, 0.33),
        MasteringProfile::Warm => (9.0, 0.40, 0.35, 0.25),
        MasteringProfile::Bright => (7.5, 0.25, 0.35, 0.40),
        MasteringProfile::Punchy => (6.0, 0.38, 0.37, 0.25),
        MasteringProfile::Gentle => (10.0, 0.32, 0.36, 0.32),
    };
    (dynamics, SpectralBalance { low, mid, high })
}

fn mastering_metrics(options: &MasteringOptions) -> MasteringMetrics {
    let (dynamics, spectral_balance) = profile_shape(options.profile);
    MasteringMetrics {
        loudness: options.target_loudness(),
        dynamics,
        stereo_width: if options.stereo_enhancement { 1.2 } else { 1.0 },
        spectral_balance,
    }
}

fn enhancement_metrics(options: &EnhancementOptions) -> EnhancementMetrics {
    const BASELINE_SNR_DB: f64 = 18.0;
    let reduction = options.noise_reduction_level * 24.0;
    EnhancementMetrics {
        noise_reduction_amount: reduction,
        signal_to_noise_ratio: SnrChange {
            before: BASELINE_SNR_DB,
            after: BASELINE_SNR_DB + reduction,
        },
    }
}

fn analysis_metrics() -> AnalysisMetrics {
    let (dynamics, spectral_balance) = profile_shape(MasteringProfile::Balanced);
    AnalysisMetrics {
        mastering: MasteringMetrics {
            loudness: -14.0,
            dynamics,
            stereo_width: 1.0,
            spectral_balance,
        },
        signal_to_noise_ratio: 60.0,
        peak_level: -1.0,
        true_peak_level: -0.8,
        clipping_percentage: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::types::{LoudnessStandard, OutputFormat};

    #[test]
    fn test_mastering_metrics_follow_options() {
        let options = MasteringOptions {
            profile: MasteringProfile::Punchy,
            output_format: OutputFormat::Flac,
            stereo_enhancement: true,
            loudness_standard: LoudnessStandard::Club,
            custom_loudness: None,
        };
        let result = MockProvider::new().complete(&CloudRequest::mastering("u", "/a.wav", options));

        assert!(result.job_id.starts_with("mock-"));
        assert!(result.processed_uri.as_deref().unwrap().ends_with(".flac"));
        match result.metrics {
            CloudMetrics::Mastering(metrics) => {
                assert_eq!(metrics.loudness, -9.0);
                assert_eq!(metrics.stereo_width, 1.2);
            }
            other => panic!("Expected mastering metrics, got {:?}", other),
        }
    }

    #[test]
    fn test_analysis_has_no_output() {
        let result = MockProvider::new().complete(&CloudRequest::analysis("u", "/a.wav"));
        assert!(result.processed_uri.is_none());
        assert_eq!(result.capability, Capability::Analysis);
    }
}
