//! Configuration management for the audio engine
//!
//! Runtime configuration is loaded from a JSON file so backend preferences,
//! cloud endpoints and retry/poll ceilings can be adjusted without
//! recompiling. Every section falls back to defaults when missing.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Complete engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub playback: PlaybackConfig,
    pub cloud: CloudConfig,
    pub retry: RetryConfig,
    pub polling: PollingConfig,
}

/// Which playback technologies exist on the running platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformCapabilities {
    /// Platform media player over local files
    pub native_player: bool,
    /// Decode-to-memory audio context
    pub audio_buffer: bool,
    /// Streaming media element over http(s)
    pub media_element: bool,
    /// Running inside a browser shell (changes backend preference order)
    pub web: bool,
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "wasm32")] {
        const DEFAULT_WEB_SHELL: bool = true;
    } else {
        const DEFAULT_WEB_SHELL: bool = false;
    }
}

impl Default for PlatformCapabilities {
    fn default() -> Self {
        Self {
            native_player: !DEFAULT_WEB_SHELL,
            audio_buffer: true,
            media_element: true,
            web: DEFAULT_WEB_SHELL,
        }
    }
}

/// Playback backend parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub capabilities: PlatformCapabilities,
    /// Upper bound each adapter applies to its own load
    pub load_timeout_ms: u64,
    /// Interval between time updates while playing
    pub progress_interval_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            capabilities: PlatformCapabilities::default(),
            load_timeout_ms: 10_000,
            progress_interval_ms: 250,
        }
    }
}

impl PlaybackConfig {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(1))
    }
}

/// Cloud strategy selection, resolved once when the engine is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloudMode {
    /// Synthetic results returned directly from submit
    Mock,
    /// Real HTTP API with job polling
    Live,
}

/// Cloud processing API parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    pub mode: CloudMode,
    pub base_url: String,
    /// Bearer credential attached to every request when present
    pub api_key: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            mode: CloudMode::Mock,
            base_url: "https://api.mastering.example.com/v1".to_string(),
            api_key: None,
            request_timeout_ms: 30_000,
        }
    }
}

/// Transport-level retry for individual HTTP calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per call, including the first
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
        }
    }
}

/// Job status polling ceiling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            interval_ms: 2_000,
        }
    }
}

impl EngineConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or defaults if the file is missing or invalid
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|err| {
                log::warn!(
                    "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }),
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        let config = serde_json::from_str(contents)?;
        log::info!("[Config] Loaded engine configuration");
        Ok(config)
    }

    /// Load configuration for the running platform
    ///
    /// Android bundles assets inside the APK, which are not reachable through
    /// the filesystem, so it always starts from defaults.
    pub fn load() -> Self {
        #[cfg(target_os = "android")]
        {
            log::info!("[Config] Using default configuration on Android");
            Self::default()
        }

        #[cfg(not(target_os = "android"))]
        {
            Self::load_from_file("assets/engine_config.json")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay_ms, 500);
        assert_eq!(config.polling.max_attempts, 60);
        assert_eq!(config.cloud.mode, CloudMode::Mock);
        assert!(config.playback.capabilities.audio_buffer);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{ "cloud": { "mode": "live", "base_url": "http://localhost:9000" },
                        "polling": { "max_attempts": 5 } }"#;
        let config = EngineConfig::from_json(json).unwrap();

        assert_eq!(config.cloud.mode, CloudMode::Live);
        assert_eq!(config.cloud.base_url, "http://localhost:9000");
        assert_eq!(config.cloud.request_timeout_ms, 30_000);
        assert_eq!(config.polling.max_attempts, 5);
        assert_eq!(config.polling.interval_ms, 2_000);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = EngineConfig::load_from_file("/nonexistent/engine_config.json");
        assert_eq!(config.playback.load_timeout_ms, 10_000);
    }

    #[test]
    fn test_invalid_json_uses_defaults() {
        let path = std::env::temp_dir().join("mastering_engine_bad_config.json");
        fs::write(&path, "{ not json").unwrap();
        let config = EngineConfig::load_from_file(&path);
        assert_eq!(config.cloud.mode, CloudMode::Mock);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_progress_interval_never_zero() {
        let config = PlaybackConfig {
            progress_interval_ms: 0,
            ..PlaybackConfig::default()
        };
        assert_eq!(config.progress_interval(), Duration::from_millis(1));
    }
}
