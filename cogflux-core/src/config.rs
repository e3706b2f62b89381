//! Configuration types for the cogflux memory manager

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FluxConfig {
    /// Hot tier (active context) configuration
    #[serde(default)]
    pub hot: HotConfig,

    /// Warm tier (beliefs) configuration
    #[serde(default)]
    pub warm: WarmConfig,

    /// Context loading configuration
    #[serde(default)]
    pub context: ContextLoaderConfig,

    /// Archive pipeline configuration
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Cold tier configuration
    #[serde(default)]
    pub cold: ColdConfig,

    /// Auto-archive monitor configuration
    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// Hot memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotConfig {
    /// Token budget used when callers don't pass one
    pub default_max_tokens: usize,

    /// Text of the synthetic system message left behind by an archive
    pub archive_marker: String,
}

impl Default for HotConfig {
    fn default() -> Self {
        Self {
            default_max_tokens: 8192,
            archive_marker:
                "[archived] Prior context was archived; its summary is available in warm memory."
                    .to_string(),
        }
    }
}

/// Warm memory bounding policy
///
/// Summaries and decisions are bounded differently on purpose: summaries are
/// ranked by relevance, decisions by recency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmConfig {
    /// Summary count above which compression kicks in
    pub summary_limit: usize,

    /// Number of summaries kept (highest relevance) once over the limit
    pub summaries_retained: usize,

    /// Number of most recent decisions kept
    pub decision_limit: usize,
}

impl Default for WarmConfig {
    fn default() -> Self {
        Self {
            summary_limit: 100,
            summaries_retained: 50,
            decision_limit: 100,
        }
    }
}

/// Context loader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextLoaderConfig {
    /// Default number of summaries per loaded context
    pub max_summaries: usize,

    /// Number of decisions per loaded context
    pub max_decisions: usize,

    /// Optional cap on preferences per loaded context (unbounded when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_preferences: Option<usize>,
}

impl Default for ContextLoaderConfig {
    fn default() -> Self {
        Self {
            max_summaries: 5,
            max_decisions: 3,
            max_preferences: None,
        }
    }
}

/// Archive pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Relevance assigned to archive summaries until a scoring model exists
    pub default_relevance: f64,

    /// Maximum characters kept per message in a summary
    pub excerpt_chars: usize,

    /// How long a cold reference created by an archive stays valid
    #[serde(with = "humantime_serde")]
    pub cold_ttl: Duration,

    /// Attempts for the cold write (2 = retry once)
    pub max_attempts: usize,

    /// Delay between attempts
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            default_relevance: 0.8,
            excerpt_chars: 200,
            cold_ttl: Duration::from_secs(365 * 24 * 60 * 60),
            max_attempts: 2,
            retry_delay: Duration::from_millis(100),
        }
    }
}

/// Cold tier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColdConfig {
    /// Timeout applied to every call into the cold archive service
    #[serde(with = "humantime_serde")]
    pub access_timeout: Duration,

    /// Base URL of a remote cold archive service (in-process archive when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
}

impl Default for ColdConfig {
    fn default() -> Self {
        Self {
            access_timeout: Duration::from_secs(10),
            service_url: None,
        }
    }
}

/// Auto-archive monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Run the monitor at all
    pub enabled: bool,

    /// Utilization at which the active agent is archived proactively
    pub threshold: f64,

    /// Interval of the fallback utilization poll
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Utilization event buffer size
    pub buffer_size: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.9,
            poll_interval: Duration::from_secs(1),
            buffer_size: 100,
        }
    }
}

impl FluxConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default hot token budget
    pub fn with_default_max_tokens(mut self, max_tokens: usize) -> Self {
        self.hot.default_max_tokens = max_tokens;
        self
    }

    /// Set the proactive archive threshold
    pub fn with_monitor_threshold(mut self, threshold: f64) -> Self {
        self.monitor.threshold = threshold.clamp(0.1, 1.0);
        self
    }

    /// Enable or disable the auto-archive monitor
    pub fn with_monitor(mut self, enabled: bool) -> Self {
        self.monitor.enabled = enabled;
        self
    }

    /// Set the cold access timeout
    pub fn with_cold_timeout(mut self, timeout: Duration) -> Self {
        self.cold.access_timeout = timeout;
        self
    }

    /// Set archive attempts (minimum 1)
    pub fn with_archive_attempts(mut self, attempts: usize) -> Self {
        self.archive.max_attempts = attempts.max(1);
        self
    }

    /// Set the delay between archive attempts
    pub fn with_archive_retry_delay(mut self, delay: Duration) -> Self {
        self.archive.retry_delay = delay;
        self
    }

    /// Load configuration from file and environment variables.
    ///
    /// Loads in this order:
    /// 1. Default configuration
    /// 2. `cogflux.toml` in the working directory
    /// 3. File named by `COGFLUX_CONFIG_PATH`
    /// 4. `COGFLUX_`-prefixed environment variables (`__` separates sections,
    ///    e.g. `COGFLUX_MONITOR__THRESHOLD=0.85`)
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration source is invalid.
    pub fn load() -> crate::error::Result<Self> {
        use figment::{
            Figment,
            providers::{Env, Format, Serialized, Toml},
        };

        let mut figment = Figment::from(Serialized::defaults(FluxConfig::default()))
            .merge(Toml::file("cogflux.toml"));

        if let Ok(path) = std::env::var("COGFLUX_CONFIG_PATH") {
            figment = figment.merge(Toml::file(path));
        }

        let config: FluxConfig = figment
            .merge(Env::prefixed("COGFLUX_").ignore(&["CONFIG_PATH"]).split("__"))
            .extract()
            .map_err(|e| {
                crate::error::FluxError::Configuration(format!(
                    "Failed to load configuration: {}",
                    e
                ))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::error::Result<Self> {
        use figment::{
            Figment,
            providers::{Format, Serialized, Toml},
        };

        let config: FluxConfig = Figment::from(Serialized::defaults(FluxConfig::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| {
                crate::error::FluxError::Configuration(format!(
                    "Failed to load configuration file: {}",
                    e
                ))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is out of range.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::FluxError;

        if self.hot.default_max_tokens == 0 {
            return Err(FluxError::Configuration(
                "hot.default_max_tokens must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.archive.default_relevance) {
            return Err(FluxError::Configuration(
                "archive.default_relevance must be within [0, 1]".into(),
            ));
        }
        if self.archive.max_attempts == 0 {
            return Err(FluxError::Configuration(
                "archive.max_attempts must be at least 1".into(),
            ));
        }
        if self.warm.summaries_retained > self.warm.summary_limit {
            return Err(FluxError::Configuration(
                "warm.summaries_retained cannot exceed warm.summary_limit".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.monitor.threshold) || self.monitor.threshold == 0.0 {
            return Err(FluxError::Configuration(
                "monitor.threshold must be within (0, 1]".into(),
            ));
        }
        if self.monitor.buffer_size == 0 {
            return Err(FluxError::Configuration(
                "monitor.buffer_size must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = FluxConfig::default();
        assert_eq!(config.warm.summary_limit, 100);
        assert_eq!(config.warm.summaries_retained, 50);
        assert_eq!(config.warm.decision_limit, 100);
        assert_eq!(config.context.max_summaries, 5);
        assert_eq!(config.context.max_decisions, 3);
        assert_eq!(config.archive.default_relevance, 0.8);
        assert_eq!(config.archive.max_attempts, 2);
        assert_eq!(config.monitor.threshold, 0.9);
        assert_eq!(
            config.archive.cold_ttl,
            Duration::from_secs(365 * 24 * 60 * 60)
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = FluxConfig::new()
            .with_default_max_tokens(4096)
            .with_monitor_threshold(2.0)
            .with_archive_attempts(0);

        assert_eq!(config.hot.default_max_tokens, 4096);
        assert_eq!(config.monitor.threshold, 1.0);
        assert_eq!(config.archive.max_attempts, 1);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = FluxConfig::default();
        config.warm.summaries_retained = 200;
        assert!(config.validate().is_err());

        let mut config = FluxConfig::default();
        config.hot.default_max_tokens = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_partial_override() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            r#"
[monitor]
enabled = false
threshold = 0.75
poll_interval = "250ms"
buffer_size = 10

[archive]
default_relevance = 0.6
excerpt_chars = 80
cold_ttl = "30days"
max_attempts = 3
retry_delay = "10ms"
"#
        )
        .expect("write config");

        let config = FluxConfig::from_file(file.path()).expect("config should load");
        assert!(!config.monitor.enabled);
        assert_eq!(config.monitor.threshold, 0.75);
        assert_eq!(config.monitor.poll_interval, Duration::from_millis(250));
        assert_eq!(config.archive.max_attempts, 3);
        assert_eq!(config.archive.cold_ttl, Duration::from_secs(30 * 86400));
        // Untouched sections keep their defaults
        assert_eq!(config.warm.summary_limit, 100);
    }
}
