//! Pipeline configuration from environment variables

use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug)]
pub enum ConfigError {
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Configuration for the compliance pipeline
///
/// Loaded from environment variables with defaults, then validated. Any invalid
/// value is fatal at startup.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Count window size W per key
    pub window_size: usize,

    /// Join window length L
    pub join_window_ms: i64,

    /// Join slide S; must divide L
    pub join_slide_ms: i64,

    /// Alert when either compliance share drops below this fraction
    pub compliance_threshold: f64,

    /// Head-cover confidence (0-100) required for a compliant frontal frame
    pub min_confidence: f64,

    pub max_consecutive_failures: u32,

    /// How long an emitted request id suppresses repeats; at least L
    pub dedup_horizon_ms: i64,

    /// Aggregator windows of keys idle this long are evicted
    pub key_idle_ttl_secs: u64,

    pub dispatch_timeout_ms: u64,

    pub worker_shards: usize,

    pub channel_buffer: usize,

    pub alert_channel_buffer: usize,

    /// Substring a raw record must contain to be considered
    pub model_marker: String,

    /// Actuator endpoint; `None` runs a log-only actuator
    pub actuator_url: Option<String>,

    pub actuator_function: String,

    pub monitor_webhook_url: Option<String>,

    /// Input file; `None` reads stdin
    pub input_path: Option<String>,

    /// Keep reading appended lines instead of stopping at end of file
    pub input_follow: bool,

    /// JSONL audit file for joined records and dispatch outcomes
    pub alerts_output_path: Option<String>,

    /// How often shard statistics are logged
    pub stats_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            join_window_ms: 1_000,
            join_slide_ms: 100,
            compliance_threshold: 0.9,
            min_confidence: 70.0,
            max_consecutive_failures: 3,
            dedup_horizon_ms: 5_000,
            key_idle_ttl_secs: 600,
            dispatch_timeout_ms: 3_000,
            worker_shards: 4,
            channel_buffer: 10_000,
            alert_channel_buffer: 1_000,
            model_marker: "ProtectiveEquipmentModelVersion".to_string(),
            actuator_url: None,
            actuator_function: "sip-alert".to_string(),
            monitor_webhook_url: None,
            input_path: None,
            input_follow: false,
            alerts_output_path: None,
            stats_interval_secs: 10,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `WINDOW_SIZE` (default: 10)
    /// - `JOIN_WINDOW_MS` (default: 1000)
    /// - `JOIN_SLIDE_MS` (default: 100)
    /// - `COMPLIANCE_THRESHOLD` (default: 0.9)
    /// - `MIN_CONFIDENCE` (default: 70.0)
    /// - `MAX_CONSECUTIVE_FAILURES` (default: 3)
    /// - `DEDUP_HORIZON_MS` (default: 5000)
    /// - `KEY_IDLE_TTL_SECS` (default: 600)
    /// - `DISPATCH_TIMEOUT_MS` (default: 3000)
    /// - `WORKER_SHARDS` (default: 4)
    /// - `STREAM_CHANNEL_BUFFER` (default: 10000)
    /// - `ALERT_CHANNEL_BUFFER` (default: 1000)
    /// - `MODEL_MARKER` (default: ProtectiveEquipmentModelVersion)
    /// - `ACTUATOR_URL`, `ACTUATOR_FUNCTION` (default: sip-alert)
    /// - `MONITOR_WEBHOOK_URL`
    /// - `INPUT_PATH` (`-` or unset: stdin), `INPUT_FOLLOW` (default: false)
    /// - `ALERTS_OUTPUT_PATH`
    /// - `STATS_INTERVAL_SECS` (default: 10)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        // Signed parse so that negative sizes are reported instead of wrapping
        let window_size: i64 = parse_var("WINDOW_SIZE", defaults.window_size as i64)?;
        if window_size <= 0 {
            return Err(ConfigError::InvalidValue(format!(
                "WINDOW_SIZE must be positive, got {}",
                window_size
            )));
        }

        let config = Self {
            window_size: window_size as usize,
            join_window_ms: parse_var("JOIN_WINDOW_MS", defaults.join_window_ms)?,
            join_slide_ms: parse_var("JOIN_SLIDE_MS", defaults.join_slide_ms)?,
            compliance_threshold: parse_var("COMPLIANCE_THRESHOLD", defaults.compliance_threshold)?,
            min_confidence: parse_var("MIN_CONFIDENCE", defaults.min_confidence)?,
            max_consecutive_failures: parse_var(
                "MAX_CONSECUTIVE_FAILURES",
                defaults.max_consecutive_failures,
            )?,
            dedup_horizon_ms: parse_var("DEDUP_HORIZON_MS", defaults.dedup_horizon_ms)?,
            key_idle_ttl_secs: parse_var("KEY_IDLE_TTL_SECS", defaults.key_idle_ttl_secs)?,
            dispatch_timeout_ms: parse_var("DISPATCH_TIMEOUT_MS", defaults.dispatch_timeout_ms)?,
            worker_shards: parse_var("WORKER_SHARDS", defaults.worker_shards)?,
            channel_buffer: parse_var("STREAM_CHANNEL_BUFFER", defaults.channel_buffer)?,
            alert_channel_buffer: parse_var("ALERT_CHANNEL_BUFFER", defaults.alert_channel_buffer)?,
            model_marker: env::var("MODEL_MARKER").unwrap_or(defaults.model_marker),
            actuator_url: optional_var("ACTUATOR_URL"),
            actuator_function: env::var("ACTUATOR_FUNCTION").unwrap_or(defaults.actuator_function),
            monitor_webhook_url: optional_var("MONITOR_WEBHOOK_URL"),
            input_path: optional_var("INPUT_PATH").filter(|p| p != "-"),
            input_follow: parse_var("INPUT_FOLLOW", defaults.input_follow)?,
            alerts_output_path: optional_var("ALERTS_OUTPUT_PATH"),
            stats_interval_secs: parse_var("STATS_INTERVAL_SECS", defaults.stats_interval_secs)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return invalid("WINDOW_SIZE must be positive");
        }

        if self.join_slide_ms <= 0 || self.join_window_ms <= 0 {
            return invalid("JOIN_WINDOW_MS and JOIN_SLIDE_MS must be positive");
        }

        if self.join_slide_ms >= self.join_window_ms || self.join_window_ms % self.join_slide_ms != 0 {
            return invalid(&format!(
                "JOIN_SLIDE_MS ({}) must be smaller than and divide JOIN_WINDOW_MS ({})",
                self.join_slide_ms, self.join_window_ms
            ));
        }

        if self.dedup_horizon_ms < self.join_window_ms {
            return invalid(&format!(
                "DEDUP_HORIZON_MS ({}) must be at least JOIN_WINDOW_MS ({})",
                self.dedup_horizon_ms, self.join_window_ms
            ));
        }

        if !(0.0..=1.0).contains(&self.compliance_threshold) {
            return invalid("COMPLIANCE_THRESHOLD must be within [0.0, 1.0]");
        }

        if !(0.0..=100.0).contains(&self.min_confidence) {
            return invalid("MIN_CONFIDENCE must be within [0, 100]");
        }

        if self.max_consecutive_failures == 0 {
            return invalid("MAX_CONSECUTIVE_FAILURES must be at least 1");
        }

        if self.dispatch_timeout_ms == 0 {
            return invalid("DISPATCH_TIMEOUT_MS must be positive");
        }

        if self.worker_shards == 0 || self.channel_buffer == 0 || self.alert_channel_buffer == 0 {
            return invalid("WORKER_SHARDS and channel buffers must be positive");
        }

        if self.stats_interval_secs == 0 {
            return invalid("STATS_INTERVAL_SECS must be positive");
        }

        if let Some(url) = &self.actuator_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return invalid("ACTUATOR_URL must start with http:// or https://");
            }
        }

        Ok(())
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn key_idle_ttl_ms(&self) -> i64 {
        (self.key_idle_ttl_secs as i64).saturating_mul(1000)
    }
}

fn invalid(msg: &str) -> Result<(), ConfigError> {
    Err(ConfigError::InvalidValue(msg.to_string()))
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().to_lowercase().parse::<T>().map_err(|_| {
            ConfigError::InvalidValue(format!("{} has unparseable value '{}'", name, raw))
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window_size, 10);
        assert_eq!(config.join_window_ms, 1_000);
        assert_eq!(config.join_slide_ms, 100);
        assert_eq!(config.compliance_threshold, 0.9);
        assert_eq!(config.max_consecutive_failures, 3);
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = PipelineConfig {
            window_size: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_slide_must_divide_window() {
        let config = PipelineConfig {
            join_window_ms: 1_000,
            join_slide_ms: 300,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            join_window_ms: 1_000,
            join_slide_ms: 1_000,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_horizon_shorter_than_join_rejected() {
        let config = PipelineConfig {
            dedup_horizon_ms: 500,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let config = PipelineConfig {
            compliance_threshold: 1.5,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides_and_fatal_values() {
        // Single test touches the environment to avoid races between tests
        env::set_var("WINDOW_SIZE", "25");
        env::set_var("JOIN_WINDOW_MS", "2000");
        env::set_var("JOIN_SLIDE_MS", "250");
        env::set_var("INPUT_PATH", "-");
        env::set_var("INPUT_FOLLOW", "TRUE");

        let config = PipelineConfig::from_env().unwrap();
        assert_eq!(config.window_size, 25);
        assert_eq!(config.join_window_ms, 2_000);
        assert_eq!(config.join_slide_ms, 250);
        assert_eq!(config.input_path, None);
        assert!(config.input_follow);

        env::set_var("WINDOW_SIZE", "-3");
        assert!(PipelineConfig::from_env().is_err());

        env::set_var("WINDOW_SIZE", "ten");
        assert!(PipelineConfig::from_env().is_err());

        // Cleanup
        env::remove_var("WINDOW_SIZE");
        env::remove_var("JOIN_WINDOW_MS");
        env::remove_var("JOIN_SLIDE_MS");
        env::remove_var("INPUT_PATH");
        env::remove_var("INPUT_FOLLOW");
    }
}
