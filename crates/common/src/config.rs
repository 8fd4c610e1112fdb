//! Validator configuration loading using TOML and serde.
//! The struct is intentionally small and typed; every field has a default
//! so a missing file or empty table still yields a runnable config.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Default per-field values, also used by `Default`.
const DEFAULT_ALPHA: f64 = 0.1;
const DEFAULT_QUERY_RATE: u64 = 2;
const DEFAULT_CHECK_INTERVAL_MS: u64 = 1_000;
const DEFAULT_CONCURRENCY: usize = 1;
const DEFAULT_TELEMETRY_LOG_LIMIT: u64 = 500;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// EMA smoothing factor in `[0, 1]`; weight given to a fresh reward.
    #[serde(default = "default_alpha")]
    pub moving_average_alpha: f64,

    /// Minimum block delta between two ticks.
    #[serde(default = "default_query_rate")]
    pub query_rate: u64,

    /// Idle poll interval for the block height check, in milliseconds.
    /// Distinct from `query_rate`: this is how often we look, not how far
    /// the chain must have advanced.
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,

    /// Concurrent probe-and-score sub-cycles per tick.
    #[serde(default = "default_concurrency")]
    pub num_concurrent_probes: usize,

    /// Telemetry emits before the sink is rolled over to a fresh run.
    #[serde(default = "default_telemetry_log_limit")]
    pub telemetry_log_limit: u64,

    /// Blob store key for the persisted run state.
    #[serde(default = "default_state_key")]
    pub state_key: String,

    /// Data directory for filesystem-backed state.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Bind address for the local status/metrics HTTP listener.
    #[serde(default = "default_status_bind_addr")]
    pub status_bind_addr: String,
}

fn default_alpha() -> f64 {
    DEFAULT_ALPHA
}
fn default_query_rate() -> u64 {
    DEFAULT_QUERY_RATE
}
fn default_check_interval_ms() -> u64 {
    DEFAULT_CHECK_INTERVAL_MS
}
fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}
fn default_telemetry_log_limit() -> u64 {
    DEFAULT_TELEMETRY_LOG_LIMIT
}
fn default_state_key() -> String {
    "validator_state.json".to_string()
}
fn default_data_dir() -> String {
    "./data".to_string()
}
fn default_status_bind_addr() -> String {
    "127.0.0.1:9100".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            moving_average_alpha: DEFAULT_ALPHA,
            query_rate: DEFAULT_QUERY_RATE,
            check_interval_ms: DEFAULT_CHECK_INTERVAL_MS,
            num_concurrent_probes: DEFAULT_CONCURRENCY,
            telemetry_log_limit: DEFAULT_TELEMETRY_LOG_LIMIT,
            state_key: default_state_key(),
            data_dir: default_data_dir(),
            status_bind_addr: default_status_bind_addr(),
        }
    }
}

/// Startup-fatal configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("moving_average_alpha must be in [0, 1], got {0}")]
    AlphaOutOfRange(f64),

    #[error("num_concurrent_probes must be at least 1")]
    ZeroConcurrency,

    #[error("check_interval_ms must be nonzero")]
    ZeroCheckInterval,
}

impl Config {
    /// Load config from a TOML file path and validate it.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let s = fs::read_to_string(path.as_ref())?;
        let cfg: Config = toml::from_str(&s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check field ranges. Invalid config aborts startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.moving_average_alpha.is_finite()
            || !(0.0..=1.0).contains(&self.moving_average_alpha)
        {
            return Err(ConfigError::AlphaOutOfRange(self.moving_average_alpha));
        }
        if self.num_concurrent_probes == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.check_interval_ms == 0 {
            return Err(ConfigError::ZeroCheckInterval);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.query_rate, 2);
        assert_eq!(cfg.num_concurrent_probes, 1);
    }

    #[test]
    fn test_load_from_file_roundtrip() {
        let mut tmp = tempfile::NamedTempFile::new().expect("tmpfile");
        writeln!(
            tmp,
            "moving_average_alpha = 0.2\nquery_rate = 5\nnum_concurrent_probes = 4"
        )
        .expect("write");

        let cfg = Config::load_from_file(tmp.path()).expect("load");
        assert_eq!(cfg.moving_average_alpha, 0.2);
        assert_eq!(cfg.query_rate, 5);
        assert_eq!(cfg.num_concurrent_probes, 4);
        // untouched fields keep defaults
        assert_eq!(cfg.check_interval_ms, 1_000);
    }

    #[test]
    fn test_alpha_out_of_range_rejected() {
        let cfg = Config {
            moving_average_alpha: 1.5,
            ..Config::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::AlphaOutOfRange(_))
        ));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let cfg = Config {
            num_concurrent_probes: 0,
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::ZeroConcurrency)));
    }

    #[test]
    fn test_missing_file_errors() {
        assert!(matches!(
            Config::load_from_file("/nonexistent/validator.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
