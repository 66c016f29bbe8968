// crates/pipeline-config/src/lib.rs
// ============================================================================
// Crate: pipeline-config
// Description: Loading and validation of the pipeline host's configuration.
// Purpose: Give the CLI and orchestrator one validated configuration
//          surface, read from a TOML file with fail-closed guards on path
//          length, file size, and encoding.
// ============================================================================

//! ## Overview
//! [`PipelineConfig::load`] reads and validates a TOML configuration file.
//! Loading never panics on malformed input: every failure mode (path too
//! long, file too large, invalid UTF-8, invalid TOML, an out-of-range
//! field) is reported through [`ConfigError`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;

use pipeline_core::review::ReviewThresholds;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum accepted length of a configuration file path.
const MAX_CONFIG_PATH_LENGTH: usize = 4096;
/// Maximum accepted length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum accepted configuration file size, in bytes.
const MAX_CONFIG_FILE_BYTES: u64 = 1_048_576;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors returned while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration path exceeded [`MAX_CONFIG_PATH_LENGTH`].
    #[error("config path exceeds max length of {MAX_CONFIG_PATH_LENGTH} bytes")]
    PathTooLong,
    /// A path component exceeded [`MAX_PATH_COMPONENT_LENGTH`].
    #[error("config path component too long")]
    PathComponentTooLong,
    /// The configuration file could not be read.
    #[error("failed to read config file: {0}")]
    Io(String),
    /// The configuration file exceeded [`MAX_CONFIG_FILE_BYTES`].
    #[error("config file exceeds size limit of {MAX_CONFIG_FILE_BYTES} bytes")]
    FileTooLarge,
    /// The configuration file was not valid UTF-8.
    #[error("config file must be utf-8")]
    InvalidEncoding,
    /// The configuration file was not valid TOML, or did not match the
    /// expected shape.
    #[error("failed to parse config: {0}")]
    Parse(String),
    /// A field failed validation after parsing.
    #[error("{0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Bus redelivery configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Maximum delivery attempts before an envelope is dead-lettered.
    pub max_attempts: u32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

/// Kill-switch automatic triggering configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KillSwitchConfig {
    /// Failure rate, `0.0..=1.0`, that activates a global kill switch
    /// automatically.
    pub failure_rate_threshold: f64,
    /// Minimum number of samples required before the failure rate is
    /// considered significant.
    pub minimum_sample_size: u32,
    /// Consecutive failures, with no intervening success, that activate a
    /// global kill switch automatically.
    pub max_consecutive_failures: u32,
}

impl Default for KillSwitchConfig {
    fn default() -> Self {
        Self { failure_rate_threshold: 0.5, minimum_sample_size: 5, max_consecutive_failures: 5 }
    }
}

/// Execution store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Filesystem path to the `SQLite` database file.
    pub database_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { database_path: "pipeline.db".to_string() }
    }
}

/// HTTP server configuration for the kill-switch status and health
/// surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the status/health HTTP server binds to.
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: "127.0.0.1:8080".to_string() }
    }
}

/// Full, validated pipeline host configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Default review thresholds applied to every execution unless a
    /// request overrides them.
    pub thresholds: ReviewThresholds,
    /// Event bus redelivery configuration.
    pub bus: BusConfig,
    /// Kill-switch automatic triggering configuration.
    pub kill_switch: KillSwitchConfig,
    /// Execution store configuration.
    pub store: StoreConfig,
    /// HTTP server configuration.
    pub server: ServerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            thresholds: ReviewThresholds::default(),
            bus: BusConfig::default(),
            kill_switch: KillSwitchConfig::default(),
            store: StoreConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Loads configuration from `path`, or returns the default
    /// configuration when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        validate_path(path)?;

        let metadata = fs::metadata(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        if metadata.len() > MAX_CONFIG_FILE_BYTES {
            return Err(ConfigError::FileTooLarge);
        }

        let bytes = fs::read(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        let contents = String::from_utf8(bytes).map_err(|_| ConfigError::InvalidEncoding)?;

        let config: Self = toml::from_str(&contents).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every numeric and textual field, returning the first
    /// violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bus.max_attempts == 0 {
            return Err(ConfigError::Invalid("bus.max_attempts must be greater than zero".to_string()));
        }
        if !(0.0..=1.0).contains(&self.kill_switch.failure_rate_threshold) {
            return Err(ConfigError::Invalid(
                "kill_switch.failure_rate_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.kill_switch.minimum_sample_size == 0 {
            return Err(ConfigError::Invalid(
                "kill_switch.minimum_sample_size must be greater than zero".to_string(),
            ));
        }
        if self.kill_switch.max_consecutive_failures == 0 {
            return Err(ConfigError::Invalid(
                "kill_switch.max_consecutive_failures must be greater than zero".to_string(),
            ));
        }
        if self.store.database_path.is_empty() {
            return Err(ConfigError::Invalid("store.database_path must not be empty".to_string()));
        }
        if self.server.bind_address.is_empty() {
            return Err(ConfigError::Invalid("server.bind_address must not be empty".to_string()));
        }
        if let Some(minimum) = self.thresholds.min_test_coverage {
            if !(0.0..=100.0).contains(&minimum) {
                return Err(ConfigError::Invalid(
                    "thresholds.min_test_coverage must be between 0.0 and 100.0".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Validates a configuration path's total and per-component length before
/// it is ever passed to the filesystem.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let path_str = path.to_string_lossy();
    if path_str.len() > MAX_CONFIG_PATH_LENGTH {
        return Err(ConfigError::PathTooLong);
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::PathComponentTooLong);
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test assertions read more clearly than propagating Result")]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::ConfigError;
    use super::PipelineConfig;

    #[test]
    fn load_with_no_path_returns_defaults() {
        let config = PipelineConfig::load(None).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn load_rejects_path_too_long() {
        let long_path = "a".repeat(5_000);
        let result = PipelineConfig::load(Some(std::path::Path::new(&long_path)));
        assert!(matches!(result, Err(ConfigError::PathTooLong)));
    }

    #[test]
    fn load_rejects_oversized_file() {
        let mut file = NamedTempFile::new().unwrap();
        let payload = vec![b'a'; 1_048_577];
        file.write_all(&payload).unwrap();
        let result = PipelineConfig::load(Some(file.path()));
        assert!(matches!(result, Err(ConfigError::FileTooLarge)));
    }

    #[test]
    fn load_rejects_non_utf8_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0xFF, 0xFE, 0xFF]).unwrap();
        let result = PipelineConfig::load(Some(file.path()));
        assert!(matches!(result, Err(ConfigError::InvalidEncoding)));
    }

    #[test]
    fn load_parses_valid_toml_and_validates() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[bus]\nmax_attempts = 3\n").unwrap();
        let config = PipelineConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.bus.max_attempts, 3);
    }

    #[test]
    fn validate_rejects_zero_max_attempts() {
        let mut config = PipelineConfig::default();
        config.bus.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_failure_rate() {
        let mut config = PipelineConfig::default();
        config.kill_switch.failure_rate_threshold = 1.5;
        assert!(config.validate().is_err());
    }
}
