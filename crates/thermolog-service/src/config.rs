//! Service configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thermolog_types::{DEFAULT_EPOCH_FLOOR, Timestamp};

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Log storage settings.
    pub storage: StorageConfig,
    /// Sampling and compaction cadence.
    pub sampling: SamplingConfig,
    /// How long readings are kept.
    pub retention: RetentionConfig,
    /// Wall-clock sanity settings.
    pub clock: ClockConfig,
    /// Where readings come from.
    pub sensor: SensorConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return every problem found.
    ///
    /// # Example
    ///
    /// ```
    /// use thermolog_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.sampling.validate());
        errors.extend(self.retention.validate());
        errors.extend(self.sensor.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError::new(
                "server.bind",
                "bind address cannot be empty",
            ));
        } else {
            let parts: Vec<&str> = self.bind.rsplitn(2, ':').collect();
            if parts.len() != 2 {
                errors.push(ValidationError::new(
                    "server.bind",
                    format!(
                        "invalid bind address '{}': expected format 'host:port'",
                        self.bind
                    ),
                ));
            } else {
                match parts[0].parse::<u16>() {
                    Ok(0) => errors.push(ValidationError::new("server.bind", "port cannot be 0")),
                    Err(_) => errors.push(ValidationError::new(
                        "server.bind",
                        format!("invalid port '{}': must be a number 1-65535", parts[0]),
                    )),
                    Ok(_) if self.bind.parse::<SocketAddr>().is_err() => {
                        errors.push(ValidationError::new(
                            "server.bind",
                            format!(
                                "invalid host '{}': must be an IP address, not a hostname",
                                parts[1]
                            ),
                        ))
                    }
                    Ok(_) => {}
                }
            }
        }

        errors
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Reading log file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: thermolog_store::default_log_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.path",
                "log path cannot be empty",
            ));
        }

        errors
    }
}

/// Minimum sampling interval in seconds.
pub const MIN_SAMPLE_INTERVAL: u64 = 5;
/// Maximum sampling interval in seconds (1 hour).
pub const MAX_SAMPLE_INTERVAL: u64 = 3600;
/// Maximum compaction interval in seconds (7 days).
pub const MAX_COMPACT_INTERVAL: u64 = 7 * 24 * 3600;

/// Sampling and compaction cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Seconds between sensor samples.
    pub interval_secs: u64,
    /// Seconds between retention compactions.
    pub compact_interval_secs: u64,
    /// Scheduler resolution in milliseconds.
    pub tick_millis: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            compact_interval_secs: 6 * 3600,
            tick_millis: 1000,
        }
    }
}

impl SamplingConfig {
    /// Sampling interval.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Compaction interval.
    pub fn compact_interval(&self) -> Duration {
        Duration::from_secs(self.compact_interval_secs)
    }

    /// Scheduler tick.
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }

    /// Validate sampling configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.interval_secs < MIN_SAMPLE_INTERVAL {
            errors.push(ValidationError::new(
                "sampling.interval_secs",
                format!(
                    "sample interval {} is too short (minimum {} seconds)",
                    self.interval_secs, MIN_SAMPLE_INTERVAL
                ),
            ));
        } else if self.interval_secs > MAX_SAMPLE_INTERVAL {
            errors.push(ValidationError::new(
                "sampling.interval_secs",
                format!(
                    "sample interval {} is too long (maximum {} seconds / 1 hour)",
                    self.interval_secs, MAX_SAMPLE_INTERVAL
                ),
            ));
        }

        if self.compact_interval_secs < self.interval_secs {
            errors.push(ValidationError::new(
                "sampling.compact_interval_secs",
                "compaction must not run more often than sampling",
            ));
        } else if self.compact_interval_secs > MAX_COMPACT_INTERVAL {
            errors.push(ValidationError::new(
                "sampling.compact_interval_secs",
                format!(
                    "compaction interval {} is too long (maximum {} seconds / 7 days)",
                    self.compact_interval_secs, MAX_COMPACT_INTERVAL
                ),
            ));
        }

        if self.tick_millis == 0 || self.tick_millis > self.interval_secs.saturating_mul(1000) {
            errors.push(ValidationError::new(
                "sampling.tick_millis",
                "tick must be between 1 ms and the sample interval",
            ));
        }

        errors
    }
}

/// Maximum retention in days.
pub const MAX_RETENTION_DAYS: u64 = 366;

/// Retention window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Days of readings to keep.
    pub days: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: thermolog_store::DEFAULT_RETENTION.as_secs() / 86_400,
        }
    }
}

impl RetentionConfig {
    /// Retention window as a duration.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.days * 86_400)
    }

    /// Validate retention configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.days == 0 || self.days > MAX_RETENTION_DAYS {
            errors.push(ValidationError::new(
                "retention.days",
                format!(
                    "retention of {} days is out of range (1-{})",
                    self.days, MAX_RETENTION_DAYS
                ),
            ));
        }

        errors
    }
}

/// Wall-clock sanity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Times at or below this epoch value count as "not synchronized".
    pub epoch_floor: Timestamp,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            epoch_floor: DEFAULT_EPOCH_FLOOR,
        }
    }
}

/// Kind of sensor provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    /// Linux hwmon sysfs files (AHT10/AHT20/AHT30 driver layout).
    #[default]
    Hwmon,
    /// Simulated sensor with fixed values and jitter.
    Mock,
}

/// Sensor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Which provider to use.
    pub kind: SensorKind,
    /// hwmon device directory containing `temp1_input` and `humidity1_input`.
    pub hwmon_path: PathBuf,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            kind: SensorKind::Hwmon,
            hwmon_path: PathBuf::from("/sys/class/hwmon/hwmon0"),
        }
    }
}

impl SensorConfig {
    /// Validate sensor configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.kind == SensorKind::Hwmon && self.hwmon_path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "sensor.hwmon_path",
                "hwmon path cannot be empty",
            ));
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind` or `sampling.interval_secs`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("thermolog")
        .join("server.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.sampling.interval_secs, 60);
        assert_eq!(config.sampling.compact_interval_secs, 21_600);
        assert_eq!(config.retention.days, 7);
        assert_eq!(config.clock.epoch_floor, 1_700_000_000);
        assert_eq!(config.sensor.kind, SensorKind::Hwmon);
    }

    #[test]
    fn test_storage_config_default() {
        let config = StorageConfig::default();
        assert_eq!(config.path, thermolog_store::default_log_path());
    }

    #[test]
    fn test_retention_window() {
        let config = RetentionConfig { days: 7 };
        assert_eq!(config.window(), Duration::from_secs(604_800));
    }

    #[test]
    fn test_config_full_toml() {
        let toml = r#"
            [server]
            bind = "192.168.1.1:8888"

            [storage]
            path = "/data/aht30.csv"

            [sampling]
            interval_secs = 30
            compact_interval_secs = 3600

            [retention]
            days = 3

            [sensor]
            kind = "mock"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind, "192.168.1.1:8888");
        assert_eq!(config.storage.path, PathBuf::from("/data/aht30.csv"));
        assert_eq!(config.sampling.interval_secs, 30);
        assert_eq!(config.sampling.tick_millis, 1000);
        assert_eq!(config.retention.days, 3);
        assert_eq!(config.sensor.kind, SensorKind::Mock);
        assert_eq!(config.clock.epoch_floor, DEFAULT_EPOCH_FLOOR);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("server.toml");

        let mut config = Config::default();
        config.server.bind = "127.0.0.1:9090".to_string();
        config.storage.path = PathBuf::from("/tmp/readings.csv");
        config.retention.days = 14;

        config.save(&config_path).unwrap();
        let loaded = Config::load_validated(&config_path).unwrap();

        assert_eq!(loaded.server.bind, "127.0.0.1:9090");
        assert_eq!(loaded.storage.path, PathBuf::from("/tmp/readings.csv"));
        assert_eq!(loaded.retention.days, 14);
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        std::fs::write(&config_path, "this is not valid { toml").unwrap();

        let result = Config::load(&config_path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_unknown_sensor_kind_rejected() {
        let result: Result<Config, _> = toml::from_str("[sensor]\nkind = \"bluetooth\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("thermolog/server.toml"));
    }

    // ==========================================================================
    // Validation tests
    // ==========================================================================

    #[test]
    fn test_default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_server_bind_validation() {
        let mut server = ServerConfig::default();
        assert!(server.validate().is_empty());

        server.bind = "[::1]:8080".to_string();
        assert!(server.validate().is_empty());

        server.bind = String::new();
        let errors = server.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("cannot be empty"));

        server.bind = "127.0.0.1".to_string();
        assert!(server.validate()[0].message.contains("host:port"));

        server.bind = "127.0.0.1:0".to_string();
        assert!(server.validate()[0].message.contains("cannot be 0"));

        server.bind = "127.0.0.1:http".to_string();
        assert!(server.validate()[0].message.contains("invalid port"));

        // Startup binds a parsed socket address, so hostnames must fail here
        server.bind = "localhost:8080".to_string();
        let errors = server.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("IP address"));

        server.bind = "::1:8080".to_string();
        assert!(!server.validate().is_empty());
    }

    #[test]
    fn test_sampling_validation() {
        let mut sampling = SamplingConfig::default();
        assert!(sampling.validate().is_empty());

        sampling.interval_secs = 1;
        assert_eq!(sampling.validate()[0].field, "sampling.interval_secs");

        sampling.interval_secs = 7200;
        sampling.compact_interval_secs = 7200;
        assert!(sampling.validate()[0].message.contains("too long"));

        let sampling = SamplingConfig {
            interval_secs: 60,
            compact_interval_secs: 30,
            tick_millis: 1000,
        };
        assert_eq!(sampling.validate()[0].field, "sampling.compact_interval_secs");

        let sampling = SamplingConfig {
            tick_millis: 0,
            ..Default::default()
        };
        assert_eq!(sampling.validate()[0].field, "sampling.tick_millis");
    }

    #[test]
    fn test_retention_validation() {
        assert!(RetentionConfig { days: 1 }.validate().is_empty());
        assert_eq!(RetentionConfig { days: 0 }.validate().len(), 1);
        assert_eq!(RetentionConfig { days: 1000 }.validate().len(), 1);
    }

    #[test]
    fn test_storage_path_validation() {
        let storage = StorageConfig {
            path: PathBuf::new(),
        };
        assert!(storage.validate()[0].message.contains("cannot be empty"));
    }

    #[test]
    fn test_sensor_validation() {
        let hwmon = SensorConfig {
            kind: SensorKind::Hwmon,
            hwmon_path: PathBuf::new(),
        };
        assert_eq!(hwmon.validate().len(), 1);

        let mock = SensorConfig {
            kind: SensorKind::Mock,
            hwmon_path: PathBuf::new(),
        };
        assert!(mock.validate().is_empty());
    }

    #[test]
    fn test_config_validation_collects_all_errors() {
        let mut config = Config::default();
        config.server.bind = String::new();
        config.retention.days = 0;

        let err = config.validate().unwrap_err();
        let display = err.to_string();
        assert!(display.contains("server.bind"));
        assert!(display.contains("retention.days"));
    }
}
