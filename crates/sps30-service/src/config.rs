//! Application configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use sps30_core::{PortResolver, SerialSettings};
use sps30_types::OutputFormat;

/// Shortest accepted sample period in seconds; shorter values are raised to it.
pub const MIN_SAMPLE_PERIOD_S: f64 = 0.5;
/// Longest accepted poll timeout in milliseconds.
pub const MAX_POLL_TIMEOUT_MS: u64 = 60_000;
/// Shortest accepted dashboard refresh in milliseconds.
pub const MIN_REFRESH_MS: u64 = 100;

/// Application configuration.
///
/// Built once at start-up and passed by reference; never mutated afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sensor and sampling settings.
    pub sensor: SensorConfig,
    /// Log file and history settings.
    pub storage: StorageConfig,
    /// Dashboard window settings.
    pub dashboard: DashboardConfig,
}

impl Config {
    /// Load configuration from the default path, or defaults if the file is missing.
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
    /// ```
    /// use sps30_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.sensor.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.dashboard.validate());

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

/// Sensor and sampling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Fixed port; when set, no scanning happens.
    pub uart_port: Option<String>,
    /// Candidate ports to scan. Empty means "detect".
    pub scan_range: Vec<String>,
    /// Seconds between samples.
    pub sample_period_s: f64,
    /// Upper bound for one poll, in milliseconds.
    pub poll_timeout_ms: u64,
    /// Consecutive poll failures before the port is re-resolved.
    pub failure_threshold: u32,
    /// Measurement output format requested from the sensor.
    pub output_format: OutputFormat,
    /// Start with sampling paused.
    pub start_paused: bool,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            uart_port: None,
            scan_range: Vec::new(),
            sample_period_s: 5.0,
            poll_timeout_ms: 3000,
            failure_threshold: 3,
            output_format: OutputFormat::Float,
            start_paused: false,
        }
    }
}

impl SensorConfig {
    /// Validate sensor configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Some(port) = &self.uart_port
            && port.trim().is_empty()
        {
            errors.push(ValidationError {
                field: "sensor.uart_port".to_string(),
                message: "port cannot be empty string (omit it to scan)".to_string(),
            });
        }

        for (i, port) in self.scan_range.iter().enumerate() {
            if port.trim().is_empty() {
                errors.push(ValidationError {
                    field: format!("sensor.scan_range[{}]", i),
                    message: "port name cannot be empty".to_string(),
                });
            }
        }

        if !self.sample_period_s.is_finite() || self.sample_period_s <= 0.0 {
            errors.push(ValidationError {
                field: "sensor.sample_period_s".to_string(),
                message: format!(
                    "sample period {} must be a positive number of seconds",
                    self.sample_period_s
                ),
            });
        }

        if self.poll_timeout_ms == 0 {
            errors.push(ValidationError {
                field: "sensor.poll_timeout_ms".to_string(),
                message: "poll timeout cannot be 0".to_string(),
            });
        } else if self.poll_timeout_ms > MAX_POLL_TIMEOUT_MS {
            errors.push(ValidationError {
                field: "sensor.poll_timeout_ms".to_string(),
                message: format!(
                    "poll timeout {} is too long (maximum {} ms)",
                    self.poll_timeout_ms, MAX_POLL_TIMEOUT_MS
                ),
            });
        }

        if self.failure_threshold == 0 {
            errors.push(ValidationError {
                field: "sensor.failure_threshold".to_string(),
                message: "failure threshold must be at least 1".to_string(),
            });
        }

        errors
    }

    /// Sample period, raised to [`MIN_SAMPLE_PERIOD_S`] if shorter.
    pub fn sample_period(&self) -> Duration {
        Duration::from_secs_f64(self.sample_period_s.max(MIN_SAMPLE_PERIOD_S))
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Settings for the serial reading source.
    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings {
            timeout: self.poll_timeout(),
            format: self.output_format,
        }
    }

    /// Resolver for the configured fixed port or scan range.
    pub fn resolver(&self) -> PortResolver {
        PortResolver::new(self.uart_port.clone(), self.scan_range.clone())
    }
}

/// Log file and history settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the daily CSV files.
    pub log_dir: PathBuf,
    /// Hours of readings kept in memory for the dashboard.
    pub history_retention_hours: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            history_retention_hours: 168,
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.log_dir.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.log_dir".to_string(),
                message: "log directory cannot be empty".to_string(),
            });
        }

        if self.history_retention_hours == 0 {
            errors.push(ValidationError {
                field: "storage.history_retention_hours".to_string(),
                message: "history retention must be at least 1 hour".to_string(),
            });
        }

        errors
    }

    pub fn retention(&self) -> TimeDelta {
        TimeDelta::hours(i64::from(self.history_retention_hours))
    }
}

/// Dashboard window settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Re-query cadence while the window is visible, in milliseconds.
    pub refresh_ms: u64,
    /// Show the dashboard at start-up instead of starting in the tray.
    pub start_visible: bool,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            refresh_ms: 1000,
            start_visible: true,
        }
    }
}

impl DashboardConfig {
    /// Validate dashboard configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.refresh_ms < MIN_REFRESH_MS {
            errors.push(ValidationError {
                field: "dashboard.refresh_ms".to_string(),
                message: format!(
                    "refresh interval {} is too short (minimum {} ms)",
                    self.refresh_ms, MIN_REFRESH_MS
                ),
            });
        }

        errors
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_ms)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
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
    /// The field path (e.g., `sensor.sample_period_s` or `sensor.scan_range[2]`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
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
///
/// - Linux: `~/.config/sps30-tray/config.toml`
/// - macOS: `~/Library/Application Support/sps30-tray/config.toml`
/// - Windows: `C:\Users\<user>\AppData\Roaming\sps30-tray\config.toml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sps30-tray")
        .join("config.toml")
}
