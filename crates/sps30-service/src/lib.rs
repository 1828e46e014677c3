//! Sampling service for the SPS30 tray logger.
//!
//! This crate ties the serial driver and the stores together:
//!
//! - [`Config`]: TOML configuration with per-field validation
//! - [`Sampler`]: the Running / Paused / Reacquiring state machine, one [`Sampler::tick`] at a time
//! - [`Collector`]: drives the sampler from a tokio interval and handles [`Command`]s
//! - [`SamplerStatus`]: the front-end's view, folded from [`SamplerEvent`]s
//!
//! # Configuration
//!
//! The configuration is read from `<config dir>/sps30-tray/config.toml`:
//!
//! ```toml
//! [sensor]
//! # uart_port = "COM5"          # fixed port, disables scanning
//! scan_range = []               # empty = detect serial ports
//! sample_period_s = 5.0
//! poll_timeout_ms = 3000
//! failure_threshold = 3
//! output_format = "float"       # or "uint16"
//! start_paused = false
//!
//! [storage]
//! log_dir = "logs"
//! history_retention_hours = 168
//!
//! [dashboard]
//! refresh_ms = 1000
//! start_visible = true
//! ```

pub mod collector;
pub mod config;
pub mod messages;
pub mod sampler;
pub mod status;

pub use collector::Collector;
pub use config::{
    Config, ConfigError, DashboardConfig, SensorConfig, StorageConfig, ValidationError,
    default_config_path,
};
pub use messages::{Command, SamplerEvent, SamplerState};
pub use sampler::Sampler;
pub use status::{CONNECTED_WITHIN_SECS, SamplerStatus};
