#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

//! System tray logger for the Sensirion SPS30 particulate matter sensor.
//!
//! Samples the sensor over its UART interface, appends every reading to a
//! daily CSV file and shows recent history in a small dashboard window.
//!
//! Release builds on Windows have no console, so diagnostics are also
//! appended to `connection.log` in the log directory.

mod app;
mod dashboard;
mod icon;
mod tray;
mod worker;

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use eframe::egui;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use sps30_core::SerialSource;
use sps30_service::{Config, default_config_path};
use sps30_store::{CsvLogger, HistoryStore};

use crate::app::DashboardApp;
use crate::tray::{Alert, TrayManager, TrayState};
use crate::worker::{SamplerWorker, WorkerSetup};

/// SPS30 Logger - samples an SPS30 into daily CSV files from the system tray
#[derive(Parser, Debug, Default)]
#[command(name = "sps30-tray", version, about)]
struct Args {
    /// Configuration file (defaults to the per-user config directory)
    #[arg(short, long, value_name = "PATH", env = "SPS30_CONFIG")]
    config: Option<PathBuf>,

    /// Use this serial port instead of scanning
    #[arg(short, long, value_name = "PORT", env = "SPS30_PORT")]
    port: Option<String>,

    /// Seconds between samples
    #[arg(long, value_name = "SECONDS")]
    sample_period: Option<f64>,

    /// Directory for the daily CSV files
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Start with sampling paused
    #[arg(long)]
    paused: bool,

    /// Start in the tray without showing the dashboard
    #[arg(long)]
    hidden: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Apply command-line overrides on top of the loaded configuration.
    fn apply(&self, config: &mut Config) {
        if let Some(port) = &self.port {
            config.sensor.uart_port = Some(port.clone());
        }
        if let Some(period) = self.sample_period {
            config.sensor.sample_period_s = period;
        }
        if let Some(dir) = &self.log_dir {
            config.storage.log_dir = dir.clone();
        }
        if self.paused {
            config.sensor.start_paused = true;
        }
        if self.hidden {
            config.dashboard.start_visible = false;
        }
    }
}

/// Diagnostics file kept next to the CSV logs.
const CONNECTION_LOG: &str = "connection.log";

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    args.apply(&mut config);
    config.validate()?;
    Ok(config)
}

/// Fill the history store from the log files so the dashboard survives restarts.
fn seed_history(logger: &CsvLogger, history: &HistoryStore) {
    let since = Local::now().naive_local() - history.retention();
    match logger.load_since(since) {
        Ok(readings) => {
            info!("Loaded {} readings from {:?}", readings.len(), logger.dir());
            history.seed(readings);
        }
        Err(e) => warn!("Failed to load previous readings: {}", e),
    }
}

/// Open `connection.log` in `dir` for appending.
fn open_connection_log(dir: &Path) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(CONNECTION_LOG))
}

/// Log to stderr and, when given, to the connection log file.
fn init_tracing(verbose: bool, connection_log: Option<File>) {
    let filter = if verbose {
        EnvFilter::new("sps30=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sps30=info"))
    };
    let file_layer = connection_log.map(|file| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
}

/// Desktop notification for an error that ends the program.
fn startup_alert(err: &anyhow::Error) -> Alert {
    Alert {
        title: "SPS30 Logger failed to start",
        body: format!("{err:#}"),
    }
}

fn main() -> Result<()> {
    human_panic::setup_panic!();

    let args = Args::parse();

    let startup = load_config(&args)
        .context("Invalid configuration")
        .and_then(|config| {
            let logger =
                CsvLogger::new(&config.storage.log_dir).context("Cannot use log directory")?;
            Ok((config, logger))
        });
    let (connection_log, log_error) = match &startup {
        Ok((_, logger)) => match open_connection_log(logger.dir()) {
            Ok(file) => (Some(file), None),
            Err(e) => (None, Some(e)),
        },
        Err(_) => (None, None),
    };
    init_tracing(args.verbose, connection_log);
    if let Some(e) = log_error {
        warn!("Cannot open {}: {}", CONNECTION_LOG, e);
    }

    let result = startup.and_then(|(config, logger)| run(&args, config, logger));
    if let Err(e) = &result {
        error!("{:#}", e);
        tray::send_notification(&startup_alert(e));
    }
    result
}

fn run(args: &Args, config: Config, logger: CsvLogger) -> Result<()> {
    if args.config.is_none() {
        info!("Using config at {:?}", default_config_path());
    }
    info!("Logging readings to {:?}", logger.dir());

    let history = Arc::new(HistoryStore::with_retention(config.storage.retention()));
    seed_history(&logger, &history);

    let worker = SamplerWorker::spawn(
        SerialSource::new(config.sensor.serial_settings()),
        WorkerSetup {
            resolver: config.sensor.resolver(),
            logger,
            history: Arc::clone(&history),
            sample_period: config.sensor.sample_period(),
            failure_threshold: config.sensor.failure_threshold,
            start_paused: config.sensor.start_paused,
        },
    )?;

    let tray_state = Arc::new(Mutex::new(TrayState {
        paused: config.sensor.start_paused,
        ..Default::default()
    }));

    // Must be created on the main thread before the event loop.
    let tray_manager = match TrayManager::new(Arc::clone(&tray_state)) {
        Ok(manager) => Some(manager),
        Err(e) => {
            warn!("Failed to create system tray: {}. Continuing without tray.", e);
            None
        }
    };

    let viewport = egui::ViewportBuilder::default()
        .with_title("SPS30 Logger")
        .with_inner_size([760.0, 560.0])
        .with_min_inner_size([480.0, 360.0])
        .with_icon(icon::window_icon());

    let native_options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };

    let refresh_interval = config.dashboard.refresh_interval();
    let start_paused = config.sensor.start_paused;
    let start_visible = config.dashboard.start_visible;

    eframe::run_native(
        "SPS30 Logger",
        native_options,
        Box::new(move |cc| {
            Ok(Box::new(DashboardApp::new(
                cc,
                worker,
                history,
                refresh_interval,
                start_paused,
                start_visible,
                tray_state,
                tray_manager,
            )))
        }),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run eframe: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_args_override_config() {
        let args = Args::parse_from([
            "sps30-tray",
            "--port",
            "COM7",
            "--sample-period",
            "10",
            "--log-dir",
            "/tmp/pm",
            "--paused",
            "--hidden",
        ]);
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.sensor.uart_port.as_deref(), Some("COM7"));
        assert_eq!(config.sensor.sample_period_s, 10.0);
        assert_eq!(config.storage.log_dir, PathBuf::from("/tmp/pm"));
        assert!(config.sensor.start_paused);
        assert!(!config.dashboard.start_visible);
    }

    #[test]
    fn test_no_args_keeps_config() {
        let mut config = Config::default();
        Args::default().apply(&mut config);

        assert!(config.sensor.uart_port.is_none());
        assert_eq!(config.sensor.sample_period_s, 5.0);
        assert!(config.dashboard.start_visible);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[sensor]\nsample_period_s = 2.0\n").unwrap();

        let args = Args {
            config: Some(path.clone()),
            sample_period: Some(-1.0),
            ..Default::default()
        };
        assert!(load_config(&args).is_err());

        let args = Args {
            config: Some(path),
            ..Default::default()
        };
        assert_eq!(load_config(&args).unwrap().sensor.sample_period_s, 2.0);
    }

    #[test]
    fn test_missing_explicit_config_is_error() {
        let args = Args {
            config: Some(PathBuf::from("/nonexistent/sps30/config.toml")),
            ..Default::default()
        };
        assert!(load_config(&args).is_err());
    }

    #[test]
    fn test_connection_log_appends_in_log_dir() {
        let dir = TempDir::new().unwrap();
        let logger = CsvLogger::new(dir.path().join("logs")).unwrap();

        let mut file = open_connection_log(logger.dir()).unwrap();
        io::Write::write_all(&mut file, b"first\n").unwrap();
        drop(file);
        let mut file = open_connection_log(logger.dir()).unwrap();
        io::Write::write_all(&mut file, b"second\n").unwrap();

        let content = fs::read_to_string(logger.dir().join(CONNECTION_LOG)).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }

    #[test]
    fn test_startup_alert_carries_context() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("logs");
        fs::write(&blocker, b"x").unwrap();

        let err = CsvLogger::new(&blocker)
            .context("Cannot use log directory")
            .unwrap_err();
        let alert = startup_alert(&err);
        assert_eq!(alert.title, "SPS30 Logger failed to start");
        assert!(alert.body.starts_with("Cannot use log directory: "));
    }

    #[test]
    fn test_seed_history_from_logs() {
        let dir = TempDir::new().unwrap();
        let logger = CsvLogger::new(dir.path()).unwrap();
        let now = Local::now().naive_local();
        logger
            .append(&sps30_types::Reading::new(now, 1.0, 2.0, 3.0, 4.0))
            .unwrap();

        let history = HistoryStore::new();
        seed_history(&logger, &history);
        assert_eq!(history.len(), 1);
        assert_eq!(history.latest().map(|r| r.pm2_5), Some(2.0));
    }
}
