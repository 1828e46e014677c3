//! Persistence for SPS30 readings.
//!
//! Two stores with different lifetimes:
//!
//! - [`CsvLogger`]: one append-only CSV file per day, the durable record
//! - [`HistoryStore`]: a bounded, lock-protected in-memory window for the dashboard
//!
//! # Example
//!
//! ```no_run
//! use chrono::Local;
//! use sps30_store::{CsvLogger, HistoryStore};
//! use sps30_types::TimeWindow;
//!
//! let logger = CsvLogger::new("logs")?;
//! let history = HistoryStore::new();
//!
//! // Restore the last week from disk
//! let since = Local::now().naive_local() - history.retention();
//! history.seed(logger.load_since(since)?);
//!
//! println!("{} readings in the last hour", history.query(TimeWindow::LastHour).len());
//! # Ok::<(), sps30_store::Error>(())
//! ```

mod error;
mod history;
mod logger;

pub use error::{Error, Result};
pub use history::{DEFAULT_RETENTION_HOURS, HistoryStore};
pub use logger::{CsvLogger, HEADER, TIMESTAMP_FORMAT};
