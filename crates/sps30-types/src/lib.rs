//! Platform-agnostic types for the Sensirion SPS30 particulate matter sensor.
//!
//! This crate provides the data model shared by the serial driver
//! (sps30-core), the CSV store (sps30-store) and the tray application.
//!
//! # Features
//!
//! - [`Reading`]: one timestamped set of PM1.0/PM2.5/PM4/PM10 concentrations
//! - [`TimeWindow`]: trailing windows used to filter history for display
//! - [`Summary`]: current/average/max statistics per [`Channel`]
//! - Payload parsing for the SPS30 Read Measured Values response
//!
//! # Example
//!
//! ```
//! use chrono::NaiveDate;
//! use sps30_types::{Channel, Reading, Summary};
//!
//! let ts = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(10, 0, 0).unwrap();
//! let readings = [Reading::new(ts, 3.2, 5.1, 6.0, 9.4)];
//! let summary = Summary::from_readings(&readings).unwrap();
//! assert_eq!(summary.channel(Channel::Pm10).max, Some(9.4));
//! ```

pub mod error;
pub mod summary;
pub mod types;
pub mod window;

pub use error::{ParseError, ParseResult};
pub use summary::{ChannelSummary, Summary};
pub use types::{Channel, OutputFormat, Reading};
pub use window::TimeWindow;
