//! Daily CSV log files.
//!
//! One file per local calendar day, named `sps30_<YYYY-MM-DD>.csv`, holding
//! a `timestamp,pm1,pm2_5,pm4,pm10` header followed by one row per reading.
//! The day is taken from the reading's own timestamp, so a reading taken
//! just before midnight lands in that day's file even if it is written a
//! moment later.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, info, warn};

use sps30_types::Reading;

use crate::error::{Error, Result};

/// Column names of every log file, in order.
pub const HEADER: [&str; 5] = ["timestamp", "pm1", "pm2_5", "pm4", "pm10"];

/// Timestamp format of the first column (local time, sortable).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const FILE_PREFIX: &str = "sps30_";
const FILE_SUFFIX: &str = ".csv";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Appends readings to per-day CSV files in a directory.
#[derive(Debug, Clone)]
pub struct CsvLogger {
    dir: PathBuf,
}

impl CsvLogger {
    /// Use `dir` for log files, creating it if needed.
    ///
    /// Fails if `dir` cannot be created or exists but is not a directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let existed = dir.is_dir();
        // No-op for an existing directory; fails when the path is a file.
        fs::create_dir_all(&dir).map_err(|e| Error::CreateDirectory {
            path: dir.clone(),
            source: e,
        })?;
        if !dir.is_dir() {
            return Err(Error::CreateDirectory {
                path: dir.clone(),
                source: io::Error::new(io::ErrorKind::AlreadyExists, "not a directory"),
            });
        }
        if !existed {
            info!("Created log directory {}", dir.display());
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the log file for `date`.
    ///
    /// ```
    /// use chrono::NaiveDate;
    /// use sps30_store::CsvLogger;
    ///
    /// let logger = CsvLogger::new(std::env::temp_dir()).unwrap();
    /// let path = logger.path_for(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    /// assert!(path.ends_with("sps30_2024-01-01.csv"));
    /// ```
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!(
            "{FILE_PREFIX}{}{FILE_SUFFIX}",
            date.format(DATE_FORMAT)
        ))
    }

    /// Append one row for `reading`, writing the header first if the file
    /// is new or empty.
    ///
    /// The file is opened in append mode, written with a single `write_all`,
    /// and closed again before returning.
    pub fn append(&self, reading: &Reading) -> Result<()> {
        let path = self.path_for(reading.timestamp.date());
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;

        let needs_header = file.metadata()?.len() == 0;
        let buf = encode(reading, needs_header)?;
        file.write_all(&buf)?;

        debug!("Appended reading to {}", path.display());
        Ok(())
    }

    /// Readings stored for `date`, in file order. A missing file yields none.
    ///
    /// Malformed rows are skipped with a warning.
    pub fn read_day(&self, date: NaiveDate) -> Result<Vec<Reading>> {
        let path = self.path_for(date);
        if !path.exists() {
            return Ok(Vec::new());
        }
        read_file(&path)
    }

    /// All readings taken at or after `since`, oldest first.
    ///
    /// Reads every day file dated on or after `since`'s date.
    pub fn load_since(&self, since: NaiveDateTime) -> Result<Vec<Reading>> {
        let mut dates = self.list_days()?;
        dates.retain(|d| *d >= since.date());
        dates.sort_unstable();

        let mut readings = Vec::new();
        for date in dates {
            let path = self.path_for(date);
            match read_file(&path) {
                Ok(day) => readings.extend(day.into_iter().filter(|r| r.timestamp >= since)),
                Err(e) => warn!("Skipping unreadable log {}: {}", path.display(), e),
            }
        }
        readings.sort_by_key(|r| r.timestamp);
        Ok(readings)
    }

    /// Dates that have a log file in the directory.
    pub fn list_days(&self) -> Result<Vec<NaiveDate>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut dates = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            if let Some(date) = name.to_str().and_then(parse_file_date) {
                dates.push(date);
            }
        }
        Ok(dates)
    }
}

fn parse_file_date(name: &str) -> Option<NaiveDate> {
    let date = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    NaiveDate::parse_from_str(date, DATE_FORMAT).ok()
}

fn encode(reading: &Reading, with_header: bool) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    if with_header {
        writer.write_record(HEADER)?;
    }
    writer.write_record([
        reading.timestamp.format(TIMESTAMP_FORMAT).to_string(),
        format!("{:.3}", reading.pm1),
        format!("{:.3}", reading.pm2_5),
        format!("{:.3}", reading.pm4),
        format!("{:.3}", reading.pm10),
    ])?;

    writer.into_inner().map_err(|e| Error::Io(e.into_error()))
}

fn read_file(path: &Path) -> Result<Vec<Reading>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let mut readings = Vec::new();
    for (index, record) in reader.records().enumerate() {
        // Line 1 is the header.
        let line = index + 2;
        match record.map_err(Error::from).and_then(|r| parse_row(&r)) {
            Ok(reading) => readings.push(reading),
            Err(e) => warn!("{}:{}: skipping row: {}", path.display(), line, e),
        }
    }
    Ok(readings)
}

fn parse_row(record: &csv::StringRecord) -> Result<Reading> {
    if record.len() < HEADER.len() {
        return Err(Error::InvalidRow(format!(
            "expected {} fields, got {}",
            HEADER.len(),
            record.len()
        )));
    }

    let ts = &record[0];
    let timestamp = NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT)
        .map_err(|_| Error::InvalidTimestamp(ts.to_string()))?;

    let value = |i: usize| -> Result<f32> {
        record[i]
            .trim()
            .parse::<f32>()
            .map_err(|_| Error::InvalidRow(format!("{} is not a number: {:?}", HEADER[i], &record[i])))
    };

    Ok(Reading::new(timestamp, value(1)?, value(2)?, value(3)?, value(4)?))
}
