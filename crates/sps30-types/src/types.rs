//! Core types for SPS30 sensor data.

use core::fmt;

use bytes::Buf;
use chrono::NaiveDateTime;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ParseResult};

/// Particulate matter mass concentration channel, by particle size cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Channel {
    /// Particles up to 1.0 µm.
    Pm1,
    /// Particles up to 2.5 µm.
    Pm2_5,
    /// Particles up to 4.0 µm.
    Pm4,
    /// Particles up to 10 µm.
    Pm10,
}

impl Channel {
    /// All channels in CSV column order.
    pub const ALL: [Channel; 4] = [Channel::Pm1, Channel::Pm2_5, Channel::Pm4, Channel::Pm10];

    /// Human-readable label, as shown on the dashboard.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Channel::Pm1 => "PM1.0",
            Channel::Pm2_5 => "PM2.5",
            Channel::Pm4 => "PM4",
            Channel::Pm10 => "PM10",
        }
    }

    /// Column name in the daily CSV files.
    ///
    /// ```
    /// use sps30_types::Channel;
    ///
    /// assert_eq!(Channel::Pm2_5.column(), "pm2_5");
    /// ```
    #[must_use]
    pub fn column(&self) -> &'static str {
        match self {
            Channel::Pm1 => "pm1",
            Channel::Pm2_5 => "pm2_5",
            Channel::Pm4 => "pm4",
            Channel::Pm10 => "pm10",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Measurement output format requested when starting a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum OutputFormat {
    /// Big-endian IEEE754 floats, ten values.
    #[default]
    Float,
    /// Big-endian unsigned 16-bit integers, ten values.
    UInt16,
}

impl OutputFormat {
    /// Format selector byte sent with the Start Measurement command.
    #[must_use]
    pub fn selector(&self) -> u8 {
        match self {
            OutputFormat::Float => 0x03,
            OutputFormat::UInt16 => 0x05,
        }
    }

    /// Length of a complete Read Measured Values payload.
    #[must_use]
    pub fn payload_len(&self) -> usize {
        match self {
            OutputFormat::Float => 40,
            OutputFormat::UInt16 => 20,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            OutputFormat::Float => "float",
            OutputFormat::UInt16 => "uint16",
        }
    }
}

/// One successful measurement: mass concentrations in µg/m³ at a local time.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Reading {
    /// Local wall-clock time the measurement was taken.
    pub timestamp: NaiveDateTime,
    /// PM1.0 mass concentration.
    pub pm1: f32,
    /// PM2.5 mass concentration.
    pub pm2_5: f32,
    /// PM4 mass concentration.
    pub pm4: f32,
    /// PM10 mass concentration.
    pub pm10: f32,
}

impl Reading {
    /// Create a reading without validating the values.
    #[must_use]
    pub fn new(timestamp: NaiveDateTime, pm1: f32, pm2_5: f32, pm4: f32, pm10: f32) -> Self {
        Self {
            timestamp,
            pm1,
            pm2_5,
            pm4,
            pm10,
        }
    }

    /// Value of a single channel.
    #[must_use]
    pub fn value(&self, channel: Channel) -> f32 {
        match channel {
            Channel::Pm1 => self.pm1,
            Channel::Pm2_5 => self.pm2_5,
            Channel::Pm4 => self.pm4,
            Channel::Pm10 => self.pm10,
        }
    }

    /// Check that every concentration is finite and non-negative.
    pub fn validate(&self) -> ParseResult<()> {
        for channel in Channel::ALL {
            let value = self.value(channel);
            if !value.is_finite() || value < 0.0 {
                return Err(ParseError::InvalidValue { channel, value });
            }
        }
        Ok(())
    }

    /// Parse a Read Measured Values payload.
    ///
    /// The payload holds ten big-endian values; the first four are the mass
    /// concentrations PM1.0, PM2.5, PM4 and PM10. Number concentrations and
    /// typical particle size are ignored. Extra trailing bytes are ignored.
    ///
    /// ```
    /// use chrono::NaiveDate;
    /// use sps30_types::{OutputFormat, Reading};
    ///
    /// let ts = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(10, 0, 0).unwrap();
    /// let mut payload = Vec::new();
    /// for v in [12u16, 25, 30, 41, 0, 0, 0, 0, 0, 0] {
    ///     payload.extend_from_slice(&v.to_be_bytes());
    /// }
    /// let reading = Reading::from_payload(ts, OutputFormat::UInt16, &payload).unwrap();
    /// assert_eq!(reading.pm2_5, 25.0);
    /// ```
    pub fn from_payload(
        timestamp: NaiveDateTime,
        format: OutputFormat,
        data: &[u8],
    ) -> ParseResult<Self> {
        let expected = format.payload_len();
        if data.len() < expected {
            return Err(ParseError::InsufficientBytes {
                format: format.name(),
                expected,
                actual: data.len(),
            });
        }

        let mut buf = data;
        let mut next = || match format {
            OutputFormat::Float => buf.get_f32(),
            OutputFormat::UInt16 => f32::from(buf.get_u16()),
        };
        let reading = Reading::new(timestamp, next(), next(), next(), next());
        reading.validate()?;
        Ok(reading)
    }
}
