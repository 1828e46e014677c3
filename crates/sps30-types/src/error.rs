//! Error types for data parsing in sps30-types.

use thiserror::Error;

use crate::types::Channel;

/// Errors that can occur when parsing SPS30 measurement data.
///
/// This error type is transport-agnostic and does not include
/// serial or framing errors (those belong in sps30-core).
#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum ParseError {
    /// The payload is shorter than the output format requires.
    #[error("Invalid data: {format} payload requires {expected} bytes, got {actual}")]
    InsufficientBytes {
        /// Output format the payload was decoded as.
        format: &'static str,
        /// Number of bytes the format requires.
        expected: usize,
        /// Number of bytes received.
        actual: usize,
    },

    /// A concentration is NaN, infinite or negative.
    #[error("Invalid value for {channel}: {value}")]
    InvalidValue {
        /// The channel carrying the bad value.
        channel: Channel,
        /// The offending value.
        value: f32,
    },

    /// Free-form parse failure.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias using sps30-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
