//! Error types for sps30-core.
//!
//! Errors are split by how the sampler reacts to them:
//!
//! | Error | Raised by | Sampler reaction |
//! |-------|-----------|------------------|
//! | [`Error::PortUnavailable`] | `open` | try the next candidate |
//! | [`Error::Device`] | `poll` | count it; reacquire after repeated failures |
//! | [`Error::NoPortFound`] | resolver | report, stay reacquiring, retry next tick |
//!
//! None of these are fatal; the sampler keeps trying to recover connectivity
//! for as long as the process runs.

use std::time::Duration;

use thiserror::Error;

use sps30_types::ParseError;

use crate::shdlc::FrameError;

/// Errors that can occur when talking to an SPS30.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The port could not be opened or does not answer as an SPS30.
    #[error("Port {port} unavailable: {reason}")]
    PortUnavailable {
        /// The port identifier, e.g. `COM5`.
        port: String,
        /// Why opening failed.
        reason: String,
    },

    /// Every candidate port was tried without success.
    #[error("No SPS30 found (tried: {})", format_tried(.tried))]
    NoPortFound {
        /// The ports that were tried, in order.
        tried: Vec<String>,
    },

    /// A single poll failed.
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
}

/// Failure of one exchange with an opened device.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DeviceError {
    /// Serial I/O error.
    #[error("Serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The device did not answer within the poll deadline.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: &'static str,
        /// The timeout duration.
        duration: Duration,
    },

    /// The response frame was malformed.
    #[error("Invalid frame: {0}")]
    Frame(#[from] FrameError),

    /// The device answered with a non-zero state byte.
    #[error("Device rejected command 0x{command:02X} (state 0x{state:02X})")]
    State {
        /// The command that was rejected.
        command: u8,
        /// The state byte from the response.
        state: u8,
    },

    /// The measurement payload could not be parsed.
    #[error("Invalid measurement: {0}")]
    InvalidData(#[from] ParseError),

    /// The blocking serial task panicked or was cancelled.
    #[error("Serial worker failed: {0}")]
    Worker(String),
}

fn format_tried(tried: &[String]) -> String {
    if tried.is_empty() {
        "no candidate ports".to_string()
    } else {
        tried.join(", ")
    }
}

/// Result type alias using sps30-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_port_found_display() {
        let err = Error::NoPortFound {
            tried: vec!["COM3".to_string(), "COM4".to_string()],
        };
        assert_eq!(err.to_string(), "No SPS30 found (tried: COM3, COM4)");

        let err = Error::NoPortFound { tried: vec![] };
        assert_eq!(err.to_string(), "No SPS30 found (tried: no candidate ports)");
    }

    #[test]
    fn test_device_error_display() {
        let err = Error::from(DeviceError::State {
            command: 0x03,
            state: 0x43,
        });
        assert_eq!(
            err.to_string(),
            "Device error: Device rejected command 0x03 (state 0x43)"
        );

        let err = DeviceError::Timeout {
            operation: "read_measured_values",
            duration: Duration::from_secs(3),
        };
        assert!(err.to_string().contains("timed out after 3s"));
    }
}
