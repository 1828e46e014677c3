//! SHDLC framing used by the SPS30 UART interface.
//!
//! A request (MOSI) frame is `7E ADR CMD L DATA.. CHK 7E`; a response (MISO)
//! frame carries an extra state byte after the command:
//! `7E ADR CMD STATE L DATA.. CHK 7E`.
//!
//! The checksum is the inverted low byte of the sum of every byte between the
//! delimiters. The reserved bytes `7E`, `7D`, `11` and `13` are escaped as
//! `7D` followed by the byte XOR `20`; escaping applies to everything between
//! the delimiters, checksum included.

use thiserror::Error;

/// Frame start and stop delimiter.
pub const DELIMITER: u8 = 0x7E;
const ESCAPE: u8 = 0x7D;
const ESCAPE_XOR: u8 = 0x20;
const RESERVED: [u8; 4] = [0x7E, 0x7D, 0x11, 0x13];

/// The SPS30 always answers on address 0.
pub const DEVICE_ADDRESS: u8 = 0x00;

/// Start Measurement. Data: `[0x01, format selector]`.
pub const CMD_START_MEASUREMENT: u8 = 0x00;
/// Stop Measurement. No data.
pub const CMD_STOP_MEASUREMENT: u8 = 0x01;
/// Read Measured Values. No data; the response is empty until a value is ready.
pub const CMD_READ_MEASURED_VALUES: u8 = 0x03;
/// Device Information. Data: one selector byte.
pub const CMD_DEVICE_INFORMATION: u8 = 0xD0;
/// Device Information selector for the serial number.
pub const INFO_SERIAL_NUMBER: u8 = 0x03;

/// State returned by Start Measurement when the sensor is already measuring.
pub const STATE_WRONG_MODE: u8 = 0x43;

/// Errors decoding a response frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum FrameError {
    #[error("frame is not enclosed in 0x7E delimiters")]
    MissingDelimiters,
    #[error("frame too short ({0} bytes after unstuffing)")]
    TooShort(usize),
    #[error("escape byte followed by 0x{0:02X}")]
    InvalidEscape(u8),
    #[error("frame ends inside an escape sequence")]
    DanglingEscape,
    #[error("length byte says {declared} data bytes, frame has {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    Checksum { expected: u8, actual: u8 },
    #[error("response to command 0x{actual:02X}, expected 0x{expected:02X}")]
    UnexpectedCommand { expected: u8, actual: u8 },
}

/// A decoded MISO frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub address: u8,
    pub command: u8,
    pub state: u8,
    pub data: Vec<u8>,
}

/// Decode a null-terminated ASCII string from a Device Information response.
#[must_use]
pub fn parse_ascii(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).trim().to_string()
}

/// Inverted low byte of the sum of `bytes`.
#[must_use]
pub fn checksum(bytes: &[u8]) -> u8 {
    !bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

fn stuff_into(out: &mut Vec<u8>, byte: u8) {
    if RESERVED.contains(&byte) {
        out.push(ESCAPE);
        out.push(byte ^ ESCAPE_XOR);
    } else {
        out.push(byte);
    }
}

/// Reverse byte stuffing on the content between delimiters.
pub fn unstuff(stuffed: &[u8]) -> Result<Vec<u8>, FrameError> {
    let mut out = Vec::with_capacity(stuffed.len());
    let mut bytes = stuffed.iter();
    while let Some(&byte) = bytes.next() {
        if byte != ESCAPE {
            out.push(byte);
            continue;
        }
        let &next = bytes.next().ok_or(FrameError::DanglingEscape)?;
        let original = next ^ ESCAPE_XOR;
        if !RESERVED.contains(&original) {
            return Err(FrameError::InvalidEscape(next));
        }
        out.push(original);
    }
    Ok(out)
}

/// Build a complete request frame, delimiters included.
///
/// ```
/// use sps30_core::shdlc::{encode_request, CMD_READ_MEASURED_VALUES, DEVICE_ADDRESS};
///
/// let frame = encode_request(DEVICE_ADDRESS, CMD_READ_MEASURED_VALUES, &[]);
/// assert_eq!(frame, [0x7E, 0x00, 0x03, 0x00, 0xFC, 0x7E]);
/// ```
///
/// # Panics
///
/// Panics if `data` is longer than 255 bytes, which no SPS30 command needs.
#[must_use]
pub fn encode_request(address: u8, command: u8, data: &[u8]) -> Vec<u8> {
    let len = u8::try_from(data.len()).expect("SHDLC data is at most 255 bytes");

    let mut raw = Vec::with_capacity(data.len() + 4);
    raw.extend_from_slice(&[address, command, len]);
    raw.extend_from_slice(data);
    raw.push(checksum(&raw));

    let mut frame = Vec::with_capacity(raw.len() * 2 + 2);
    frame.push(DELIMITER);
    for byte in raw {
        stuff_into(&mut frame, byte);
    }
    frame.push(DELIMITER);
    frame
}

/// Decode a complete response frame, delimiters included.
pub fn decode_response(frame: &[u8]) -> Result<Response, FrameError> {
    let inner = match frame {
        [DELIMITER, inner @ .., DELIMITER] => inner,
        _ => return Err(FrameError::MissingDelimiters),
    };
    let raw = unstuff(inner)?;

    // ADR CMD STATE L CHK
    if raw.len() < 5 {
        return Err(FrameError::TooShort(raw.len()));
    }
    let (body, chk) = raw.split_at(raw.len() - 1);
    let declared = usize::from(body[3]);
    let actual = body.len() - 4;
    if declared != actual {
        return Err(FrameError::LengthMismatch { declared, actual });
    }
    let expected = checksum(body);
    if chk[0] != expected {
        return Err(FrameError::Checksum {
            expected,
            actual: chk[0],
        });
    }

    Ok(Response {
        address: body[0],
        command: body[1],
        state: body[2],
        data: body[4..].to_vec(),
    })
}

/// Incremental extraction of one frame from a byte stream.
///
/// Bytes before the first delimiter are discarded. Back-to-back delimiters
/// (the stop of a stale frame followed by the start of the next one) are
/// collapsed.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buf: Vec<u8>,
    in_frame: bool,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes; returns a complete frame once the stop delimiter arrives.
    ///
    /// Bytes after the stop delimiter are dropped.
    pub fn push(&mut self, bytes: &[u8]) -> Option<Vec<u8>> {
        for &byte in bytes {
            if !self.in_frame {
                if byte == DELIMITER {
                    self.in_frame = true;
                    self.buf.clear();
                    self.buf.push(DELIMITER);
                }
                continue;
            }
            if byte == DELIMITER {
                if self.buf.len() == 1 {
                    // Empty frame: treat this delimiter as the real start.
                    continue;
                }
                self.buf.push(DELIMITER);
                self.in_frame = false;
                return Some(std::mem::take(&mut self.buf));
            }
            self.buf.push(byte);
        }
        None
    }
}
