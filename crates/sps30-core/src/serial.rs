//! SPS30 over a UART serial port.
//!
//! `serialport` is blocking, so every exchange runs on the tokio blocking
//! pool and is bounded by an async timeout on top of the per-read port
//! timeout.

use std::io::ErrorKind;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Local;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, warn};

use sps30_types::{OutputFormat, Reading};

use crate::error::{DeviceError, Error, Result};
use crate::ports;
use crate::shdlc::{self, FrameAssembler, Response};
use crate::traits::ReadingSource;

/// UART speed mandated by the SPS30 datasheet.
pub const BAUD_RATE: u32 = 115_200;

/// Granularity of blocking reads; the overall deadline is checked between reads.
const READ_SLICE: Duration = Duration::from_millis(50);

/// Delay before asking again when the sensor has no new value yet.
const NO_DATA_RETRY: Duration = Duration::from_millis(100);

/// Settings for [`SerialSource`].
#[derive(Debug, Clone)]
pub struct SerialSettings {
    /// Upper bound for one poll (and for opening a port).
    pub timeout: Duration,
    /// Measurement output format requested on start.
    pub format: OutputFormat,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            format: OutputFormat::Float,
        }
    }
}

/// An opened, measuring SPS30.
pub struct SerialLink {
    port_name: String,
    port: Arc<Mutex<Box<dyn SerialPort>>>,
}

impl SerialLink {
    /// Name of the underlying port.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("port_name", &self.port_name)
            .finish()
    }
}

/// [`ReadingSource`] backed by real serial ports.
#[derive(Debug, Clone, Default)]
pub struct SerialSource {
    settings: SerialSettings,
}

impl SerialSource {
    pub fn new(settings: SerialSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }
}

#[async_trait]
impl ReadingSource for SerialSource {
    type Handle = SerialLink;

    async fn open(&self, port: &str) -> Result<SerialLink> {
        let name = port.to_string();
        let settings = self.settings.clone();
        let limit = settings.timeout * 2;

        let task = tokio::task::spawn_blocking(move || open_blocking(&name, &settings));
        let opened = match tokio::time::timeout(limit, task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join)) => {
                return Err(Error::PortUnavailable {
                    port: port.to_string(),
                    reason: format!("serial worker failed: {join}"),
                });
            }
            Err(_) => {
                return Err(Error::PortUnavailable {
                    port: port.to_string(),
                    reason: format!("no answer within {:?}", self.settings.timeout),
                });
            }
        };

        debug!("Opened {} and started measurement", port);
        Ok(SerialLink {
            port_name: port.to_string(),
            port: Arc::new(Mutex::new(opened)),
        })
    }

    async fn poll(&self, handle: &mut SerialLink) -> Result<Reading> {
        let port = Arc::clone(&handle.port);
        let format = self.settings.format;
        let timeout = self.settings.timeout;

        let task = tokio::task::spawn_blocking(move || {
            let mut guard = port
                .lock()
                .map_err(|_| DeviceError::Worker("serial port lock poisoned".to_string()))?;
            read_measurement(&mut **guard, format, timeout)
        });

        let reading = match tokio::time::timeout(timeout + READ_SLICE, task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join)) => return Err(DeviceError::Worker(join.to_string()).into()),
            Err(_) => {
                return Err(DeviceError::Timeout {
                    operation: "read_measured_values",
                    duration: timeout,
                }
                .into());
            }
        };
        Ok(reading)
    }

    async fn identify(&self, handle: &mut SerialLink) -> Option<String> {
        let port = Arc::clone(&handle.port);
        let timeout = self.settings.timeout;

        let task = tokio::task::spawn_blocking(move || {
            let mut guard = port
                .lock()
                .map_err(|_| DeviceError::Worker("serial port lock poisoned".to_string()))?;
            let response = transact(
                &mut **guard,
                shdlc::CMD_DEVICE_INFORMATION,
                &[shdlc::INFO_SERIAL_NUMBER],
                timeout,
            )?;
            Ok::<_, DeviceError>(shdlc::parse_ascii(&response.data))
        });

        match tokio::time::timeout(timeout + READ_SLICE, task).await {
            Ok(Ok(Ok(serial))) if !serial.is_empty() => Some(serial),
            Ok(Ok(Err(e))) => {
                debug!("Device information on {} failed: {}", handle.port_name, e);
                None
            }
            _ => None,
        }
    }

    async fn close(&self, handle: SerialLink) {
        let SerialLink { port_name, port } = handle;
        let timeout = self.settings.timeout;

        let task = tokio::task::spawn_blocking(move || {
            if let Ok(mut guard) = port.lock() {
                transact(&mut **guard, shdlc::CMD_STOP_MEASUREMENT, &[], timeout)?;
            }
            Ok::<_, DeviceError>(())
        });

        match tokio::time::timeout(timeout + READ_SLICE, task).await {
            Ok(Ok(Ok(()))) => debug!("Stopped measurement on {}", port_name),
            Ok(Ok(Err(e))) => debug!("Stop measurement on {} failed: {}", port_name, e),
            Ok(Err(e)) => warn!("Serial worker for {} failed on close: {}", port_name, e),
            Err(_) => debug!("Stop measurement on {} timed out", port_name),
        }
    }

    fn candidates(&self) -> Vec<String> {
        ports::detect_serial_ports()
    }
}

fn open_blocking(name: &str, settings: &SerialSettings) -> Result<Box<dyn SerialPort>> {
    let unavailable = |reason: String| Error::PortUnavailable {
        port: name.to_string(),
        reason,
    };

    let mut port = serialport::new(name, BAUD_RATE)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(READ_SLICE)
        .open()
        .map_err(|e| unavailable(e.to_string()))?;

    let start = [0x01, settings.format.selector()];
    let response = transact(
        &mut *port,
        shdlc::CMD_START_MEASUREMENT,
        &start,
        settings.timeout,
    )
    .map_err(|e| unavailable(format!("start measurement failed: {e}")))?;

    match response.state {
        0 => {}
        shdlc::STATE_WRONG_MODE => debug!("{} was already measuring", name),
        state => {
            return Err(unavailable(format!(
                "start measurement rejected (state 0x{state:02X})"
            )));
        }
    }
    Ok(port)
}

/// Poll Read Measured Values until a value is ready or `timeout` elapses.
fn read_measurement(
    port: &mut dyn SerialPort,
    format: OutputFormat,
    timeout: Duration,
) -> std::result::Result<Reading, DeviceError> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(DeviceError::Timeout {
                operation: "read_measured_values",
                duration: timeout,
            });
        }

        let response = transact(port, shdlc::CMD_READ_MEASURED_VALUES, &[], remaining)?;
        if response.state != 0 {
            return Err(DeviceError::State {
                command: response.command,
                state: response.state,
            });
        }
        if response.data.is_empty() {
            std::thread::sleep(NO_DATA_RETRY.min(remaining));
            continue;
        }

        let timestamp = Local::now().naive_local();
        return Ok(Reading::from_payload(timestamp, format, &response.data)?);
    }
}

/// Send one request and wait for the matching response.
fn transact(
    port: &mut dyn SerialPort,
    command: u8,
    data: &[u8],
    timeout: Duration,
) -> std::result::Result<Response, DeviceError> {
    // Drop whatever a previous, abandoned exchange left behind.
    port.clear(ClearBuffer::Input).map_err(std::io::Error::from)?;

    let frame = shdlc::encode_request(shdlc::DEVICE_ADDRESS, command, data);
    port.write_all(&frame)?;
    port.flush()?;

    let raw = read_frame(port, timeout)?;
    let response = shdlc::decode_response(&raw)?;
    if response.command != command {
        return Err(shdlc::FrameError::UnexpectedCommand {
            expected: command,
            actual: response.command,
        }
        .into());
    }
    Ok(response)
}

fn read_frame(
    port: &mut dyn SerialPort,
    timeout: Duration,
) -> std::result::Result<Vec<u8>, DeviceError> {
    let deadline = Instant::now() + timeout;
    let mut assembler = FrameAssembler::new();
    let mut buf = [0u8; 64];

    while Instant::now() < deadline {
        match port.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                if let Some(frame) = assembler.push(&buf[..n]) {
                    return Ok(frame);
                }
            }
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }

    Err(DeviceError::Timeout {
        operation: "read_frame",
        duration: timeout,
    })
}
