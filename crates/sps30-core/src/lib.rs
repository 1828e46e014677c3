//! Serial driver and port discovery for the Sensirion SPS30 particulate
//! matter sensor.
//!
//! # Features
//!
//! - **SHDLC framing**: request encoding, response decoding, byte stuffing
//! - **Serial source**: start/stop measurement and bounded-time polling over UART
//! - **Port discovery**: OS enumeration with a `COM3..=COM40` fallback on Windows
//! - **Port resolution**: fixed port or ascending scan, validated by a trial reading
//! - **Connection test**: probe every candidate and report per-port results
//! - **Mock source**: failure injection for testing without hardware
//!
//! # Quick Start
//!
//! ```no_run
//! use sps30_core::{PortResolver, ReadingSource, SerialSettings, SerialSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = SerialSource::new(SerialSettings::default());
//!     let resolver = PortResolver::new(None, Vec::new());
//!
//!     let mut conn = resolver.resolve(&source).await?;
//!     println!("SPS30 on {}", conn.port);
//!
//!     let reading = source.poll(&mut conn.handle).await?;
//!     println!("PM2.5: {:.1} µg/m³", reading.pm2_5);
//!
//!     source.close(conn.handle).await;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod mock;
pub mod ports;
pub mod resolver;
pub mod serial;
pub mod shdlc;
pub mod traits;

pub use error::{DeviceError, Error, Result};
pub use mock::{MockHandle, MockSource};
pub use ports::{detect_serial_ports, sort_candidates};
pub use resolver::{Connection, PortProbe, PortResolver, ProbeReport};
pub use serial::{BAUD_RATE, SerialLink, SerialSettings, SerialSource};
pub use traits::ReadingSource;

// Re-export from sps30-types
pub use sps30_types::{OutputFormat, Reading};
