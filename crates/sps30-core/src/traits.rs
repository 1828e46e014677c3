//! Trait abstraction over measurement sources.
//!
//! [`ReadingSource`] lets the resolver and the sampler run against either a
//! real serial SPS30 ([`SerialSource`](crate::SerialSource)) or
//! [`MockSource`](crate::MockSource) in tests.

use async_trait::async_trait;

use sps30_types::Reading;

use crate::error::Result;

/// Something that can be opened on a named port and polled for readings.
///
/// # Example
///
/// ```ignore
/// use sps30_core::{ReadingSource, Result};
///
/// async fn read_once<S: ReadingSource>(source: &S, port: &str) -> Result<()> {
///     let mut handle = source.open(port).await?;
///     let reading = source.poll(&mut handle).await?;
///     println!("PM2.5: {:.1} µg/m³", reading.pm2_5);
///     source.close(handle).await;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait ReadingSource: Send + Sync {
    /// An opened, measuring device.
    type Handle: Send;

    /// Open `port` and start measurement.
    ///
    /// Fails with [`Error::PortUnavailable`](crate::Error::PortUnavailable)
    /// when the port does not exist, is busy, or does not answer as an SPS30.
    async fn open(&self, port: &str) -> Result<Self::Handle>;

    /// Obtain one reading, blocking at most the configured poll timeout.
    ///
    /// The timestamp is the local time at which the reading was obtained.
    async fn poll(&self, handle: &mut Self::Handle) -> Result<Reading>;

    /// Identify the device behind an opened handle (e.g. its serial number).
    ///
    /// Used in connection test reports; sources that cannot tell return `None`.
    async fn identify(&self, _handle: &mut Self::Handle) -> Option<String> {
        None
    }

    /// Stop measurement and release the port. Never fails.
    async fn close(&self, handle: Self::Handle);

    /// Ports to scan when no explicit scan range is configured.
    fn candidates(&self) -> Vec<String>;
}
