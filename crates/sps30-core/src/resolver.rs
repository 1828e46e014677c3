//! Port resolution: find the port an SPS30 is attached to.

use std::fmt;

use tracing::{debug, info};

use sps30_types::Reading;

use crate::error::{Error, Result};
use crate::ports::sort_candidates;
use crate::traits::ReadingSource;

/// An opened port that produced a trial reading.
#[derive(Debug)]
pub struct Connection<H> {
    /// The port identifier.
    pub port: String,
    /// The open handle, ready for polling.
    pub handle: H,
    /// The reading taken while validating the port.
    pub trial: Reading,
}

/// Outcome of probing a single port during a connection test.
#[derive(Debug, Clone, PartialEq)]
pub struct PortProbe {
    pub port: String,
    /// Device identity, when the source can report one.
    pub device: Option<String>,
    /// The trial reading, or why the port failed.
    pub outcome: std::result::Result<Reading, String>,
}

/// Per-port results of a connection test.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeReport {
    pub ports: Vec<PortProbe>,
}

impl ProbeReport {
    /// Ports that produced a reading.
    pub fn working(&self) -> impl Iterator<Item = &PortProbe> {
        self.ports.iter().filter(|p| p.outcome.is_ok())
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

impl fmt::Display for ProbeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ports.is_empty() {
            return f.write_str("no candidate ports");
        }
        for (i, probe) in self.ports.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            match &probe.outcome {
                Ok(reading) => {
                    write!(f, "{}: OK (PM2.5 {:.1} µg/m³", probe.port, reading.pm2_5)?;
                    if let Some(device) = &probe.device {
                        write!(f, ", serial {device}")?;
                    }
                    f.write_str(")")?;
                }
                Err(reason) => write!(f, "{}: {}", probe.port, reason)?,
            }
        }
        Ok(())
    }
}

/// Chooses which ports to try and in which order.
///
/// A fixed port is authoritative: when set, only that port is tried.
/// Otherwise the scan range (or, when it is empty, whatever the source
/// detects) is tried in ascending order.
#[derive(Debug, Clone, Default)]
pub struct PortResolver {
    fixed: Option<String>,
    scan_range: Vec<String>,
}

impl PortResolver {
    pub fn new(fixed: Option<String>, scan_range: Vec<String>) -> Self {
        Self {
            fixed: fixed.filter(|p| !p.trim().is_empty()),
            scan_range,
        }
    }

    /// The ports `resolve` would try, in order.
    pub fn candidates<S: ReadingSource>(&self, source: &S) -> Vec<String> {
        if let Some(port) = &self.fixed {
            return vec![port.clone()];
        }
        if self.scan_range.is_empty() {
            sort_candidates(source.candidates())
        } else {
            sort_candidates(self.scan_range.iter().cloned())
        }
    }

    /// Open the first candidate that yields a trial reading.
    ///
    /// Candidates that fail are closed; the winning handle stays open.
    /// Fails with [`Error::NoPortFound`] listing every port tried.
    pub async fn resolve<S: ReadingSource>(&self, source: &S) -> Result<Connection<S::Handle>> {
        let candidates = self.candidates(source);
        let mut tried = Vec::with_capacity(candidates.len());

        for port in candidates {
            tried.push(port.clone());
            match try_port(source, &port).await {
                Ok((handle, trial)) => {
                    info!("SPS30 found on {}", port);
                    return Ok(Connection {
                        port,
                        handle,
                        trial,
                    });
                }
                Err(e) => debug!("Candidate {} rejected: {}", port, e),
            }
        }

        Err(Error::NoPortFound { tried })
    }

    /// Try every candidate and report each outcome. All handles are closed.
    pub async fn probe<S: ReadingSource>(&self, source: &S) -> ProbeReport {
        let mut report = ProbeReport::default();

        for port in self.candidates(source) {
            let probe = match source.open(&port).await {
                Ok(mut handle) => {
                    let outcome = source.poll(&mut handle).await.map_err(|e| e.to_string());
                    let device = if outcome.is_ok() {
                        source.identify(&mut handle).await
                    } else {
                        None
                    };
                    source.close(handle).await;
                    PortProbe {
                        port,
                        device,
                        outcome,
                    }
                }
                Err(e) => PortProbe {
                    port,
                    device: None,
                    outcome: Err(e.to_string()),
                },
            };
            debug!("Probe {:?}", probe);
            report.ports.push(probe);
        }

        report
    }
}

async fn try_port<S: ReadingSource>(source: &S, port: &str) -> Result<(S::Handle, Reading)> {
    let mut handle = source.open(port).await?;
    match source.poll(&mut handle).await {
        Ok(reading) => Ok((handle, reading)),
        Err(e) => {
            source.close(handle).await;
            Err(e)
        }
    }
}
