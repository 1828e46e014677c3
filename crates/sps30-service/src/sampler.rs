//! The sampling state machine.
//!
//! ```text
//! Running     --(threshold consecutive poll failures)--> Reacquiring
//! Reacquiring --(resolver finds a port)----------------> Running
//! Reacquiring --(no port found)------------------------> Reacquiring
//! ```
//!
//! Pausing is orthogonal: while paused, ticks do nothing and the phase held
//! before pausing is restored on resume.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use sps30_core::{Connection, Error, PortResolver, ReadingSource};
use sps30_store::{CsvLogger, HistoryStore};
use sps30_types::Reading;

use crate::messages::{SamplerEvent, SamplerState};

/// Consecutive poll failures before the port is re-resolved.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    Reacquiring,
}

/// Polls a [`ReadingSource`], logs readings and recovers from failures.
///
/// Every successful reading is appended to the CSV log first and only then
/// recorded in the history store, so the history never shows a reading that
/// is missing from disk.
pub struct Sampler<S: ReadingSource> {
    source: Arc<S>,
    resolver: PortResolver,
    logger: CsvLogger,
    history: Arc<HistoryStore>,
    failure_threshold: u32,
    phase: Phase,
    paused: bool,
    connection: Option<Connection<S::Handle>>,
    consecutive_failures: u32,
}

impl<S: ReadingSource> Sampler<S> {
    pub fn new(
        source: Arc<S>,
        resolver: PortResolver,
        logger: CsvLogger,
        history: Arc<HistoryStore>,
    ) -> Self {
        Self {
            source,
            resolver,
            logger,
            history,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            phase: Phase::Running,
            paused: false,
            connection: None,
            consecutive_failures: 0,
        }
    }

    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Start paused.
    #[must_use]
    pub fn paused(mut self, paused: bool) -> Self {
        self.paused = paused;
        self
    }

    pub fn state(&self) -> SamplerState {
        if self.paused {
            SamplerState::Paused
        } else {
            match self.phase {
                Phase::Running => SamplerState::Running,
                Phase::Reacquiring => SamplerState::Reacquiring,
            }
        }
    }

    /// Port of the open connection, if any.
    pub fn current_port(&self) -> Option<&str> {
        self.connection.as_ref().map(|c| c.port.as_str())
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// One timer tick.
    pub async fn tick(&mut self) -> Vec<SamplerEvent> {
        let mut events = Vec::new();

        if self.paused {
            debug!("Tick skipped: paused");
            return events;
        }

        match self.phase {
            Phase::Running => self.poll_once(&mut events).await,
            Phase::Reacquiring => self.reacquire(&mut events).await,
        }
        events
    }

    async fn poll_once(&mut self, events: &mut Vec<SamplerEvent>) {
        let Some(conn) = self.connection.as_mut() else {
            // Start-up: nothing resolved yet.
            self.reacquire(events).await;
            return;
        };
        let port = conn.port.clone();

        match self.source.poll(&mut conn.handle).await {
            Ok(reading) => {
                self.consecutive_failures = 0;
                self.emit(reading, events);
            }
            Err(e) => {
                self.consecutive_failures += 1;
                warn!(
                    "Poll on {} failed: {} ({} consecutive)",
                    port, e, self.consecutive_failures
                );
                events.push(SamplerEvent::PollFailed {
                    port: port.clone(),
                    error: e.to_string(),
                    consecutive: self.consecutive_failures,
                });

                if self.consecutive_failures >= self.failure_threshold {
                    warn!(
                        "{} consecutive failures on {}, reacquiring",
                        self.consecutive_failures, port
                    );
                    self.disconnect().await;
                    self.phase = Phase::Reacquiring;
                    events.push(SamplerEvent::Reacquiring { port: Some(port) });
                }
            }
        }
    }

    async fn reacquire(&mut self, events: &mut Vec<SamplerEvent>) {
        match self.resolver.resolve(self.source.as_ref()).await {
            Ok(conn) => {
                info!("Connected to SPS30 on {}", conn.port);
                let trial = conn.trial;
                events.push(SamplerEvent::Connected {
                    port: conn.port.clone(),
                });
                self.connection = Some(conn);
                self.phase = Phase::Running;
                self.consecutive_failures = 0;
                self.emit(trial, events);
            }
            Err(e) => {
                error!("Port resolution failed: {}", e);
                let tried = match e {
                    Error::NoPortFound { tried } => tried,
                    _ => Vec::new(),
                };
                self.phase = Phase::Reacquiring;
                events.push(SamplerEvent::NoPortFound { tried });
            }
        }
    }

    /// Append, then record. A reading that cannot be logged is dropped.
    fn emit(&mut self, reading: Reading, events: &mut Vec<SamplerEvent>) {
        match self.logger.append(&reading) {
            Ok(()) => {
                debug!(
                    "Reading PM1.0={:.3} PM2.5={:.3} PM4={:.3} PM10={:.3}",
                    reading.pm1, reading.pm2_5, reading.pm4, reading.pm10
                );
                self.history.record(reading);
                events.push(SamplerEvent::Reading(reading));
            }
            Err(e) => {
                error!("Failed to write log: {}", e);
                events.push(SamplerEvent::LogWriteFailed {
                    error: e.to_string(),
                });
            }
        }
    }

    /// Stop polling until [`resume`](Self::resume). Returns `None` if already paused.
    pub fn pause(&mut self) -> Option<SamplerEvent> {
        if self.paused {
            return None;
        }
        self.paused = true;
        info!("Sampling paused");
        Some(SamplerEvent::Paused)
    }

    /// Resume from the phase held before pausing. Returns `None` if not paused.
    pub fn resume(&mut self) -> Option<SamplerEvent> {
        if !self.paused {
            return None;
        }
        self.paused = false;
        info!("Sampling resumed ({:?})", self.phase);
        Some(SamplerEvent::Resumed)
    }

    /// Close the current port, probe every candidate, and leave the sampler
    /// reacquiring so the next unpaused tick reconnects.
    pub async fn connection_test(&mut self) -> Vec<SamplerEvent> {
        let mut events = Vec::new();

        if let Some(port) = self.disconnect().await {
            events.push(SamplerEvent::Reacquiring { port: Some(port) });
        }
        self.phase = Phase::Reacquiring;
        self.consecutive_failures = 0;

        info!("Running connection test");
        let report = self.resolver.probe(self.source.as_ref()).await;
        info!("Connection test: {}", report);
        events.push(SamplerEvent::Diagnostics(report));
        events
    }

    /// Close the port, if open.
    pub async fn shutdown(&mut self) {
        if let Some(port) = self.disconnect().await {
            info!("Closed {}", port);
        }
    }

    async fn disconnect(&mut self) -> Option<String> {
        let conn = self.connection.take()?;
        self.source.close(conn.handle).await;
        Some(conn.port)
    }
}
