//! Front-end view of the sampler, folded from [`SamplerEvent`]s.

use chrono::{NaiveDateTime, TimeDelta};

use sps30_types::Reading;

use crate::messages::{SamplerEvent, SamplerState};

/// A reading newer than this counts as "connected".
pub const CONNECTED_WITHIN_SECS: i64 = 20;

/// What the tray and dashboard show about the sampler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SamplerStatus {
    pub state: SamplerState,
    /// Port of the current connection.
    pub port: Option<String>,
    pub last_reading: Option<Reading>,
    /// Most recent problem worth showing (no port, log write failure).
    pub last_problem: Option<String>,
    before_pause: SamplerState,
}

impl SamplerStatus {
    /// Initial status before any event arrives.
    pub fn new(paused: bool) -> Self {
        Self {
            state: if paused {
                SamplerState::Paused
            } else {
                SamplerState::Running
            },
            ..Self::default()
        }
    }

    /// Fold one event into the status.
    pub fn apply(&mut self, event: &SamplerEvent) {
        match event {
            SamplerEvent::Connected { port } => {
                self.port = Some(port.clone());
                self.state = SamplerState::Running;
                self.last_problem = None;
            }
            SamplerEvent::Reading(reading) => {
                self.last_reading = Some(*reading);
                if self.last_problem.as_deref().is_some_and(is_log_problem) {
                    self.last_problem = None;
                }
            }
            SamplerEvent::PollFailed { .. } | SamplerEvent::Diagnostics(_) => {}
            SamplerEvent::Reacquiring { .. } => {
                self.port = None;
                if self.state == SamplerState::Paused {
                    self.before_pause = SamplerState::Reacquiring;
                } else {
                    self.state = SamplerState::Reacquiring;
                }
            }
            SamplerEvent::NoPortFound { tried } => {
                self.port = None;
                self.state = SamplerState::Reacquiring;
                self.last_problem = Some(if tried.is_empty() {
                    "No SPS30 found (no candidate ports)".to_string()
                } else {
                    format!("No SPS30 found (tried {})", tried.join(", "))
                });
            }
            SamplerEvent::LogWriteFailed { error } => {
                self.last_problem = Some(format!("{LOG_PROBLEM_PREFIX}{error}"));
            }
            SamplerEvent::Paused => {
                if self.state != SamplerState::Paused {
                    self.before_pause = self.state;
                }
                self.state = SamplerState::Paused;
            }
            SamplerEvent::Resumed => self.state = self.before_pause,
        }
    }

    /// Whether a reading arrived within [`CONNECTED_WITHIN_SECS`] of `now`.
    pub fn is_connected(&self, now: NaiveDateTime) -> bool {
        self.last_reading
            .is_some_and(|r| now - r.timestamp <= TimeDelta::seconds(CONNECTED_WITHIN_SECS))
    }

    /// One-line summary for the tray menu and tooltip.
    pub fn headline(&self) -> String {
        match (self.state, &self.last_reading) {
            (SamplerState::Running, Some(r)) => format!("PM2.5: {:.1} µg/m³", r.pm2_5),
            (SamplerState::Running, None) => "Waiting for first reading".to_string(),
            (state, _) => state.label().to_string(),
        }
    }
}

const LOG_PROBLEM_PREFIX: &str = "Log write failed: ";

fn is_log_problem(problem: &str) -> bool {
    problem.starts_with(LOG_PROBLEM_PREFIX)
}
