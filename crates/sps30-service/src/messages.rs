//! Messages exchanged between the sampler and its front-end.

use std::fmt;

use sps30_core::ProbeReport;
use sps30_types::Reading;

/// Requests sent to the background collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Stop polling; the timer keeps running.
    Pause,
    /// Continue from the state held before pausing.
    Resume,
    /// Close the current port, probe every candidate and report.
    ConnectionTest,
    /// Close the port and stop the collector.
    Shutdown,
}

/// Externally visible sampler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplerState {
    #[default]
    Running,
    Paused,
    Reacquiring,
}

impl SamplerState {
    pub fn label(&self) -> &'static str {
        match self {
            SamplerState::Running => "Running",
            SamplerState::Paused => "Paused",
            SamplerState::Reacquiring => "Reacquiring",
        }
    }
}

impl fmt::Display for SamplerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Something that happened during a tick or in response to a command.
#[derive(Debug, Clone, PartialEq)]
pub enum SamplerEvent {
    /// A port was resolved and measurement started.
    Connected { port: String },
    /// A reading was logged and recorded.
    Reading(Reading),
    /// A poll failed; `consecutive` counts failures since the last success.
    PollFailed {
        port: String,
        error: String,
        consecutive: u32,
    },
    /// The port was closed and the resolver will run on following ticks.
    Reacquiring { port: Option<String> },
    /// No candidate port produced a reading.
    NoPortFound { tried: Vec<String> },
    /// The CSV append failed; the reading was dropped.
    LogWriteFailed { error: String },
    Paused,
    Resumed,
    /// Result of a connection test.
    Diagnostics(ProbeReport),
}
