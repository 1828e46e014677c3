//! Dashboard data: the selected window, its readings and their summary.
//!
//! Kept free of egui so refresh and plotting rules can be tested directly.

use std::time::{Duration, Instant};

use chrono::NaiveDateTime;

use sps30_store::HistoryStore;
use sps30_types::{Channel, Reading, Summary, TimeWindow};

/// Shortest x-axis span in hours, so a few minutes of data still gets a
/// readable axis.
const MIN_SPAN_HOURS: f64 = 1.0;

/// Format a statistic for the summary table.
pub fn format_value(value: Option<f32>) -> String {
    match value {
        Some(v) => format!("{v:.4}"),
        None => "-".to_string(),
    }
}

/// Hours between `timestamp` and `now`.
pub fn hours_ago(now: NaiveDateTime, timestamp: NaiveDateTime) -> f64 {
    (now - timestamp).num_milliseconds() as f64 / 3_600_000.0
}

/// What the dashboard currently shows.
#[derive(Debug)]
pub struct DashboardView {
    window: TimeWindow,
    readings: Vec<Reading>,
    summary: Option<Summary>,
    queried_at: Option<NaiveDateTime>,
    refreshed_at: Option<Instant>,
    refresh_interval: Duration,
}

impl DashboardView {
    pub fn new(refresh_interval: Duration) -> Self {
        Self {
            window: TimeWindow::default(),
            readings: Vec::new(),
            summary: None,
            queried_at: None,
            refreshed_at: None,
            refresh_interval,
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    /// Select a window. Returns whether it changed; a change forces the
    /// next [`needs_refresh`](Self::needs_refresh).
    pub fn set_window(&mut self, window: TimeWindow) -> bool {
        if window == self.window {
            return false;
        }
        self.window = window;
        self.refreshed_at = None;
        true
    }

    /// Whether the refresh interval has elapsed since the last query.
    pub fn needs_refresh(&self, now: Instant) -> bool {
        self.refreshed_at
            .is_none_or(|last| now.duration_since(last) >= self.refresh_interval)
    }

    /// Re-query the history store for the selected window.
    pub fn refresh(&mut self, history: &HistoryStore, now: NaiveDateTime, instant: Instant) {
        self.readings = history.query_at(self.window, now);
        self.summary = Summary::from_readings(&self.readings);
        self.queried_at = Some(now);
        self.refreshed_at = Some(instant);
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    /// `None` when the window holds no readings.
    pub fn summary(&self) -> Option<&Summary> {
        self.summary.as_ref()
    }

    /// Plot points for `channel` as `[-hours_ago, value]`, oldest first.
    pub fn points(&self, channel: Channel) -> Vec<[f64; 2]> {
        let Some(now) = self.queried_at else {
            return Vec::new();
        };
        self.readings
            .iter()
            .map(|r| [-hours_ago(now, r.timestamp), f64::from(r.value(channel))])
            .collect()
    }

    /// Width of the x-axis in hours.
    ///
    /// Fixed windows use their own length; "All" spans the oldest reading.
    pub fn span_hours(&self) -> f64 {
        let span = match (self.window.duration(), self.queried_at) {
            (Some(duration), _) => duration.num_minutes() as f64 / 60.0,
            (None, Some(now)) => self
                .readings
                .first()
                .map_or(MIN_SPAN_HOURS, |oldest| hours_ago(now, oldest.timestamp)),
            (None, None) => MIN_SPAN_HOURS,
        };
        span.max(MIN_SPAN_HOURS)
    }
}
