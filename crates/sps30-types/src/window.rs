//! Trailing time windows used to filter history for display.

use core::fmt;

use chrono::{NaiveDateTime, TimeDelta};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A trailing duration selected on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TimeWindow {
    /// The last hour.
    #[default]
    LastHour,
    /// The last three hours.
    Last3Hours,
    /// The last twelve hours.
    Last12Hours,
    /// The last twenty-four hours.
    Last24Hours,
    /// Everything retained in memory.
    All,
}

impl TimeWindow {
    /// All windows in selector order.
    pub const ALL: [TimeWindow; 5] = [
        TimeWindow::LastHour,
        TimeWindow::Last3Hours,
        TimeWindow::Last12Hours,
        TimeWindow::Last24Hours,
        TimeWindow::All,
    ];

    /// Length of the window, or `None` for [`TimeWindow::All`].
    #[must_use]
    pub fn duration(&self) -> Option<TimeDelta> {
        match self {
            TimeWindow::LastHour => Some(TimeDelta::hours(1)),
            TimeWindow::Last3Hours => Some(TimeDelta::hours(3)),
            TimeWindow::Last12Hours => Some(TimeDelta::hours(12)),
            TimeWindow::Last24Hours => Some(TimeDelta::hours(24)),
            TimeWindow::All => None,
        }
    }

    /// Short selector label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            TimeWindow::LastHour => "Last 1h",
            TimeWindow::Last3Hours => "Last 3h",
            TimeWindow::Last12Hours => "Last 12h",
            TimeWindow::Last24Hours => "Last 24h",
            TimeWindow::All => "All time",
        }
    }

    /// Whether a reading taken at `timestamp` falls inside the window ending at `now`.
    ///
    /// The boundary is inclusive: a reading exactly one window length old is kept.
    ///
    /// ```
    /// use chrono::{NaiveDate, TimeDelta};
    /// use sps30_types::TimeWindow;
    ///
    /// let now = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(12, 0, 0).unwrap();
    /// assert!(TimeWindow::LastHour.contains(now, now - TimeDelta::hours(1)));
    /// assert!(!TimeWindow::LastHour.contains(now, now - TimeDelta::minutes(61)));
    /// assert!(TimeWindow::All.contains(now, now - TimeDelta::days(365)));
    /// ```
    #[must_use]
    pub fn contains(&self, now: NaiveDateTime, timestamp: NaiveDateTime) -> bool {
        match self.duration() {
            Some(duration) => now - timestamp <= duration,
            None => true,
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
