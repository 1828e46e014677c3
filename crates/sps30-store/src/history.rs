//! Bounded in-memory history of recent readings.
//!
//! The sampler records into the store while the dashboard queries it, so all
//! access goes through an `RwLock`. Readings are kept sorted by timestamp and
//! trimmed to a retention horizon measured from the newest reading, or from
//! the current time if the newest reading lies in the future.

use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};

use chrono::{Local, NaiveDateTime, TimeDelta};

use sps30_types::{Reading, TimeWindow};

/// Retention used by [`HistoryStore::new`].
pub const DEFAULT_RETENTION_HOURS: i64 = 7 * 24;

/// Recent readings shared between the sampler and the dashboard.
#[derive(Debug)]
pub struct HistoryStore {
    readings: RwLock<VecDeque<Reading>>,
    retention: TimeDelta,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore {
    /// A store keeping seven days of readings.
    pub fn new() -> Self {
        Self::with_retention(TimeDelta::hours(DEFAULT_RETENTION_HOURS))
    }

    pub fn with_retention(retention: TimeDelta) -> Self {
        Self {
            readings: RwLock::new(VecDeque::new()),
            retention,
        }
    }

    pub fn retention(&self) -> TimeDelta {
        self.retention
    }

    /// Add a reading, keeping timestamp order, and drop readings older than
    /// the retention horizon.
    pub fn record(&self, reading: Reading) {
        let mut readings = self.readings.write().unwrap_or_else(PoisonError::into_inner);
        insert_sorted(&mut readings, reading);
        trim(&mut readings, self.retention, Local::now().naive_local());
    }

    /// Bulk-load readings, e.g. from the CSV logs at start-up.
    pub fn seed(&self, seeded: impl IntoIterator<Item = Reading>) {
        let mut readings = self.readings.write().unwrap_or_else(PoisonError::into_inner);
        for reading in seeded {
            insert_sorted(&mut readings, reading);
        }
        trim(&mut readings, self.retention, Local::now().naive_local());
    }

    /// Readings within `window` of the current local time, oldest first.
    pub fn query(&self, window: TimeWindow) -> Vec<Reading> {
        self.query_at(window, Local::now().naive_local())
    }

    /// Readings within `window` of `now`, oldest first.
    pub fn query_at(&self, window: TimeWindow, now: NaiveDateTime) -> Vec<Reading> {
        let readings = self.readings.read().unwrap_or_else(PoisonError::into_inner);
        // Sorted, so everything from the first match onwards is in the window.
        let start = readings.partition_point(|r| !window.contains(now, r.timestamp));
        readings.range(start..).copied().collect()
    }

    /// The most recent reading.
    pub fn latest(&self) -> Option<Reading> {
        self.readings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .back()
            .copied()
    }

    pub fn len(&self) -> usize {
        self.readings.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn insert_sorted(readings: &mut VecDeque<Reading>, reading: Reading) {
    match readings.back() {
        Some(last) if last.timestamp > reading.timestamp => {
            let at = readings.partition_point(|r| r.timestamp <= reading.timestamp);
            readings.insert(at, reading);
        }
        _ => readings.push_back(reading),
    }
}

fn trim(readings: &mut VecDeque<Reading>, retention: TimeDelta, now: NaiveDateTime) {
    let Some(newest) = readings.back().map(|r| r.timestamp) else {
        return;
    };
    // A reading stamped ahead of the clock must not evict the rest.
    let horizon = newest.min(now) - retention;
    while readings.front().is_some_and(|r| r.timestamp < horizon) {
        readings.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn reading(at: NaiveDateTime, pm: f32) -> Reading {
        Reading::new(at, pm, pm, pm, pm)
    }

    #[test]
    fn test_empty_store() {
        let store = HistoryStore::new();
        assert!(store.is_empty());
        assert!(store.latest().is_none());
        assert!(store.query_at(TimeWindow::All, ts(12, 0)).is_empty());
    }

    #[test]
    fn test_query_filters_by_window() {
        let store = HistoryStore::new();
        for (h, pm) in [(6, 1.0), (9, 2.0), (11, 3.0), (12, 4.0)] {
            store.record(reading(ts(h, 0), pm));
        }
        let now = ts(12, 0);

        let last_hour = store.query_at(TimeWindow::LastHour, now);
        assert_eq!(last_hour.iter().map(|r| r.pm1).collect::<Vec<_>>(), [3.0, 4.0]);

        let last_3h = store.query_at(TimeWindow::Last3Hours, now);
        assert_eq!(last_3h.len(), 3);
        assert!(last_3h.iter().all(|r| now - r.timestamp <= TimeDelta::hours(3)));

        assert_eq!(store.query_at(TimeWindow::All, now).len(), 4);
    }

    #[test]
    fn test_out_of_order_insert_keeps_sorted() {
        let store = HistoryStore::new();
        store.record(reading(ts(10, 0), 1.0));
        store.record(reading(ts(10, 10), 3.0));
        store.record(reading(ts(10, 5), 2.0));

        let all = store.query_at(TimeWindow::All, ts(11, 0));
        assert_eq!(all.iter().map(|r| r.pm1).collect::<Vec<_>>(), [1.0, 2.0, 3.0]);
        assert_eq!(store.latest().map(|r| r.pm1), Some(3.0));
    }

    #[test]
    fn test_retention_trims_from_newest() {
        let store = HistoryStore::with_retention(TimeDelta::hours(2));
        store.record(reading(ts(8, 0), 1.0));
        store.record(reading(ts(9, 0), 2.0));
        store.record(reading(ts(11, 0), 3.0));

        // 08:00 is older than 11:00 - 2h; 09:00 sits exactly on the horizon.
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.query_at(TimeWindow::All, ts(11, 0))[0].timestamp,
            ts(9, 0)
        );
    }

    #[test]
    fn test_future_reading_does_not_evict_history() {
        let store = HistoryStore::with_retention(TimeDelta::hours(2));
        let now = Local::now().naive_local();
        store.record(reading(now - TimeDelta::minutes(30), 1.0));
        store.record(reading(now + TimeDelta::days(365), 2.0));

        assert_eq!(store.len(), 2);
        assert_eq!(store.latest().map(|r| r.pm1), Some(2.0));
    }

    #[test]
    fn test_trim_horizon_capped_at_now() {
        let mut readings: VecDeque<Reading> = [
            reading(ts(8, 0), 1.0),
            reading(ts(10, 30), 2.0),
            reading(ts(23, 0), 3.0),
        ]
        .into();

        trim(&mut readings, TimeDelta::hours(2), ts(12, 0));

        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].timestamp, ts(10, 30));
    }

    #[test]
    fn test_seed_merges_with_recorded() {
        let store = HistoryStore::new();
        store.record(reading(ts(12, 0), 9.0));
        store.seed([reading(ts(10, 0), 1.0), reading(ts(11, 0), 2.0)]);

        let all = store.query_at(TimeWindow::All, ts(12, 0));
        assert_eq!(all.iter().map(|r| r.pm1).collect::<Vec<_>>(), [1.0, 2.0, 9.0]);
    }

    #[test]
    fn test_concurrent_record_and_query() {
        let store = Arc::new(HistoryStore::new());
        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..500 {
                    store.record(reading(ts(0, 0) + TimeDelta::seconds(i), i as f32));
                }
            })
        };

        for _ in 0..100 {
            let snapshot = store.query_at(TimeWindow::All, ts(1, 0));
            assert!(snapshot.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        }
        writer.join().unwrap();
        assert_eq!(store.len(), 500);
    }
}
