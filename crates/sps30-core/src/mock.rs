//! Mock reading source for testing.
//!
//! [`MockSource`] implements [`ReadingSource`] over a set of named fake
//! ports, so the resolver and the sampler can be exercised without hardware.
//!
//! # Features
//!
//! - **Port topology**: ports can be reachable, unreachable, or "unplugged" mid-run
//! - **Failure injection**: fail the next N polls, or every poll, on a port
//! - **Latency**: polls can be delayed to model a slow or hung sensor
//! - **Deterministic clock**: readings can be stamped from a stepping clock
//! - **Call recording**: open attempts, polls and closes are counted

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime, TimeDelta};

use sps30_types::Reading;

use crate::error::{DeviceError, Error, Result};
use crate::traits::ReadingSource;

#[derive(Debug, Clone, Default)]
struct MockPort {
    reachable: bool,
    always_fail: bool,
    remaining_failures: u32,
}

#[derive(Debug, Clone, Copy)]
struct MockClock {
    next: NaiveDateTime,
    step: TimeDelta,
}

/// Handle to an opened mock port.
#[derive(Debug)]
pub struct MockHandle {
    port: String,
}

impl MockHandle {
    pub fn port(&self) -> &str {
        &self.port
    }
}

/// A fake SPS30 reachable on configurable ports.
///
/// # Example
///
/// ```
/// use sps30_core::{MockSource, PortResolver};
///
/// #[tokio::main]
/// async fn main() {
///     let source = MockSource::new()
///         .with_unavailable_port("COM3")
///         .with_port("COM5");
///     let resolver = PortResolver::new(None, vec!["COM3".into(), "COM5".into()]);
///
///     let conn = resolver.resolve(&source).await.unwrap();
///     assert_eq!(conn.port, "COM5");
///     assert_eq!(source.open_attempts(), ["COM3", "COM5"]);
/// }
/// ```
#[derive(Debug)]
pub struct MockSource {
    ports: Mutex<HashMap<String, MockPort>>,
    detected: Vec<String>,
    values: Mutex<[f32; 4]>,
    clock: Mutex<Option<MockClock>>,
    poll_delay: Mutex<Duration>,
    open_attempts: Mutex<Vec<String>>,
    poll_count: AtomicU32,
    close_count: AtomicU32,
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSource {
    /// A source with no ports.
    pub fn new() -> Self {
        Self {
            ports: Mutex::new(HashMap::new()),
            detected: Vec::new(),
            values: Mutex::new([3.2, 5.1, 6.0, 9.4]),
            clock: Mutex::new(None),
            poll_delay: Mutex::new(Duration::ZERO),
            open_attempts: Mutex::new(Vec::new()),
            poll_count: AtomicU32::new(0),
            close_count: AtomicU32::new(0),
        }
    }

    /// Add a port with a working sensor behind it.
    #[must_use]
    pub fn with_port(self, port: &str) -> Self {
        self.insert(port, true);
        self
    }

    /// Add a port that fails to open.
    #[must_use]
    pub fn with_unavailable_port(self, port: &str) -> Self {
        self.insert(port, false);
        self
    }

    /// Ports returned by [`ReadingSource::candidates`].
    #[must_use]
    pub fn with_detected(mut self, ports: &[&str]) -> Self {
        self.detected = ports.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Stamp readings from `start`, advancing by `step` per reading.
    #[must_use]
    pub fn with_clock(self, start: NaiveDateTime, step: TimeDelta) -> Self {
        *lock(&self.clock) = Some(MockClock { next: start, step });
        self
    }

    fn insert(&self, port: &str, reachable: bool) {
        lock(&self.ports).insert(
            port.to_string(),
            MockPort {
                reachable,
                ..MockPort::default()
            },
        );
    }

    /// Plug or unplug the sensor on `port`. Unplugged ports fail to open and
    /// every poll on an already-open handle fails.
    pub fn set_reachable(&self, port: &str, reachable: bool) {
        lock(&self.ports).entry(port.to_string()).or_default().reachable = reachable;
    }

    /// Make every poll on `port` fail (or succeed again).
    pub fn set_failing(&self, port: &str, failing: bool) {
        lock(&self.ports).entry(port.to_string()).or_default().always_fail = failing;
    }

    /// Make the next `count` polls on `port` fail.
    pub fn fail_next_polls(&self, port: &str, count: u32) {
        lock(&self.ports)
            .entry(port.to_string())
            .or_default()
            .remaining_failures = count;
    }

    /// Delay every subsequent poll by `delay`.
    pub fn set_poll_delay(&self, delay: Duration) {
        *lock(&self.poll_delay) = delay;
    }

    /// Concentrations returned by subsequent polls (PM1.0, PM2.5, PM4, PM10).
    pub fn set_values(&self, pm1: f32, pm2_5: f32, pm4: f32, pm10: f32) {
        *lock(&self.values) = [pm1, pm2_5, pm4, pm10];
    }

    /// Every port `open` was called with, in call order.
    pub fn open_attempts(&self) -> Vec<String> {
        lock(&self.open_attempts).clone()
    }

    pub fn clear_open_attempts(&self) {
        lock(&self.open_attempts).clear();
    }

    /// Number of `poll` calls, failed ones included.
    pub fn poll_count(&self) -> u32 {
        self.poll_count.load(Ordering::Relaxed)
    }

    /// Number of `close` calls.
    pub fn close_count(&self) -> u32 {
        self.close_count.load(Ordering::Relaxed)
    }

    fn next_timestamp(&self) -> NaiveDateTime {
        match lock(&self.clock).as_mut() {
            Some(clock) => {
                let now = clock.next;
                clock.next += clock.step;
                now
            }
            None => Local::now().naive_local(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ReadingSource for MockSource {
    type Handle = MockHandle;

    async fn open(&self, port: &str) -> Result<MockHandle> {
        lock(&self.open_attempts).push(port.to_string());

        let reachable = lock(&self.ports).get(port).is_some_and(|p| p.reachable);
        if !reachable {
            return Err(Error::PortUnavailable {
                port: port.to_string(),
                reason: "no mock sensor on this port".to_string(),
            });
        }
        Ok(MockHandle {
            port: port.to_string(),
        })
    }

    async fn poll(&self, handle: &mut MockHandle) -> Result<Reading> {
        self.poll_count.fetch_add(1, Ordering::Relaxed);

        let delay = *lock(&self.poll_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let fail = {
            let mut ports = lock(&self.ports);
            match ports.get_mut(&handle.port) {
                Some(p) if !p.reachable || p.always_fail => true,
                Some(p) if p.remaining_failures > 0 => {
                    p.remaining_failures -= 1;
                    true
                }
                Some(_) => false,
                None => true,
            }
        };
        if fail {
            return Err(DeviceError::Timeout {
                operation: "read_measured_values",
                duration: Duration::from_secs(3),
            }
            .into());
        }

        let [pm1, pm2_5, pm4, pm10] = *lock(&self.values);
        Ok(Reading::new(self.next_timestamp(), pm1, pm2_5, pm4, pm10))
    }

    async fn identify(&self, handle: &mut MockHandle) -> Option<String> {
        Some(format!("MOCK-{}", handle.port))
    }

    async fn close(&self, _handle: MockHandle) {
        self.close_count.fetch_add(1, Ordering::Relaxed);
    }

    fn candidates(&self) -> Vec<String> {
        self.detected.clone()
    }
}
