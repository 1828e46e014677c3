//! Sampler and collector behaviour against the mock source.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use tempfile::TempDir;
use tokio::sync::mpsc;

use sps30_core::{MockSource, PortResolver};
use sps30_service::{Collector, Command, Sampler, SamplerEvent, SamplerState};
use sps30_store::{CsvLogger, HistoryStore};
use sps30_types::TimeWindow;

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap()
}

struct Harness {
    _dir: TempDir,
    log_dir: std::path::PathBuf,
    source: Arc<MockSource>,
    history: Arc<HistoryStore>,
    sampler: Sampler<MockSource>,
}

fn harness(source: MockSource, scan_range: &[&str]) -> Harness {
    let dir = TempDir::new().unwrap();
    let log_dir = dir.path().join("logs");
    let source = Arc::new(source.with_clock(start(), TimeDelta::seconds(5)));
    let history = Arc::new(HistoryStore::new());
    let resolver = PortResolver::new(None, scan_range.iter().map(|p| p.to_string()).collect());
    let sampler = Sampler::new(
        Arc::clone(&source),
        resolver,
        CsvLogger::new(&log_dir).unwrap(),
        Arc::clone(&history),
    );
    Harness {
        _dir: dir,
        log_dir,
        source,
        history,
        sampler,
    }
}

fn readings(events: &[SamplerEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, SamplerEvent::Reading(_)))
        .count()
}

#[tokio::test]
async fn test_first_tick_resolves_and_logs() {
    let mut h = harness(MockSource::new().with_port("COM5"), &["COM5"]);
    h.source.set_values(3.2, 5.1, 6.0, 9.4);

    let events = h.sampler.tick().await;

    assert_eq!(
        events[0],
        SamplerEvent::Connected {
            port: "COM5".to_string()
        }
    );
    assert_eq!(readings(&events), 1);
    assert_eq!(h.sampler.state(), SamplerState::Running);
    assert_eq!(h.sampler.current_port(), Some("COM5"));

    let content = fs::read_to_string(h.log_dir.join("sps30_2024-01-01.csv")).unwrap();
    assert_eq!(
        content,
        "timestamp,pm1,pm2_5,pm4,pm10\n2024-01-01T10:00:00,3.200,5.100,6.000,9.400\n"
    );
    assert_eq!(h.history.len(), 1);
}

#[tokio::test]
async fn test_running_ticks_append_in_order() {
    let mut h = harness(MockSource::new().with_port("COM5"), &["COM5"]);

    for _ in 0..4 {
        h.sampler.tick().await;
    }

    let content = fs::read_to_string(h.log_dir.join("sps30_2024-01-01.csv")).unwrap();
    let stamps: Vec<&str> = content
        .lines()
        .skip(1)
        .map(|l| l.split(',').next().unwrap())
        .collect();
    assert_eq!(
        stamps,
        [
            "2024-01-01T10:00:00",
            "2024-01-01T10:00:05",
            "2024-01-01T10:00:10",
            "2024-01-01T10:00:15"
        ]
    );
    assert_eq!(h.history.query_at(TimeWindow::All, start()).len(), 4);
}

#[tokio::test]
async fn test_threshold_failures_trigger_reacquire() {
    let mut h = harness(MockSource::new().with_port("COM5"), &["COM5"]);
    h.sampler.tick().await;
    h.source.set_failing("COM5", true);

    let first = h.sampler.tick().await;
    let second = h.sampler.tick().await;
    assert!(matches!(first[0], SamplerEvent::PollFailed { consecutive: 1, .. }));
    assert!(matches!(second[0], SamplerEvent::PollFailed { consecutive: 2, .. }));
    assert_eq!(h.sampler.state(), SamplerState::Running);

    let third = h.sampler.tick().await;
    assert!(matches!(third[0], SamplerEvent::PollFailed { consecutive: 3, .. }));
    assert_eq!(
        third[1],
        SamplerEvent::Reacquiring {
            port: Some("COM5".to_string())
        }
    );
    assert_eq!(h.sampler.state(), SamplerState::Reacquiring);
    assert_eq!(h.sampler.current_port(), None);
    assert_eq!(h.source.close_count(), 1);
}

#[tokio::test]
async fn test_reacquiring_resolves_every_tick_until_success() {
    let mut h = harness(MockSource::new().with_port("COM5"), &["COM5"]);
    h.sampler.tick().await;
    h.source.set_reachable("COM5", false);
    for _ in 0..3 {
        h.sampler.tick().await;
    }
    assert_eq!(h.sampler.state(), SamplerState::Reacquiring);
    h.source.clear_open_attempts();

    for _ in 0..3 {
        let events = h.sampler.tick().await;
        assert_eq!(
            events,
            [SamplerEvent::NoPortFound {
                tried: vec!["COM5".to_string()]
            }]
        );
    }
    assert_eq!(h.source.open_attempts().len(), 3);

    h.source.set_reachable("COM5", true);
    let events = h.sampler.tick().await;
    assert!(matches!(events[0], SamplerEvent::Connected { .. }));
    assert_eq!(readings(&events), 1);
    assert_eq!(h.sampler.state(), SamplerState::Running);
    assert_eq!(h.sampler.consecutive_failures(), 0);
}

#[tokio::test]
async fn test_success_resets_failure_counter() {
    let mut h = harness(MockSource::new().with_port("COM5"), &["COM5"]);
    h.sampler.tick().await;

    h.source.fail_next_polls("COM5", 2);
    h.sampler.tick().await;
    h.sampler.tick().await;
    assert_eq!(h.sampler.consecutive_failures(), 2);

    let events = h.sampler.tick().await;
    assert_eq!(readings(&events), 1);
    assert_eq!(h.sampler.consecutive_failures(), 0);
    assert_eq!(h.sampler.state(), SamplerState::Running);
}

#[tokio::test]
async fn test_pause_stops_emission_and_resume_does_not_replay() {
    let mut h = harness(MockSource::new().with_port("COM5"), &["COM5"]);
    h.sampler.tick().await;

    assert_eq!(h.sampler.pause(), Some(SamplerEvent::Paused));
    assert_eq!(h.sampler.pause(), None);
    let polls = h.source.poll_count();
    for _ in 0..5 {
        assert!(h.sampler.tick().await.is_empty());
    }
    assert_eq!(h.source.poll_count(), polls);
    assert_eq!(h.sampler.state(), SamplerState::Paused);

    assert_eq!(h.sampler.resume(), Some(SamplerEvent::Resumed));
    let events = h.sampler.tick().await;
    assert_eq!(readings(&events), 1);
    assert_eq!(h.history.len(), 2);
}

#[tokio::test]
async fn test_pause_while_reacquiring_resumes_reacquiring() {
    let mut h = harness(MockSource::new(), &["COM5"]);
    h.sampler.tick().await;
    assert_eq!(h.sampler.state(), SamplerState::Reacquiring);

    h.sampler.pause();
    let attempts = h.source.open_attempts().len();
    h.sampler.tick().await;
    assert_eq!(h.source.open_attempts().len(), attempts);

    h.sampler.resume();
    assert_eq!(h.sampler.state(), SamplerState::Reacquiring);
}

#[tokio::test]
async fn test_log_write_failure_drops_reading() {
    let mut h = harness(MockSource::new().with_port("COM5"), &["COM5"]);
    // Replace the log directory with a file so appends fail.
    fs::remove_dir_all(&h.log_dir).unwrap();
    fs::write(&h.log_dir, b"").unwrap();

    let events = h.sampler.tick().await;

    assert!(matches!(events[0], SamplerEvent::Connected { .. }));
    assert!(matches!(events[1], SamplerEvent::LogWriteFailed { .. }));
    assert_eq!(readings(&events), 0);
    assert!(h.history.is_empty());

    // Sampling continues.
    assert_eq!(h.sampler.state(), SamplerState::Running);
    let events = h.sampler.tick().await;
    assert!(matches!(events[0], SamplerEvent::LogWriteFailed { .. }));
}

#[tokio::test]
async fn test_connection_test_reports_and_reconnects() {
    let mut h = harness(
        MockSource::new()
            .with_unavailable_port("COM3")
            .with_port("COM5"),
        &["COM3", "COM5"],
    );
    h.sampler.tick().await;
    assert_eq!(h.sampler.current_port(), Some("COM5"));

    let events = h.sampler.connection_test().await;

    assert_eq!(
        events[0],
        SamplerEvent::Reacquiring {
            port: Some("COM5".to_string())
        }
    );
    let SamplerEvent::Diagnostics(report) = &events[1] else {
        panic!("expected diagnostics, got {:?}", events[1]);
    };
    assert_eq!(report.ports.len(), 2);
    assert_eq!(report.working().count(), 1);
    assert_eq!(h.sampler.state(), SamplerState::Reacquiring);

    let events = h.sampler.tick().await;
    assert!(matches!(events[0], SamplerEvent::Connected { .. }));
}

#[tokio::test]
async fn test_custom_failure_threshold() {
    let h = harness(MockSource::new().with_port("COM5"), &["COM5"]);
    let mut sampler = h.sampler.with_failure_threshold(1);
    sampler.tick().await;
    h.source.set_failing("COM5", true);

    let events = sampler.tick().await;
    assert_eq!(events.len(), 2);
    assert_eq!(sampler.state(), SamplerState::Reacquiring);
}

#[tokio::test(start_paused = true)]
async fn test_collector_ticks_and_handles_commands() {
    let h = harness(MockSource::new().with_port("COM5"), &["COM5"]);
    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let (event_tx, mut event_rx) = mpsc::channel(64);
    let collector = Collector::new(h.sampler, Duration::from_secs(5), cmd_rx, event_tx);
    let task = tokio::spawn(collector.run());

    let mut seen = 0;
    while seen < 3 {
        if let Some(SamplerEvent::Reading(_)) = event_rx.recv().await {
            seen += 1;
        }
    }

    cmd_tx.send(Command::Pause).await.unwrap();
    assert_eq!(event_rx.recv().await, Some(SamplerEvent::Paused));

    cmd_tx.send(Command::Shutdown).await.unwrap();
    let sampler = task.await.unwrap();

    assert_eq!(sampler.state(), SamplerState::Paused);
    assert_eq!(sampler.current_port(), None);
    assert_eq!(h.source.close_count(), 1);
    assert_eq!(h.history.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_collector_stops_when_commands_dropped() {
    let h = harness(MockSource::new(), &["COM5"]);
    let (cmd_tx, cmd_rx) = mpsc::channel(1);
    let (event_tx, mut event_rx) = mpsc::channel(8);
    let collector = Collector::new(h.sampler, Duration::from_secs(1), cmd_rx, event_tx);
    let task = tokio::spawn(collector.run());

    assert!(matches!(
        event_rx.recv().await,
        Some(SamplerEvent::NoPortFound { .. })
    ));
    drop(cmd_tx);

    let sampler = task.await.unwrap();
    assert_eq!(sampler.state(), SamplerState::Reacquiring);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_abandons_slow_tick() {
    let h = harness(MockSource::new().with_port("COM5"), &["COM5"]);
    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let (event_tx, mut event_rx) = mpsc::channel(64);
    let collector = Collector::new(h.sampler, Duration::from_secs(5), cmd_rx, event_tx);
    let task = tokio::spawn(collector.run());

    while !matches!(event_rx.recv().await, Some(SamplerEvent::Reading(_))) {}
    let recorded = h.history.len();

    // The next tick at 5s hangs in a poll for an hour.
    h.source.set_poll_delay(Duration::from_secs(3600));
    tokio::time::sleep(Duration::from_secs(6)).await;

    let requested = tokio::time::Instant::now();
    cmd_tx.send(Command::Shutdown).await.unwrap();
    let sampler = task.await.unwrap();

    assert!(requested.elapsed() < Duration::from_secs(60));
    assert_eq!(sampler.current_port(), None);
    assert_eq!(h.source.close_count(), 1);
    assert_eq!(h.history.len(), recorded);
}

#[tokio::test(start_paused = true)]
async fn test_command_during_tick_applies_after_it() {
    let h = harness(MockSource::new().with_port("COM5"), &["COM5"]);
    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let (event_tx, mut event_rx) = mpsc::channel(64);
    let collector = Collector::new(h.sampler, Duration::from_secs(5), cmd_rx, event_tx);
    let task = tokio::spawn(collector.run());

    while !matches!(event_rx.recv().await, Some(SamplerEvent::Reading(_))) {}

    h.source.set_poll_delay(Duration::from_secs(10));
    tokio::time::sleep(Duration::from_secs(6)).await;
    cmd_tx.send(Command::Pause).await.unwrap();

    assert!(matches!(
        event_rx.recv().await,
        Some(SamplerEvent::Reading(_))
    ));
    assert_eq!(event_rx.recv().await, Some(SamplerEvent::Paused));

    cmd_tx.send(Command::Shutdown).await.unwrap();
    let sampler = task.await.unwrap();
    assert_eq!(sampler.state(), SamplerState::Paused);
}
