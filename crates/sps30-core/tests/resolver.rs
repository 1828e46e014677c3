//! Port resolution against the mock source.

use chrono::{NaiveDate, TimeDelta};

use sps30_core::{Error, MockSource, PortResolver, ReadingSource};

fn range(ports: &[&str]) -> Vec<String> {
    ports.iter().map(|p| p.to_string()).collect()
}

#[tokio::test]
async fn test_scan_returns_first_working_port() {
    let source = MockSource::new()
        .with_unavailable_port("COM3")
        .with_unavailable_port("COM4")
        .with_port("COM5")
        .with_port("COM6");
    let resolver = PortResolver::new(None, range(&["COM3", "COM4", "COM5", "COM6"]));

    let conn = resolver.resolve(&source).await.unwrap();

    assert_eq!(conn.port, "COM5");
    assert_eq!(source.open_attempts(), ["COM3", "COM4", "COM5"]);
}

#[tokio::test]
async fn test_scan_order_is_ascending() {
    let source = MockSource::new().with_port("COM3").with_port("COM10");
    let resolver = PortResolver::new(None, range(&["COM10", "COM3"]));

    let conn = resolver.resolve(&source).await.unwrap();
    assert_eq!(conn.port, "COM3");
}

#[tokio::test]
async fn test_fixed_port_is_authoritative() {
    let source = MockSource::new().with_port("COM5");
    let resolver = PortResolver::new(Some("COM9".to_string()), range(&["COM5"]));

    let err = resolver.resolve(&source).await.unwrap_err();

    match err {
        Error::NoPortFound { tried } => assert_eq!(tried, ["COM9"]),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(source.open_attempts(), ["COM9"]);
}

#[tokio::test]
async fn test_blank_fixed_port_means_scan() {
    let source = MockSource::new().with_port("COM4");
    let resolver = PortResolver::new(Some("  ".to_string()), range(&["COM4"]));

    assert_eq!(resolver.resolve(&source).await.unwrap().port, "COM4");
}

#[tokio::test]
async fn test_no_port_found_lists_every_candidate() {
    let source = MockSource::new();
    let resolver = PortResolver::new(None, range(&["COM4", "COM3"]));

    match resolver.resolve(&source).await {
        Err(Error::NoPortFound { tried }) => assert_eq!(tried, ["COM3", "COM4"]),
        other => panic!("expected NoPortFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_candidate_failing_trial_read_is_closed() {
    let source = MockSource::new().with_port("COM3").with_port("COM4");
    source.set_failing("COM3", true);
    let resolver = PortResolver::new(None, range(&["COM3", "COM4"]));

    let conn = resolver.resolve(&source).await.unwrap();

    assert_eq!(conn.port, "COM4");
    assert_eq!(source.close_count(), 1);
}

#[tokio::test]
async fn test_empty_scan_range_uses_detected_ports() {
    let source = MockSource::new()
        .with_detected(&["COM12", "COM7"])
        .with_port("COM12");
    let resolver = PortResolver::new(None, Vec::new());

    assert_eq!(resolver.candidates(&source), ["COM7", "COM12"]);
    assert_eq!(resolver.resolve(&source).await.unwrap().port, "COM12");
}

#[tokio::test]
async fn test_trial_reading_uses_source_clock() {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap();
    let source = MockSource::new()
        .with_port("COM5")
        .with_clock(start, TimeDelta::seconds(5));
    let resolver = PortResolver::new(Some("COM5".to_string()), Vec::new());

    let mut conn = resolver.resolve(&source).await.unwrap();
    assert_eq!(conn.trial.timestamp, start);

    let next = source.poll(&mut conn.handle).await.unwrap();
    assert_eq!(next.timestamp, start + TimeDelta::seconds(5));
}

#[tokio::test]
async fn test_probe_reports_every_port_and_closes_handles() {
    let source = MockSource::new()
        .with_unavailable_port("COM3")
        .with_port("COM4")
        .with_port("COM5");
    source.set_failing("COM5", true);
    let resolver = PortResolver::new(None, range(&["COM3", "COM4", "COM5"]));

    let report = resolver.probe(&source).await;

    assert_eq!(report.ports.len(), 3);
    assert!(report.ports[0].outcome.is_err());
    assert!(report.ports[1].outcome.is_ok());
    assert_eq!(report.ports[1].device.as_deref(), Some("MOCK-COM4"));
    assert!(report.ports[2].outcome.is_err());
    assert_eq!(report.working().count(), 1);
    assert_eq!(source.close_count(), 2);

    let text = report.to_string();
    assert!(text.contains("COM4: OK (PM2.5 5.1"));
    assert!(text.contains("COM3: Port COM3 unavailable"));
}

#[tokio::test]
async fn test_unplugged_port_fails_polls() {
    let source = MockSource::new().with_port("COM5");
    let mut handle = source.open("COM5").await.unwrap();
    assert!(source.poll(&mut handle).await.is_ok());

    source.set_reachable("COM5", false);
    assert!(matches!(
        source.poll(&mut handle).await,
        Err(Error::Device(_))
    ));
    assert!(source.open("COM5").await.is_err());
}
