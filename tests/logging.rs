use pointdash::logging;

#[test]
fn logging_initialization_is_idempotent() {
    logging::init_logging().expect("first initialization succeeds");
    logging::init_logging().expect("subsequent initialization succeeds");
}

#[test]
fn log_event_without_subscriber_does_not_panic() {
    logging::log_event(
        file!(),
        "LoggingTest",
        "log_event_without_subscriber_does_not_panic",
        "tests.logging",
        line!(),
        "structured event",
        Some("sample failure"),
        "none",
        "GET",
    );
}

#[test]
fn record_splits_section_and_tracks_severity() -> anyhow::Result<()> {
    let failed = logging::LogEvent::new(
        "src/dataset.rs",
        "Dataset",
        "load",
        "dataset.load",
        42,
        "Failed to load prices.csv",
        Some("no such file"),
        "none",
        "GET",
    );
    assert_eq!(failed.severity, logging::Severity::Error);
    assert_eq!(failed.component, "dataset");
    assert_eq!(failed.stage, Some("load"));

    let record = serde_json::to_value(&failed)?;
    assert_eq!(record["severity"], "error");
    assert_eq!(record["source"], "Dataset");
    assert_eq!(record["error"], "no such file");

    let plain = logging::LogEvent::new(
        "src/server.rs", "Router", "serve", "server", 7, "listening", None, "none", "GET",
    );
    assert_eq!(plain.severity, logging::Severity::Info);
    assert_eq!(plain.stage, None);
    assert!(serde_json::to_value(&plain)?.get("error").is_none());

    Ok(())
}
