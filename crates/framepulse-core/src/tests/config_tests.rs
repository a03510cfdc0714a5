use super::*;

#[test]
fn empty_document_yields_defaults() {
    let cfg = SchedulerConfig::from_toml_str("").expect("empty config parses");
    assert_eq!(cfg.target_fps, 60.0);
    assert_eq!(cfg.history_len, 60);
    assert_eq!(cfg.slow_threshold_ms, 10.0);
    assert!(!cfg.log_fps);
    assert!(cfg.callbacks.is_empty());
}

#[test]
fn callbacks_table_parses_with_defaults() {
    let cfg = SchedulerConfig::from_toml_str(
        r#"
        target_fps = 30
        degraded_fps = 25.5

        [[callbacks]]
        name = "audio-level"
        priority = "critical"

        [[callbacks]]
        name = "ambient"
        enabled = false
        settings = { density = 4 }
        "#,
    )
    .expect("config parses");

    assert_eq!(cfg.target_fps, 30.0);
    assert_eq!(cfg.degraded_fps, 25.5);
    assert_eq!(cfg.callbacks.len(), 2);
    assert_eq!(cfg.callbacks[0].priority, Priority::Critical);
    assert!(cfg.callbacks[0].enabled);
    assert!(cfg.callbacks[0].settings.as_table().is_some_and(|t| t.is_empty()));
    assert_eq!(cfg.callbacks[1].priority, Priority::Medium);
    assert!(!cfg.callbacks[1].enabled);
    assert_eq!(
        cfg.callbacks[1].settings.get("density").and_then(|v| v.as_integer()),
        Some(4)
    );
}

#[test]
fn unknown_priority_is_rejected() {
    let err = SchedulerConfig::from_toml_str(
        r#"
        [[callbacks]]
        name = "x"
        priority = "urgent"
        "#,
    );
    assert!(err.is_err());
}

#[test]
fn missing_file_reports_path() {
    let err = SchedulerConfig::load_toml("/definitely/not/here.toml").unwrap_err();
    assert!(matches!(err, SchedulerError::ConfigIo { .. }));
    assert!(err.to_string().contains("here.toml"));
}
