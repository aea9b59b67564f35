//! Loading dispatcher configuration from disk

use go2_dispatch::DispatcherConfig;
use go2_dispatch::control::error::ConfigError;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn load_config_from_json_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("dispatch.json");
    fs::write(
        &path,
        r#"{"session_id": 4, "resend_interval_ms": 80, "max_attempts": 5}"#,
    )
    .unwrap();

    let config = DispatcherConfig::load(&path).unwrap();
    assert_eq!(config.session_id, 4);
    assert_eq!(config.resend_interval(), Duration::from_millis(80));
    assert_eq!(config.max_attempts, 5);
    assert_eq!(config.initial_backoff_ms, DispatcherConfig::default().initial_backoff_ms);
}

#[test]
fn load_rejects_out_of_range_values() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("dispatch.json");
    fs::write(&path, r#"{"resend_interval_ms": 250}"#).unwrap();

    assert!(matches!(
        DispatcherConfig::load(&path),
        Err(ConfigError::Invalid(_))
    ));
}

#[test]
fn load_reports_missing_and_malformed_files() {
    let temp = TempDir::new().unwrap();
    assert!(matches!(
        DispatcherConfig::load(&temp.path().join("absent.json")),
        Err(ConfigError::Io(_))
    ));

    let path = temp.path().join("broken.json");
    fs::write(&path, "{ not json").unwrap();
    assert!(matches!(
        DispatcherConfig::load(&path),
        Err(ConfigError::Json(_))
    ));
}
