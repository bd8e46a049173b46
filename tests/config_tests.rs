// Config loading and validation tests

use std::time::Duration;

use vitals_dashboard::config::AppConfig;

const VALID_CONFIG: &str = r#"
[server]
port = 8081
host = "0.0.0.0"

[database]
path = "data/vitals.db"
max_pool_size = 4
busy_timeout_ms = 2500

[polling]
tick_interval_ms = 250
fetch_timeout_ms = 1000
max_duration_secs = 600
max_consecutive_failures = 2

[session]
history_seed_limit = 50
live_channel_capacity = 32

[accounts]
admin_usernames = ["admin"]
"#;

const MINIMAL_CONFIG: &str = r#"
[server]
port = 8080
host = "127.0.0.1"

[database]
path = "data/vitals.db"
max_pool_size = 2
"#;

#[test]
fn test_config_loads_from_str() {
    let config = AppConfig::load_from_str(VALID_CONFIG).expect("load_from_str");
    assert_eq!(config.server.port, 8081);
    assert_eq!(config.database.max_pool_size, 4);
    assert_eq!(config.busy_timeout(), Duration::from_millis(2500));
    assert_eq!(config.polling.tick_interval_ms, 250);
    assert_eq!(config.session.history_seed_limit, 50);
    assert_eq!(config.accounts.admin_usernames, vec!["admin".to_string()]);
}

#[test]
fn test_optional_sections_use_defaults() {
    let config = AppConfig::load_from_str(MINIMAL_CONFIG).unwrap();
    assert_eq!(config.database.busy_timeout_ms, 5000);
    assert_eq!(config.polling.tick_interval_ms, 500);
    assert_eq!(config.polling.fetch_timeout_ms, 2000);
    assert_eq!(config.polling.max_duration_secs, 3600);
    assert_eq!(config.polling.max_consecutive_failures, 0);
    assert_eq!(config.session.history_seed_limit, 100);
    assert_eq!(config.session.live_channel_capacity, 256);
    assert!(config.accounts.admin_usernames.is_empty());
}

#[test]
fn test_session_manager_config_conversion() {
    let config = AppConfig::load_from_str(VALID_CONFIG).unwrap();
    let m = config.session_manager_config();
    assert_eq!(m.tick_interval, Duration::from_millis(250));
    assert_eq!(m.fetch_timeout, Duration::from_secs(1));
    assert_eq!(m.max_duration_secs, 600);
    assert_eq!(m.retry.max_consecutive_failures, 2);
    assert_eq!(m.live_channel_capacity, 32);
}

#[test]
fn test_config_validation_rejects_invalid_port() {
    let bad = VALID_CONFIG.replace("port = 8081", "port = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("server.port"));
}

#[test]
fn test_config_validation_rejects_zero_tick() {
    let bad = VALID_CONFIG.replace("tick_interval_ms = 250", "tick_interval_ms = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("polling.tick_interval_ms"));
}

#[test]
fn test_config_validation_rejects_empty_db_path() {
    let bad = VALID_CONFIG.replace("path = \"data/vitals.db\"", "path = \"\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("database.path"));
}

#[test]
fn test_config_missing_server_section_fails() {
    assert!(AppConfig::load_from_str("[database]\npath = \"x\"\nmax_pool_size = 1\n").is_err());
}
