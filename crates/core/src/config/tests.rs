use std::io::Write;
use std::time::Duration;

use super::types::{ConfigLayer, SchedulerLayer, ServerLayer, StorageKind, StorageLayer};
use crate::error::ConfigError;

const FULL: &str = r#"
[server]
host = "0.0.0.0"
port = 8023

[storage]
backend = "redis"
host = "localhost"
port = 6379

[scheduler]
maximum = 5
"#;

#[test]
fn parse_full_toml() {
    let cfg = ConfigLayer::from_toml(FULL).unwrap().resolve().unwrap();
    assert_eq!(cfg.server.bind_addr(), "0.0.0.0:8023");
    assert!(!cfg.server.reply_acks);
    assert_eq!(
        cfg.storage.kind,
        StorageKind::Redis { host: "localhost".into(), port: 6379 }
    );
    assert_eq!(cfg.scheduler.maximum, 5);
    assert_eq!(cfg.scheduler.tick, Duration::from_secs(1));
    assert_eq!(cfg.scheduler.lease, None);
}

#[test]
fn memory_backend_needs_no_address() {
    let toml = r#"
[server]
host = "127.0.0.1"
port = 9000

[scheduler]
maximum = 2
tick_ms = 250
lease_secs = 600
"#;
    let cfg = ConfigLayer::from_toml(toml).unwrap().resolve().unwrap();
    assert_eq!(cfg.storage.kind, StorageKind::Memory);
    assert_eq!(cfg.scheduler.tick, Duration::from_millis(250));
    assert_eq!(cfg.scheduler.lease, Some(Duration::from_secs(600)));
}

#[test]
fn cli_layer_overrides_file_layer() {
    let file = ConfigLayer::from_toml(FULL).unwrap();
    let cli = ConfigLayer {
        server: ServerLayer { port: Some(9999), ..Default::default() },
        scheduler: SchedulerLayer { maximum: Some(1), ..Default::default() },
        ..Default::default()
    };
    let cfg = cli.merge_over(file).resolve().unwrap();
    assert_eq!(cfg.server.port, 9999);
    assert_eq!(cfg.server.host, "0.0.0.0");
    assert_eq!(cfg.scheduler.maximum, 1);
}

#[test]
fn missing_host_is_fatal() {
    let layer = ConfigLayer {
        server: ServerLayer { port: Some(8023), ..Default::default() },
        scheduler: SchedulerLayer { maximum: Some(1), ..Default::default() },
        ..Default::default()
    };
    let err = layer.resolve().unwrap_err();
    assert!(matches!(err, ConfigError::Missing("server.host")), "got: {err}");
}

#[test]
fn missing_maximum_is_fatal() {
    let toml = "[server]\nhost = \"h\"\nport = 1\n";
    let err = ConfigLayer::from_toml(toml).unwrap().resolve().unwrap_err();
    assert!(err.to_string().contains("scheduler.maximum"));
}

#[test]
fn zero_maximum_is_accepted() {
    let toml = "[server]\nhost = \"h\"\nport = 1\n[scheduler]\nmaximum = 0\n";
    let cfg = ConfigLayer::from_toml(toml).unwrap().resolve().unwrap();
    assert_eq!(cfg.scheduler.maximum, 0);
}

#[test]
fn redis_backend_requires_address() {
    let layer = ConfigLayer {
        server: ServerLayer {
            host: Some("h".into()),
            port: Some(1),
            ..Default::default()
        },
        storage: StorageLayer {
            backend: Some("redis".into()),
            host: Some("localhost".into()),
            port: None,
        },
        scheduler: SchedulerLayer { maximum: Some(3), ..Default::default() },
    };
    let err = layer.resolve().unwrap_err();
    assert!(matches!(err, ConfigError::Missing("storage.port")));
}

#[test]
fn unknown_backend_is_rejected() {
    let toml = "[server]\nhost = \"h\"\nport = 1\n[storage]\nbackend = \"etcd\"\n[scheduler]\nmaximum = 1\n";
    let err = ConfigLayer::from_toml(toml).unwrap().resolve().unwrap_err();
    assert!(err.to_string().contains("etcd"));
}

#[test]
fn non_integer_port_fails_to_parse() {
    let toml = "[server]\nhost = \"h\"\nport = \"eighty\"\n";
    let err = ConfigLayer::from_toml(toml).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn unknown_keys_are_rejected() {
    let err = ConfigLayer::from_toml("[server]\nhots = \"typo\"\n").unwrap_err();
    assert!(err.to_string().contains("hots"));
}

#[test]
fn load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(FULL.as_bytes()).unwrap();

    let layer = ConfigLayer::from_file(file.path()).unwrap();
    assert_eq!(layer.server.port, Some(8023));
    assert_eq!(layer.storage.backend.as_deref(), Some("redis"));
}

#[test]
fn optional_file_missing_yields_empty_layer() {
    let tmp = tempfile::tempdir().unwrap();
    let layer = ConfigLayer::from_optional_file(tmp.path().join("absent.toml")).unwrap();
    assert_eq!(layer, ConfigLayer::default());
}
