use iaq_link::{MeshLocalPrefix, SensorKind, SensorStatus};
use iaq_linkd::config::{ConfigError, LinkdConfig};
use std::fs;
use tempfile::NamedTempFile;

fn kinds(cfg: &LinkdConfig) -> Vec<SensorKind> {
    cfg.sensors.iter().map(|sensor| sensor.kind).collect()
}

#[test]
fn empty_config_uses_defaults() {
    let cfg = LinkdConfig::from_toml("").expect("parse");
    assert_eq!(cfg, LinkdConfig::default());
    assert_eq!(cfg.delivery.resource_path, "storedata");
    assert_eq!(cfg.delivery.max_retries, 5);
    assert_eq!(cfg.delivery.port, 5683);
    assert!(cfg.delivery.confirmable);
    assert_eq!(cfg.node.sample_interval_secs, 30);
    assert_eq!(
        cfg.node.mesh_prefix().expect("prefix"),
        MeshLocalPrefix([0xfd, 0xde, 0xad, 0x00, 0xbe, 0xef, 0, 0])
    );
    assert_eq!(kinds(&cfg), SensorKind::ALL);
}

#[test]
fn parses_full_config() {
    let input = r#"
[delivery]
max_retries = 3
confirmable = false

[handler]
resource_path = "storedata"

[node]
sample_interval_secs = 10
mesh_prefix = "fd11:2233:4455:6677"
message_pool = 2

[[sensors]]
kind = "scd41"

[[sensors]]
kind = "sps30"
status = "not_ready"

[[sensors]]
kind = "ccs811"
fail_every = 4
"#;
    let cfg = LinkdConfig::from_toml(input).expect("parse");
    assert_eq!(cfg.delivery.max_retries, 3);
    assert!(!cfg.delivery.confirmable);
    assert_eq!(cfg.node.message_pool, 2);
    assert_eq!(
        cfg.node.mesh_prefix().expect("prefix"),
        MeshLocalPrefix([0xfd, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77])
    );
    assert_eq!(kinds(&cfg), [SensorKind::Scd41, SensorKind::Sps30, SensorKind::Ccs811]);
    assert_eq!(cfg.sensors[0].status, SensorStatus::Ready);
    assert_eq!(cfg.sensors[1].status, SensorStatus::NotReady);
    assert_eq!(cfg.sensors[2].fail_every, Some(4));
}

#[test]
fn rejects_retry_budget_above_ceiling() {
    let err = LinkdConfig::from_toml("[delivery]\nmax_retries = 6\n").expect_err("too many");
    assert!(matches!(err, ConfigError::Delivery(iaq_link::ConfigError::RetryCeiling { .. })));
}

#[test]
fn rejects_bad_node_settings() {
    let bad_prefix = LinkdConfig::from_toml("[node]\nmesh_prefix = \"not-a-prefix\"\n");
    assert!(matches!(bad_prefix, Err(ConfigError::MeshPrefix(_))));

    let empty_pool = LinkdConfig::from_toml("[node]\nmessage_pool = 0\n");
    assert!(matches!(empty_pool, Err(ConfigError::EmptyMessagePool)));

    let duplicate = LinkdConfig::from_toml(
        "[[sensors]]\nkind = \"scd41\"\n\n[[sensors]]\nkind = \"scd41\"\n",
    );
    assert!(matches!(duplicate, Err(ConfigError::DuplicateSensor(SensorKind::Scd41))));

    let unknown_kind = LinkdConfig::from_toml("[[sensors]]\nkind = \"bme680\"\n");
    assert!(matches!(unknown_kind, Err(ConfigError::Toml(_))));
}

#[test]
fn loads_config_from_file() {
    let file = NamedTempFile::new().expect("temp file");
    fs::write(file.path(), "[node]\nsample_interval_secs = 5\n").expect("write");

    let cfg = LinkdConfig::from_path(file.path()).expect("load");
    assert_eq!(cfg.node.sample_interval_secs, 5);
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = LinkdConfig::from_path(dir.path().join("absent.toml")).expect_err("missing");
    assert!(matches!(err, ConfigError::Io(_)));
}
