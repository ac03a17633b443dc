//! Configuration file loading and write-back

use std::io::Write;

use metersrv::{ConfigManager, DeviceKind, MeterSrvError};
use tempfile::{Builder, TempDir};

fn write_config(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_yaml() {
    let file = write_config(
        ".yaml",
        "device:\n  kind: 1\n  port: /dev/ttyUSB2\n  name: Bench supply\n",
    );

    let manager = ConfigManager::from_file(file.path()).unwrap();
    let device = &manager.config().device;
    assert_eq!(device.kind, DeviceKind::Mason);
    assert_eq!(device.port, "/dev/ttyUSB2");
    assert_eq!(device.name, "Bench supply");
    assert_eq!(manager.source(), Some(file.path()));
    assert!(manager.config().validate().is_ok());
}

#[test]
fn test_load_toml() {
    let file = write_config(
        ".toml",
        "[device]\nkind = 0\nport = \"COM5\"\n\n[logging]\nlevel = \"debug\"\njson = true\n",
    );

    let config = ConfigManager::from_file(file.path()).unwrap().into_config();
    assert_eq!(config.device.kind, DeviceKind::Holdpeak);
    assert_eq!(config.device.port, "COM5");
    assert_eq!(config.device.name, "Power");
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json);
}

#[test]
fn test_load_json() {
    let file = write_config(".json", r#"{"device": {"kind": 1, "port": "/dev/ttyACM1"}}"#);

    let config = ConfigManager::from_file(file.path()).unwrap().into_config();
    assert_eq!(config.device.kind, DeviceKind::Mason);
    assert_eq!(config.device.port, "/dev/ttyACM1");
}

#[test]
fn test_unsupported_extension() {
    let file = write_config(".ini", "[device]\n");
    let result = ConfigManager::from_file(file.path());
    assert!(matches!(result, Err(MeterSrvError::ConfigError(_))));
}

#[test]
fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    let result = ConfigManager::from_file(dir.path().join("absent.yaml"));
    assert!(matches!(result, Err(MeterSrvError::ConfigError(_))));
}

#[test]
fn test_empty_port_fails_validation() {
    let file = write_config(".yaml", "device:\n  kind: 0\n");
    let manager = ConfigManager::from_file(file.path()).unwrap();
    assert!(manager.config().validate().is_err());
}

#[test]
fn test_save_and_reload() {
    let dir = TempDir::new().unwrap();
    let source = write_config(".yml", "device:\n  kind: 1\n  port: /dev/ttyUSB0\n");

    let mut manager = ConfigManager::from_file(source.path()).unwrap();
    manager.config_mut().device.name = "Lab PSU".to_string();

    let target = dir.path().join("nested").join("metersrv.yaml");
    manager.save(&target).unwrap();

    let saved = std::fs::read_to_string(&target).unwrap();
    // Device kind is persisted as its integer tag
    assert!(saved.contains("kind: 1"), "{saved}");

    let reloaded = ConfigManager::from_file(&target).unwrap();
    assert_eq!(reloaded.config(), manager.config());
}

#[test]
fn test_clear_then_save() {
    let dir = TempDir::new().unwrap();
    let source = write_config(".yaml", "device:\n  kind: 1\n  port: COM9\n  name: PSU\n");

    let mut manager = ConfigManager::from_file(source.path()).unwrap();
    manager.config_mut().device.clear();

    let target = dir.path().join("cleared.yaml");
    manager.save(&target).unwrap();

    let reloaded = ConfigManager::from_file(&target).unwrap().into_config();
    assert_eq!(reloaded.device.kind, DeviceKind::Holdpeak);
    assert!(reloaded.device.port.is_empty());
    assert_eq!(reloaded.device.name, "Power");
}
