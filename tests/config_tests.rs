// SPDX-License-Identifier: MPL-2.0

//! Integration tests for configuration module

use fimc::config::MAX_OUTPUT_SLOTS;
use fimc::{Config, FimcError};
use std::time::Duration;

fn scratch_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir()
        .join(format!("fimc-config-{}-{}", std::process::id(), name))
        .join("config.json")
}

#[test]
fn test_config_default() {
    // Defaults reproduce the S3C64xx variant
    let config = Config::default();

    assert_eq!(config.output_slots, 4);
    assert_eq!(config.shutdown_timeout(), Duration::from_millis(100));
    assert_eq!(config.variant.min_inp_pixsize, 16);
    assert_eq!(config.variant.pix_limit.scaler_dis_w, 4096);
    assert_eq!(config.variant.pix_limit.out_rot_dis_w, 2048);
    assert!(config.has_camera(), "One sensor should be attached by default");
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_rejects_bad_slot_counts() {
    let mut config = Config::default();
    config.output_slots = 0;
    assert!(matches!(config.validate(), Err(FimcError::Config(_))));

    config.output_slots = MAX_OUTPUT_SLOTS + 1;
    assert!(matches!(config.validate(), Err(FimcError::Config(_))));

    config.output_slots = MAX_OUTPUT_SLOTS;
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_rejects_zero_timeout() {
    let config = Config {
        shutdown_timeout_ms: 0,
        ..Config::default()
    };
    assert!(matches!(config.validate(), Err(FimcError::Config(_))));
}

#[test]
fn test_config_partial_json_uses_defaults() {
    // Missing fields fall back to their defaults
    let config: Config = serde_json::from_str(r#"{"device_id": 1, "sensors": 0}"#).unwrap();
    assert_eq!(config.device_id, 1);
    assert!(!config.has_camera());
    assert_eq!(config.output_slots, Config::default().output_slots);
}

#[test]
fn test_config_save_and_load() {
    let path = scratch_path("roundtrip");
    let config = Config {
        output_slots: 8,
        shutdown_timeout_ms: 250,
        ..Config::default()
    };
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded, config);

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn test_config_load_invalid_file() {
    let path = scratch_path("invalid");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, r#"{"output_slots": 0}"#).unwrap();

    assert!(matches!(Config::load(&path), Err(FimcError::Config(_))));

    std::fs::write(&path, "not json").unwrap();
    assert!(Config::load(&path).is_err());

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn test_config_load_missing_file() {
    let path = scratch_path("missing");
    assert!(matches!(Config::load(&path), Err(FimcError::Io(_))));
}
