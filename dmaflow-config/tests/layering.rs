// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Check the priority order of the configuration sources.

use std::io::Write;
use std::path::PathBuf;

use dmaflow_config::{Config, ConfigError, FillMode, SinkKind};
use serial_test::serial;

fn write_conf_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn set_env(name: &str, value: &str) {
    // SAFETY: tests touching the environment are run serially.
    unsafe { std::env::set_var(name, value) };
}

fn remove_env(name: &str) {
    // SAFETY: tests touching the environment are run serially.
    unsafe { std::env::remove_var(name) };
}

#[test]
#[serial]
fn defaults_without_sources() {
    let config = Config::load(&Config::empty()).unwrap();
    let expected = Config::default();
    assert_eq!(config, expected);
}

#[test]
#[serial]
fn conf_file_overrides_defaults() {
    let conf_file = write_conf_file(
        r#"
slot_count = 4
fill_mode = "immediate"
s2mm_buffer_offset = 0x0f000000
"#,
    );
    let cli = Config {
        conf_file: Some(conf_file.path().to_path_buf()),
        ..Config::empty()
    };

    let config = Config::load(&cli).unwrap();
    assert_eq!(config.slot_count, Some(4));
    assert_eq!(config.fill_mode, Some(FillMode::Immediate));
    assert_eq!(config.s2mm_buffer_offset, Some(0x0f00_0000));
    assert_eq!(config.port, Some(5001));
}

#[test]
#[serial]
fn env_overrides_conf_file_and_cli_overrides_env() {
    let conf_file = write_conf_file("slot_count = 4\nport = 6000\nsink = \"network\"\n");
    set_env("DMAFLOW_SLOT_COUNT", "6");
    set_env("DMAFLOW_PORT", "7000");

    let cli = Config {
        conf_file: Some(conf_file.path().to_path_buf()),
        port: Some(8000),
        ..Config::empty()
    };
    let config = Config::load(&cli);

    remove_env("DMAFLOW_SLOT_COUNT");
    remove_env("DMAFLOW_PORT");

    let config = config.unwrap();
    assert_eq!(config.slot_count, Some(6));
    assert_eq!(config.port, Some(8000));
    assert_eq!(config.sink, Some(SinkKind::Network));
}

#[test]
#[serial]
fn env_export_round_trips_through_load() {
    let original = Config {
        slot_count: Some(2),
        slot_capacity: Some(128 * 1024),
        fill_mode: Some(FillMode::Immediate),
        output: Some(PathBuf::from("/tmp/capture.bin")),
        log_filter: Some(".*producer".to_string()),
        simulate: Some(true),
        ..Config::default()
    };

    let vars = original.to_env_vars();
    for (name, value) in &vars {
        set_env(name, value);
    }
    let reloaded = Config::load(&Config::empty());
    for (name, _) in &vars {
        remove_env(name);
    }

    assert_eq!(reloaded.unwrap(), original);
}

#[test]
#[serial]
fn missing_conf_file_is_an_error() {
    let cli = Config {
        conf_file: Some(PathBuf::from("/definitely/not/here.toml")),
        ..Config::empty()
    };
    assert!(matches!(
        Config::load(&cli),
        Err(ConfigError::ConfFileNotFound(_))
    ));
}

#[test]
#[serial]
fn directory_conf_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let cli = Config {
        conf_file: Some(dir.path().to_path_buf()),
        ..Config::empty()
    };
    assert!(matches!(
        Config::load(&cli),
        Err(ConfigError::ConfFileIsDir(_))
    ));
}
