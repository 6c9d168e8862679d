//! Integration tests for the config layer
//!
//! Loads settings files from disk and checks that the engine built from them
//! picks up each default.

use collctl::config::loader;
use collctl::hardware::{CpuInfo, HostInfo};
use collctl::{ClockParams, CollectorConfig, CollectorControl, ConfigError, CounterDriver, PerfEventDriver};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn engine(config: CollectorConfig) -> CollectorControl {
    let host = HostInfo {
        node_name: "bench".to_string(),
        cpu: CpuInfo {
            count: 4,
            clock_mhz: 2400,
            ..CpuInfo::default()
        },
        clock_ticks: 100,
        page_size: 4096,
        phys_pages: 0,
    };
    let driver: Arc<dyn CounterDriver> = Arc::new(PerfEventDriver::with_availability(&host.cpu, true));
    CollectorControl::with_parts(config, host, ClockParams::PRECISE, driver)
}

#[test]
fn test_saved_settings_drive_engine_defaults() -> Result<(), Box<dyn std::error::Error>> {
    let tempdir = TempDir::new()?;
    let path = tempdir.path().join("settings.json");
    let mut config = CollectorConfig::default();
    config.default_stem = "nightly".to_string();
    config.java_profiling = false;
    config.default_hwc = true;
    loader::save_config_to_file(&config, &path)?;

    let loaded = loader::load_or_default(&path)?;
    assert_eq!(loaded, config);

    let engine = engine(loaded);
    assert_eq!(engine.expt_name(), "nightly.1.er");
    assert!(engine.settings().hwc_default);
    assert!(!engine.data_desc().contains("j:1;"));
    Ok(())
}

#[test]
fn test_partial_file_keeps_remaining_defaults() {
    let tempdir = TempDir::new().unwrap();
    let path = tempdir.path().join("settings.json");
    fs::write(&path, r#"{ "interactive": true }"#).unwrap();

    let config = loader::load_or_default(&path).unwrap();
    assert!(config.interactive);
    assert!(config.java_profiling);
    assert_eq!(config.default_stem, "test");
}

#[test]
fn test_invalid_stem_rejected_on_load() {
    let tempdir = TempDir::new().unwrap();
    let path = tempdir.path().join("settings.json");
    fs::write(&path, r#"{ "default_stem": "" }"#).unwrap();

    let err = loader::load_config_from_file(&path).unwrap_err();
    assert!(matches!(err, ConfigError::ValidationFailed(_)));
}

#[test]
fn test_wrong_extension_rejected() {
    let tempdir = TempDir::new().unwrap();
    let path = tempdir.path().join("settings.toml");
    fs::write(&path, "{}").unwrap();
    assert!(loader::load_or_default(&path).is_err());
}

#[test]
fn test_missing_file_uses_defaults() {
    let tempdir = TempDir::new().unwrap();
    let config = loader::load_or_default(&tempdir.path().join("none.json")).unwrap();
    let engine = engine(config);
    assert_eq!(engine.expt_name(), "test.1.er");
    assert_eq!(engine.data_desc(), "p:10000;S:1;j:1;F:3;a:on;");
}

#[test]
fn test_global_settings_follow_home() -> Result<(), Box<dyn std::error::Error>> {
    // the only test in this binary that touches HOME
    let home = TempDir::new()?;
    std::env::set_var("HOME", home.path());

    let path = loader::get_global_settings_path()?;
    assert_eq!(path, home.path().join(".config/collctl/settings.json"));
    assert_eq!(loader::load_global()?.default_stem, "test");

    let mut config = CollectorConfig::default();
    config.default_stem = "global".to_string();
    config.java_profiling = false;
    loader::save_config_to_file(&config, &path)?;

    let loaded = loader::load_global()?;
    assert_eq!(loaded.default_stem, "global");
    assert!(!loaded.java_profiling);
    Ok(())
}
