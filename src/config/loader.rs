//! Config file loader and serialization.

use super::CollectorConfig;
use crate::error::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};

/// Get the global settings path: ~/.config/collctl/settings.json
pub fn get_global_settings_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or_else(|| {
        ConfigError::ValidationFailed("Cannot determine home directory".to_string())
    })?;

    Ok(home.join(".config/collctl").join("settings.json"))
}

/// Load config from JSON file.
pub fn load_config_from_file(path: &Path) -> Result<CollectorConfig, ConfigError> {
    validate_config_path(path)?;

    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::FileNotFound(format!(
                "Configuration file not found at: {}",
                path.display()
            ))
        } else {
            ConfigError::IoError(e)
        }
    })?;

    let config: CollectorConfig = serde_json::from_str(&content).map_err(ConfigError::InvalidJson)?;
    config.validate()?;
    Ok(config)
}

/// Save config to JSON file.
pub fn save_config_to_file(config: &CollectorConfig, path: &Path) -> Result<(), ConfigError> {
    validate_config_path(path)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(ConfigError::IoError)?;
        }
    }

    let json_content = serde_json::to_string_pretty(config).map_err(ConfigError::InvalidJson)?;
    fs::write(path, json_content).map_err(ConfigError::IoError)?;
    log::debug!("[Config] saved settings to {}", path.display());
    Ok(())
}

/// Load `path`, falling back to defaults when the file does not exist.
pub fn load_or_default(path: &Path) -> Result<CollectorConfig, ConfigError> {
    match load_config_from_file(path) {
        Ok(config) => Ok(config),
        Err(ConfigError::FileNotFound(_)) => {
            log::debug!("[Config] {} not found, using defaults", path.display());
            Ok(CollectorConfig::default())
        }
        Err(e) => Err(e),
    }
}

/// Global settings with the environment applied.
pub fn load_global() -> Result<CollectorConfig, ConfigError> {
    let mut config = load_or_default(&get_global_settings_path()?)?;
    config.apply_env();
    Ok(config)
}

/// Validate config path (.json extension required).
pub fn validate_config_path(path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationFailed(
            "Configuration path cannot be empty".to_string(),
        ));
    }

    match path.extension() {
        Some(ext) if ext == "json" => Ok(()),
        Some(ext) => Err(ConfigError::ValidationFailed(format!(
            "Configuration file must have .json extension, got .{}",
            ext.to_string_lossy()
        ))),
        None => Err(ConfigError::ValidationFailed(
            "Configuration file must have .json extension".to_string(),
        )),
    }
}
