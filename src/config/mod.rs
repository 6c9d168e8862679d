//! Configuration module for the collector control engine.
//!
//! # Module Structure
//!
//! - `loader`: Loads and saves [`CollectorConfig`] as JSON
//! - `validator`: Consistency rules over the collection settings
//!
//! # Configuration Flow
//!
//! 1. `loader::load_or_default` reads `~/.config/collctl/settings.json`
//! 2. `CollectorConfig::apply_env` folds in the environment
//! 3. The engine is built from the resulting config
//! 4. Every setter runs `validator::check_consistency` before committing

pub mod loader;
pub mod validator;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Set by the GUI when it launches the collector.
pub const GUI_ENV_VAR: &str = "SP_COLLECTOR_FROM_GUI";

/// Engine-wide defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Interactive callers receive filesystem warnings and rename notices.
    pub interactive: bool,
    /// Populate the default hardware-counter set at construction.
    pub default_hwc: bool,
    /// Count kernel-mode events.
    pub kernel_hwc: bool,
    /// Java profiling is on unless turned off.
    pub java_profiling: bool,
    /// Skip the remote filesystem warning.
    pub suppress_fs_warning: bool,
    /// Stem of default experiment names.
    pub default_stem: String,
    /// Emit the non-localized banner copy.
    #[serde(skip)]
    pub from_gui: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        CollectorConfig {
            interactive: false,
            default_hwc: false,
            kernel_hwc: false,
            java_profiling: true,
            suppress_fs_warning: false,
            default_stem: "test".to_string(),
            from_gui: false,
        }
    }
}

impl CollectorConfig {
    /// Defaults with the environment applied.
    pub fn from_env() -> Self {
        let mut config = CollectorConfig::default();
        config.apply_env();
        config
    }

    pub fn apply_env(&mut self) {
        self.from_gui = launched_from_gui();
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_stem.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "default_stem cannot be empty".to_string(),
            ));
        }
        if self.default_stem.contains('/') {
            return Err(ConfigError::ValidationFailed(format!(
                "default_stem must not contain '/', got: {}",
                self.default_stem
            )));
        }
        Ok(())
    }
}

/// Was this process started by the collector GUI?
pub fn launched_from_gui() -> bool {
    std::env::var_os(GUI_ENV_VAR).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_config_default() {
        let config = CollectorConfig::default();
        assert_eq!(config.default_stem, "test");
        assert!(config.java_profiling);
        assert!(!config.interactive);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: CollectorConfig = serde_json::from_str(r#"{"interactive": true}"#).unwrap();
        assert!(config.interactive);
        assert_eq!(config.default_stem, "test");
    }

    #[test]
    fn test_validate_rejects_bad_stem() {
        let mut config = CollectorConfig::default();
        config.default_stem = String::new();
        assert!(config.validate().is_err());
        config.default_stem = "a/b".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_gui_is_not_serialized() {
        let mut config = CollectorConfig::default();
        config.from_gui = true;
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("from_gui"));
    }
}
