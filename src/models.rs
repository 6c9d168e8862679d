//! Core data types for the collector control engine.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every experiment directory name ends in this suffix.
pub const EXPERIMENT_SUFFIX: &str = ".er";

/// Every experiment group file name ends in this suffix.
pub const GROUP_SUFFIX: &str = ".erg";

/// Successful outcome of a settings mutation.
///
/// A rejected mutation is the `Err` side of the setter's `Result`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// The new value was committed.
    Done,
    /// The new value was committed, possibly after adjustment.
    Warned(String),
}

impl Applied {
    /// Build from an optional warning message.
    pub fn from_warning(warning: Option<String>) -> Self {
        match warning {
            Some(msg) => Applied::Warned(msg),
            None => Applied::Done,
        }
    }

    pub fn warning(&self) -> Option<&str> {
        match self {
            Applied::Done => None,
            Applied::Warned(msg) => Some(msg),
        }
    }

    pub fn into_warning(self) -> Option<String> {
        match self {
            Applied::Done => None,
            Applied::Warned(msg) => Some(msg),
        }
    }
}

/// Descendant-process follow policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FollowMode {
    None,
    On,
    /// Follow descendants, optionally restricted by a name pattern.
    All,
}

impl FollowMode {
    /// Numeric code understood by the collection runtime.
    pub fn wire_code(&self) -> u32 {
        match self {
            FollowMode::None => 0,
            FollowMode::On => 3,
            FollowMode::All => 7,
        }
    }

    pub fn from_wire_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(FollowMode::None),
            3 => Some(FollowMode::On),
            7 => Some(FollowMode::All),
            _ => None,
        }
    }
}

/// A user-supplied descendant name pattern (`=regex`) and its anchored form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowPattern {
    /// Exactly what the user typed, including the leading `=`.
    pub user: String,
    /// `^<pattern>$`, as compiled for matching.
    pub anchored: String,
}

/// Which load objects and sources are archived with the experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveMode {
    On,
    Off,
    LdObjects,
    UsedLdObjects,
    Src,
    UsedSrc,
    All,
}

impl ArchiveMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveMode::On => "on",
            ArchiveMode::Off => "off",
            ArchiveMode::LdObjects => "ldobjects",
            ArchiveMode::UsedLdObjects => "usedldobjects",
            ArchiveMode::Src => "src",
            ArchiveMode::UsedSrc => "usedsrc",
            ArchiveMode::All => "all",
        }
    }
}

impl Default for ArchiveMode {
    fn default() -> Self {
        ArchiveMode::On
    }
}

impl fmt::Display for ArchiveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArchiveMode {
    type Err = String;

    /// Case-insensitive, matching the launcher's `-a` option.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "on" => Ok(ArchiveMode::On),
            "off" => Ok(ArchiveMode::Off),
            "ldobjects" => Ok(ArchiveMode::LdObjects),
            "usedldobjects" => Ok(ArchiveMode::UsedLdObjects),
            "src" => Ok(ArchiveMode::Src),
            "usedsrc" => Ok(ArchiveMode::UsedSrc),
            "all" => Ok(ArchiveMode::All),
            _ => Err(format!("Unknown archive mode: {}", s)),
        }
    }
}

/// Call-count data collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CountMode {
    Off,
    /// Instrumented run.
    Dynamic,
    /// Static counts only, generated for the main executable.
    Static,
}

impl CountMode {
    pub fn is_on(&self) -> bool {
        !matches!(self, CountMode::Off)
    }
}

bitflags! {
    /// Which synchronization APIs are traced.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SyncScope: u32 {
        const NATIVE = 0x1;
        const JAVA = 0x2;
    }
}

/// Minimum wait time for a synchronization event to be recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncThreshold {
    /// Determined by the runtime at startup.
    Calibrate,
    /// Record every event.
    All,
    Micros(u32),
}

impl SyncThreshold {
    /// Value written into the descriptor `s:` token.
    pub fn wire_value(&self) -> i64 {
        match self {
            SyncThreshold::Calibrate => -1,
            SyncThreshold::All => 0,
            SyncThreshold::Micros(us) => i64::from(*us),
        }
    }

    pub fn from_wire_value(value: i64) -> Option<Self> {
        match value {
            -1 => Some(SyncThreshold::Calibrate),
            0 => Some(SyncThreshold::All),
            n if n > 0 => u32::try_from(n).ok().map(SyncThreshold::Micros),
            _ => None,
        }
    }
}

impl fmt::Display for SyncThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncThreshold::Calibrate => f.write_str("calibrate"),
            SyncThreshold::All => f.write_str("all"),
            SyncThreshold::Micros(us) => write!(f, "{}", us),
        }
    }
}

/// Pause/resume (delayed initialization) signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseResume {
    pub signal: i32,
    /// Start the collection paused until the first signal arrives.
    pub start_paused: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_mode_case_insensitive() {
        assert_eq!("ON".parse::<ArchiveMode>(), Ok(ArchiveMode::On));
        assert_eq!(
            "UsedLdObjects".parse::<ArchiveMode>(),
            Ok(ArchiveMode::UsedLdObjects)
        );
        assert!("bogus".parse::<ArchiveMode>().is_err());
    }

    #[test]
    fn test_follow_wire_codes_round_trip() {
        for mode in [FollowMode::None, FollowMode::On, FollowMode::All] {
            assert_eq!(FollowMode::from_wire_code(mode.wire_code()), Some(mode));
        }
        assert_eq!(FollowMode::from_wire_code(5), None);
    }

    #[test]
    fn test_sync_threshold_wire_values() {
        assert_eq!(SyncThreshold::Calibrate.wire_value(), -1);
        assert_eq!(SyncThreshold::All.wire_value(), 0);
        assert_eq!(SyncThreshold::from_wire_value(250), Some(SyncThreshold::Micros(250)));
        assert_eq!(SyncThreshold::from_wire_value(-7), None);
    }

    #[test]
    fn test_applied_warning_accessors() {
        assert_eq!(Applied::from_warning(None), Applied::Done);
        let warned = Applied::from_warning(Some("clamped".to_string()));
        assert_eq!(warned.warning(), Some("clamped"));
        assert_eq!(warned.into_warning(), Some("clamped".to_string()));
    }
}
