//! Unified error type hierarchy for the collector control engine
//!
//! Provides structured error handling with ConsistencyError, CounterError,
//! NamingError, GroupError, CalibrationError, DescriptorError, ConfigError
//! and ControlError.
//! Every `Display` string is the message handed back to the caller.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Message returned by every mutator once the experiment directory is open.
pub const ACTIVE_MSG: &str = "Experiment is active; command ignored.";

/// Illegal combinations of collection settings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyError {
    #[error("Java arguments can not be set if Java profiling is not enabled.")]
    JavaArgsWithoutJava,

    #[error("Count data cannot be collected along with any other data.")]
    CountWithOtherData,

    #[error("Count data cannot be collected with any of -F -S -y -l -j -J -x -t .")]
    CountWithOptions,

    #[error("-I or -N can only be specified with count data.")]
    CountFlagsWithoutCount,
}

/// Hardware-counter specification and driver errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CounterError {
    #[error("No default HW counter set is defined for {cpu}")]
    NoDefaultSet { cpu: String },

    #[error("HW counter set for {cpu} cannot be loaded on this system")]
    DefaultSetUnavailable { cpu: String },

    #[error("HW counter set for {cpu}, \"{spec}\", format error")]
    DefaultSetFormat { cpu: String, spec: String },

    #[error("Invalid HW counter specification `{0}'")]
    Syntax(String),

    #[error("Unknown HW counter `{0}'")]
    UnknownCounter(String),

    #[error("Invalid HW counter interval `{rate}' for `{name}'")]
    InvalidRate { name: String, rate: String },

    #[error("Too many HW counters specified: at most {max} can be used")]
    TooMany { max: usize },

    #[error("HW counter `{0}' has an empty name")]
    EmptyName(String),

    #[error("HW counter set is invalid: {0}")]
    Rejected(String),
}

/// Experiment naming and directory creation errors.
#[derive(Error, Debug)]
pub enum NamingError {
    #[error("name {0} is in use and cannot be updated")]
    NameInUse(String),

    #[error("Experiment name `{0}' must end in `.er'")]
    BadExperimentSuffix(String),

    #[error("Experiment group name `{0}' must end in `.erg'")]
    BadGroupSuffix(String),

    #[error("Can't set directory `{path}': {source}")]
    BadDirectory {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Store directory {dir} is not writeable: {source}")]
    NotWritable {
        dir: String,
        #[source]
        source: io::Error,
    },

    #[error("Store directory {dir} is not accessible: {source}")]
    NotAccessible {
        dir: String,
        #[source]
        source: io::Error,
    },

    #[error("Unable to create directory `{path}' -- {reason}")]
    CreateFailed { path: String, reason: String },

    #[error("Unable to create directory `{path}' -- {source}\ncollect: Internal error: loop count achieved: {attempts}")]
    Exhausted {
        path: String,
        attempts: usize,
        #[source]
        source: io::Error,
    },

    #[error("Cannot remove experiment `{0}'")]
    RemoveFailed(String),
}

/// Group-file membership errors.
#[derive(Error, Debug)]
pub enum GroupError {
    #[error("user interrupt")]
    Interrupted,

    #[error("Timed out: waiting for group file {}", .0.display())]
    Timeout(PathBuf),

    #[error("Can't open group file {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Can't create group file {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unable to lock group file {}: {source}", .path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Can't update group file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Group file {} is not writeable: {source}", .path.display())]
    NotWritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Directory ({}) for group file {} is not writeable: {source}", .dir.display(), .path.display())]
    DirNotWritable {
        dir: PathBuf,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Interval-timer calibration errors.
#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("Can't set SIGPROF: {0}")]
    InstallHandler(nix::Error),

    #[error("Can't reset SIGPROF: {0}")]
    RestoreHandler(nix::Error),
}

/// Data descriptor reading errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("Unknown data descriptor key `{0}'")]
    UnknownKey(String),

    #[error("Malformed data descriptor token `{0}'")]
    Malformed(String),
}

/// Configuration file parsing errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid JSON in config: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error during config operations: {0}")]
    IoError(#[from] io::Error),
}

/// Error returned by any settings mutator or lifecycle operation.
///
/// The engine state is unchanged whenever one of these is returned from a
/// setter.
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("{}", ACTIVE_MSG)]
    Active,

    #[error(transparent)]
    Consistency(#[from] ConsistencyError),

    #[error(transparent)]
    Counter(#[from] CounterError),

    #[error(transparent)]
    Naming(#[from] NamingError),

    #[error(transparent)]
    Group(#[from] GroupError),

    /// A malformed value for the named setting.
    #[error("Unrecognized {what} `{value}'")]
    Unrecognized { what: &'static str, value: String },

    #[error("{0}")]
    Invalid(String),

    #[error("Signal {0} can not be used for both sample and pause-resume (delayed initialization)")]
    SignalConflict(String),

    #[error("Can not determine CPU clock frequency.")]
    NoClockFrequency,

    #[error("System clock profile resolution can not be determined.")]
    NoClockResolution,
}

impl ControlError {
    pub(crate) fn unrecognized(what: &'static str, value: impl Into<String>) -> Self {
        ControlError::Unrecognized {
            what,
            value: value.into(),
        }
    }
}

/// Top-level result type for engine operations.
pub type Result<T> = std::result::Result<T, ControlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consistency_error_display() {
        let err = ConsistencyError::CountWithOtherData;
        assert_eq!(
            err.to_string(),
            "Count data cannot be collected along with any other data."
        );
    }

    #[test]
    fn test_control_error_wraps_transparently() {
        let err: ControlError = ConsistencyError::JavaArgsWithoutJava.into();
        assert_eq!(
            err.to_string(),
            "Java arguments can not be set if Java profiling is not enabled."
        );
    }

    #[test]
    fn test_active_message() {
        assert_eq!(ControlError::Active.to_string(), ACTIVE_MSG);
    }

    #[test]
    fn test_unrecognized_display() {
        let err = ControlError::unrecognized("sample period", "abc");
        assert_eq!(err.to_string(), "Unrecognized sample period `abc'");
    }

    #[test]
    fn test_group_timeout_display() {
        let err = GroupError::Timeout(PathBuf::from("/tmp/x.erg"));
        assert_eq!(err.to_string(), "Timed out: waiting for group file /tmp/x.erg");
    }

    #[test]
    fn test_result_type_err() {
        let result: Result<i32> = Err(ControlError::Active);
        assert!(result.is_err());
    }
}
