//! collctl: profiling experiment control engine
//!
//! This crate owns the configuration of one performance-profiling
//! experiment: what data to collect, where the experiment directory lives,
//! how it is named and versioned, and how it registers with an experiment
//! group shared by cooperating collectors. It produces the data descriptor
//! handed to the collection runtime.
//!
//! The system is organized into functional modules:
//! - **error**: Unified error type hierarchy
//! - **models**: Core value types shared by the modules
//! - **signals**: Signal name and number resolution
//! - **hardware**: Host facts (CPU, clock, memory)
//! - **timer**: Clock-profiling calibration and interval parsing
//! - **counters**: Hardware-counter specifications and the driver seam
//! - **config**: Engine defaults and the consistency validator
//! - **naming**: Experiment naming, versioning and directory creation
//! - **group**: Group-file membership protocol
//! - **descriptor**: Data descriptor building and reading
//! - **engine**: The settings snapshot, its setters and its lifecycle
//! - **control**: Named controls for front ends

// Core foundational modules
pub mod error;
pub mod models;
pub mod signals;

// Host and timer facts
pub mod hardware;
pub mod timer;

pub mod counters;
pub mod config;
pub mod naming;
pub mod group;
pub mod descriptor;

// Settings snapshot and lifecycle
pub mod engine;
pub mod control;

// Re-export the log crate for macro usage
pub use log;

// ============================================================================
// PUBLIC RE-EXPORTS FOR CONVENIENCE
// ============================================================================

pub use error::{
    CalibrationError, ConfigError, ConsistencyError, ControlError, CounterError, DescriptorError,
    GroupError, NamingError, Result,
};

pub use models::{
    Applied, ArchiveMode, CountMode, FollowMode, FollowPattern, PauseResume, SyncScope,
    SyncThreshold,
};

pub use config::CollectorConfig;
pub use control::ControlId;
pub use counters::{CounterDriver, CounterEntry, PerfEventDriver};
pub use engine::{CollectionSettings, CollectorControl};
pub use hardware::HostInfo;
pub use timer::ClockParams;
