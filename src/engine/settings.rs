//! The settings snapshot mutated by the engine's setters.

use crate::config::CollectorConfig;
use crate::counters::CounterTable;
use crate::models::{
    ArchiveMode, CountMode, FollowMode, FollowPattern, PauseResume, SyncScope, SyncThreshold,
};
use crate::timer::ClockParams;

/// Every user-controllable collection setting.
///
/// Cloned by each setter, mutated, validated and committed as a whole, so a
/// rejected mutation never leaves a partial update behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSettings {
    // naming inputs
    pub target_name: Option<String>,
    pub user_expt_name: Option<String>,
    pub user_dir: Option<String>,
    pub group: Option<String>,
    pub default_stem: String,
    pub project_home: Option<String>,

    pub clock: ClockParams,
    pub clkprof_enabled: bool,
    pub clkprof_default: bool,
    /// Interval in effect, in microseconds.
    pub clkprof_timer: u32,
    /// Unrounded requested interval; drives counter defaults.
    pub clkprof_target: u32,

    pub counters: CounterTable,
    pub hwc_default: bool,
    /// Canonical counter string, rebuilt on every committed counter change.
    pub hwc_string: Option<String>,
    pub kernel_hwc: bool,

    pub synctrace_enabled: bool,
    pub synctrace_threshold: SyncThreshold,
    pub synctrace_scope: SyncScope,
    /// `on`, `N` or `N-M`; `None` when heap tracing is off.
    pub heaptrace_mode: Option<String>,
    pub iotrace_enabled: bool,

    pub count_mode: CountMode,
    /// Instrumentation directories (`-I`).
    pub count_instrument_dirs: Vec<String>,
    /// Libraries excluded from instrumentation (`-N`).
    pub count_excluded_libs: Vec<String>,

    pub java_enabled: bool,
    pub java_default: bool,
    pub java_path: Option<String>,
    pub java_args: Option<String>,

    /// Data collection end time in seconds, 0 for the whole run.
    pub time_run: u32,
    pub start_delay: u32,
    /// Periodic sample interval in seconds, 0 for none.
    pub sample_period: u32,
    pub sample_default: bool,
    /// Size limit in MB, 0 for unlimited.
    pub size_limit: u32,
    pub archive: ArchiveMode,
    pub follow_mode: FollowMode,
    pub follow_default: bool,
    pub follow_pattern: Option<FollowPattern>,
    pub pause_resume: Option<PauseResume>,
    pub sample_sig: Option<i32>,
    pub prof_idle: bool,
    pub debug: bool,
    pub attach_pid: Option<u32>,
}

impl CollectionSettings {
    /// Defaults for a fresh experiment.
    pub fn new(clock: ClockParams, config: &CollectorConfig) -> Self {
        CollectionSettings {
            target_name: None,
            user_expt_name: None,
            user_dir: None,
            group: None,
            default_stem: config.default_stem.clone(),
            project_home: None,

            clock,
            clkprof_enabled: true,
            clkprof_default: true,
            clkprof_timer: clock.normal,
            clkprof_target: clock.normal,

            counters: CounterTable::new(),
            hwc_default: false,
            hwc_string: None,
            kernel_hwc: config.kernel_hwc,

            synctrace_enabled: false,
            synctrace_threshold: SyncThreshold::Calibrate,
            synctrace_scope: SyncScope::empty(),
            heaptrace_mode: None,
            iotrace_enabled: false,

            count_mode: CountMode::Off,
            count_instrument_dirs: Vec::new(),
            count_excluded_libs: Vec::new(),

            java_enabled: config.java_profiling,
            java_default: true,
            java_path: None,
            java_args: None,

            time_run: 0,
            start_delay: 0,
            sample_period: 1,
            sample_default: true,
            size_limit: 0,
            archive: ArchiveMode::On,
            follow_mode: FollowMode::On,
            follow_default: true,
            follow_pattern: None,
            pause_resume: None,
            sample_sig: None,
            prof_idle: true,
            debug: false,
            attach_pid: None,
        }
    }

    /// Is any function-level data requested?
    pub fn collects_function_data(&self) -> bool {
        self.clkprof_enabled
            || !self.counters.is_empty()
            || self.synctrace_enabled
            || self.heaptrace_mode.is_some()
            || self.iotrace_enabled
            || self.count_mode.is_on()
    }
}
