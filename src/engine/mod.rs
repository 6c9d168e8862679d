//! Collector control engine.
//!
//! [`CollectorControl`] owns one experiment's settings snapshot, its derived
//! names and its lifecycle flags. Every setter follows the same pattern:
//! clone the snapshot, mutate the clone, check consistency, commit. A
//! rejected call leaves the engine exactly as it was.
//!
//! # Lifecycle
//!
//! 1. `new` / `with_parts` build a default configuration
//! 2. Setters adjust it; `check_expt` verifies it
//! 3. `enable_expt` then `setup_experiment` create the directory and join
//!    the group; the engine is now opened and refuses further changes
//! 4. `close_expt` or `delete_expt` end the experiment

pub mod report;
pub mod settings;
mod setters;

pub use settings::CollectionSettings;

use crate::config::validator::check_consistency;
use crate::config::CollectorConfig;
use crate::counters::{CounterDriver, PerfEventDriver};
use crate::descriptor;
use crate::error::{ControlError, NamingError, Result};
use crate::group::{self, GroupFs, GroupJoiner, LocalGroupFs};
use crate::hardware::HostInfo;
use crate::models::Applied;
use crate::naming::{ExperimentNames, NameInputs};
use crate::timer::{self, ClockParams};
use nix::unistd::{access, AccessFlags};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One experiment's configuration and lifecycle.
pub struct CollectorControl {
    host: HostInfo,
    config: CollectorConfig,
    driver: Arc<dyn CounterDriver>,
    settings: CollectionSettings,
    names: ExperimentNames,
    enabled: bool,
    opened: bool,
    interrupted: Arc<AtomicBool>,
    data_desc: String,
}

/// How a name refresh treats a name that already exists.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Reserve {
    pub change_msg: bool,
    pub check_only: bool,
    pub force_new: bool,
}

impl Reserve {
    pub(crate) const QUIET: Reserve = Reserve {
        change_msg: false,
        check_only: false,
        force_new: false,
    };
}

fn name_inputs(s: &CollectionSettings) -> NameInputs<'_> {
    NameInputs {
        user_name: s.user_expt_name.as_deref(),
        user_dir: s.user_dir.as_deref(),
        group: s.group.as_deref(),
        default_stem: &s.default_stem,
    }
}

/// Join non-empty messages into one warning.
pub(crate) fn merge_warnings(parts: impl IntoIterator<Item = Option<String>>) -> Option<String> {
    let joined: Vec<String> = parts.into_iter().flatten().collect();
    (!joined.is_empty()).then(|| joined.concat())
}

impl CollectorControl {
    /// Engine for this host, with the calibrated clock table and the generic
    /// perf-event counter catalogue.
    pub fn new(config: CollectorConfig) -> Self {
        let host = HostInfo::detect();
        let driver: Arc<dyn CounterDriver> = Arc::new(PerfEventDriver::new(&host.cpu));
        CollectorControl::with_parts(config, host, timer::clock_params(), driver)
    }

    pub fn with_parts(
        config: CollectorConfig,
        host: HostInfo,
        clock: ClockParams,
        driver: Arc<dyn CounterDriver>,
    ) -> Self {
        let settings = CollectionSettings::new(clock, &config);
        let mut control = CollectorControl {
            host,
            config,
            driver,
            settings,
            names: ExperimentNames::default(),
            enabled: false,
            opened: false,
            interrupted: Arc::new(AtomicBool::new(false)),
            data_desc: String::new(),
        };
        if control.config.default_hwc {
            control.set_hwc_default();
        }
        control.names.preprocess(name_inputs(&control.settings), false);
        control.refresh_quietly();
        control.rebuild_descriptor();
        control
    }

    /// An independent configuration with the same settings.
    ///
    /// Java path and arguments, the target name, the lifecycle and the
    /// interrupt flag are not carried over; names are derived afresh.
    pub fn duplicate(&self) -> Self {
        let mut settings = self.settings.clone();
        settings.java_path = None;
        settings.java_args = None;
        settings.target_name = None;

        let mut copy = CollectorControl {
            host: self.host.clone(),
            config: self.config.clone(),
            driver: Arc::clone(&self.driver),
            settings,
            names: ExperimentNames::default(),
            enabled: self.enabled,
            opened: false,
            interrupted: Arc::new(AtomicBool::new(false)),
            data_desc: String::new(),
        };
        copy.names.preprocess(name_inputs(&copy.settings), false);
        copy.refresh_quietly();
        copy.rebuild_descriptor();
        copy
    }

    pub fn settings(&self) -> &CollectionSettings {
        &self.settings
    }

    pub fn names(&self) -> &ExperimentNames {
        &self.names
    }

    pub fn host(&self) -> &HostInfo {
        &self.host
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn driver(&self) -> &dyn CounterDriver {
        self.driver.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_opened(&self) -> bool {
        self.opened
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Flag another thread can raise to cancel a blocked group join.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    pub fn data_desc(&self) -> &str {
        &self.data_desc
    }

    pub fn hwc_string(&self) -> Option<&str> {
        self.settings.hwc_string.as_deref()
    }

    pub fn expt_name(&self) -> &str {
        &self.names.expt_name
    }

    pub fn store_dir(&self) -> &str {
        &self.names.store_dir
    }

    pub fn store_path(&self) -> &str {
        self.names.store_path()
    }

    /// Path of the group file, when the experiment is grouped.
    pub fn group_file(&self) -> Option<PathBuf> {
        let group = self.settings.group.as_deref()?;
        Some(group::group_file_path(group, self.settings.user_dir.as_deref()))
    }

    pub(crate) fn ensure_closed(&self) -> Result<()> {
        if self.opened {
            Err(ControlError::Active)
        } else {
            Ok(())
        }
    }

    /// Apply `mutate` to a copy of the settings and commit it if the result
    /// is consistent.
    pub(crate) fn transact<F>(&mut self, mutate: F) -> Result<Applied>
    where
        F: FnOnce(&mut CollectionSettings) -> Result<Applied>,
    {
        self.ensure_closed()?;
        let mut next = self.settings.clone();
        let applied = mutate(&mut next)?;
        check_consistency(&next)?;
        self.settings = next;
        Ok(applied)
    }

    /// Run a change touching settings and names, restoring both on failure.
    pub(crate) fn transact_names<F>(&mut self, change: F) -> Result<Applied>
    where
        F: FnOnce(&mut Self) -> Result<Applied>,
    {
        self.ensure_closed()?;
        let saved = (self.settings.clone(), self.names.clone());
        match change(self) {
            Ok(applied) => Ok(applied),
            Err(e) => {
                self.settings = saved.0;
                self.names = saved.1;
                Err(e)
            }
        }
    }

    fn fs_warning_enabled(&self) -> bool {
        self.config.interactive && self.enabled && !self.config.suppress_fs_warning
    }

    /// Re-derive every name from the current settings.
    pub(crate) fn preprocess_names(&mut self) -> Option<String> {
        let fs_warning = self.fs_warning_enabled();
        self.names.preprocess(name_inputs(&self.settings), fs_warning)
    }

    pub(crate) fn reserve_name(&mut self, how: Reserve) -> std::result::Result<Option<String>, NamingError> {
        self.names
            .reserve_unique_name(how.change_msg, how.check_only, how.force_new)
    }

    fn refresh_quietly(&mut self) {
        if let Err(e) = self.reserve_name(Reserve::QUIET) {
            log::debug!("[Engine] keeping name {}: {}", self.names.base_name, e);
        }
    }

    pub(crate) fn rebuild_descriptor(&mut self) {
        self.data_desc = descriptor::build(&self.settings);
    }

    /// Allow collection; refused when the host's clock can not be measured.
    pub fn enable_expt(&mut self) -> Result<()> {
        self.ensure_closed()?;
        if self.host.cpu.clock_mhz == 0 {
            return Err(ControlError::NoClockFrequency);
        }
        if self.host.clock_ticks == 0 {
            return Err(ControlError::NoClockResolution);
        }
        self.enabled = true;
        Ok(())
    }

    /// Verify the configuration is ready to run.
    ///
    /// Returns a warning for configurations that collect little or are
    /// likely to surprise.
    pub fn check_expt(&mut self) -> Result<Applied> {
        check_consistency(&self.settings)?;
        let s = &self.settings;
        let mut warning = None;
        if s.heaptrace_mode.is_some() && s.java_enabled && !s.java_default {
            warning = Some(
                "Note: Heap profiling will only trace native allocations, not Java allocations.\n"
                    .to_string(),
            );
        }
        if !s.collects_function_data() {
            warning = Some(
                "Warning: No function level data requested; only statistics will be collected.\n\n"
                    .to_string(),
            );
        }
        self.rebuild_descriptor();

        let store_dir = self.names.store_dir.clone();
        fs::metadata(&store_dir).map_err(|source| NamingError::NotAccessible {
            dir: store_dir.clone(),
            source,
        })?;
        access(store_dir.as_str(), AccessFlags::W_OK).map_err(|errno| NamingError::NotWritable {
            dir: store_dir.clone(),
            source: io::Error::from(errno),
        })?;

        if let Some(path) = self.group_file() {
            group::check_group(&path)?;
        }
        Ok(Applied::from_warning(warning))
    }

    /// Create the experiment directory and join the group, if any.
    pub fn setup_experiment(&mut self) -> Result<()> {
        self.setup_experiment_with(LocalGroupFs)
    }

    /// As [`setup_experiment`](Self::setup_experiment), joining the group
    /// through `fs`.
    pub fn setup_experiment_with<F: GroupFs>(&mut self, fs: F) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        self.ensure_closed()?;
        self.rebuild_descriptor();
        self.names.create_experiment_dir()?;

        if let Some(path) = self.group_file() {
            let joiner = GroupJoiner::new(fs, Arc::clone(&self.interrupted));
            if let Err(e) = joiner.join(&path, self.names.store_path()) {
                self.names.remove_experiment_dir();
                return Err(e.into());
            }
        }
        self.opened = true;
        log::debug!("[Engine] experiment {} opened", self.names.store_path());
        Ok(())
    }

    /// Request cancellation of a pending group join.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    /// End the experiment, keeping its directory.
    pub fn close_expt(&mut self) {
        self.opened = false;
        self.refresh_quietly();
    }

    /// End the experiment and remove its directory.
    pub fn delete_expt(&mut self) {
        if !self.opened {
            return;
        }
        self.names.remove_experiment_dir();
        self.close_expt();
    }
}
