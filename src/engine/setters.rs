//! Settings mutators.
//!
//! Each setter parses its value, applies it to a copy of the settings and
//! commits only if the result is consistent. Errors carry the message for
//! the caller; non-fatal adjustments come back as [`Applied::Warned`].

use super::{merge_warnings, CollectorControl, Reserve};
use crate::counters::{
    apply_resolution, canonical_string, parse_counter_spec, refresh_overflow, CounterDriver,
};
use crate::engine::CollectionSettings;
use crate::error::{ControlError, CounterError, NamingError, Result};
use crate::models::{
    Applied, ArchiveMode, CountMode, FollowMode, FollowPattern, PauseResume, SyncScope,
    SyncThreshold, EXPERIMENT_SUFFIX, GROUP_SUFFIX,
};
use crate::naming::canonical_path;
use crate::signals::{describe_signal, is_valid_signal};
use crate::timer::{millis, parse_clock_request, ClockParams, ClockRequest};
use regex::Regex;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

/// Parse a non-negative integer, decimal or `0x` hexadecimal.
pub(crate) fn parse_number(s: &str) -> Option<u64> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

fn parse_u32(s: &str) -> Option<u32> {
    parse_number(s).and_then(|n| u32::try_from(n).ok())
}

/// Seconds, with an optional `s` or `m` (minutes) suffix. Empty is zero.
fn parse_seconds(s: &str) -> Option<u32> {
    let (digits, scale) = match s.as_bytes().last() {
        Some(b'm') => (&s[..s.len() - 1], 60),
        Some(b's') => (&s[..s.len() - 1], 1),
        _ => (s, 1),
    };
    if digits.is_empty() {
        return Some(0);
    }
    parse_u32(digits)?.checked_mul(scale)
}

/// Point clock profiling and every counter's default rate at `target_us`.
fn retarget_clock(s: &mut CollectionSettings, target_us: u32, driver: &dyn CounterDriver) {
    s.clkprof_timer = target_us;
    s.clkprof_target = target_us;
    let min_time = s.clock.counter_min_time_ns(target_us);
    for entry in s.counters.iter_mut() {
        entry.min_time_default = min_time;
        refresh_overflow(entry, driver);
    }
}

fn clear_counters(s: &mut CollectionSettings) {
    s.counters.clear();
    s.hwc_default = false;
    s.hwc_string = None;
}

fn clear_count_flags(s: &mut CollectionSettings) {
    s.count_instrument_dirs.clear();
    s.count_excluded_libs.clear();
}

fn on_off(spec: Option<&str>, what: &'static str) -> Result<bool> {
    match spec {
        None | Some("") | Some("on") => Ok(true),
        Some("off") => Ok(false),
        Some(other) => Err(ControlError::unrecognized(what, other)),
    }
}

impl CollectorControl {
    /// `on`, `off`, `lo`, `hi`, or an interval in milliseconds (`m`) or
    /// microseconds (`u`).
    pub fn set_clkprof(&mut self, spec: Option<&str>) -> Result<Applied> {
        self.ensure_closed()?;
        let request =
            parse_clock_request(spec, &self.settings.clock).map_err(ControlError::Invalid)?;
        let driver = Arc::clone(&self.driver);
        self.transact(|s| match request {
            ClockRequest::Off => {
                s.clkprof_enabled = false;
                s.clkprof_default = false;
                Ok(Applied::Done)
            }
            ClockRequest::Interval(requested) => {
                s.clkprof_enabled = true;
                s.clkprof_default = false;
                let (value, warnings) = s.clock.fit(requested);
                retarget_clock(s, ClockParams::clamp_target(requested), driver.as_ref());
                s.clkprof_timer = value;
                Ok(Applied::from_warning(
                    (!warnings.is_empty()).then(|| warnings.join("\n")),
                ))
            }
        })
    }

    /// Adopt the interval the runtime actually used.
    ///
    /// Allowed while the experiment is open. Returns a note when the value
    /// changed.
    pub fn reset_clkprof(&mut self, value_us: u32) -> Option<String> {
        if value_us == self.settings.clkprof_timer {
            return None;
        }
        let note = format!(
            "Warning: Clock profiling timer reset from {} millisec. to {} millisec. as required by profiling driver\n\n",
            millis(self.settings.clkprof_timer),
            millis(value_us)
        );
        self.settings.clkprof_timer = value_us;
        log::debug!("[Engine] clock profiling timer reset to {}us", value_us);
        Some(note)
    }

    /// `[n][j],<threshold>` where the threshold is `calibrate`, `on`,
    /// `off`, `all` or microseconds.
    pub fn set_synctrace(&mut self, spec: Option<&str>) -> Result<Applied> {
        self.ensure_closed()?;
        let Some(spec) = spec else {
            return self.transact(|s| {
                s.synctrace_enabled = true;
                s.synctrace_threshold = SyncThreshold::Calibrate;
                s.synctrace_scope = SyncScope::NATIVE;
                Ok(Applied::Done)
            });
        };

        let unrecognized =
            || ControlError::unrecognized("synchronization tracing threshold", spec);
        let (scope, threshold) = match spec.split_once(',') {
            Some((letters, threshold)) => {
                let mut scope = SyncScope::empty();
                for c in letters.chars() {
                    match c {
                        'n' => scope |= SyncScope::NATIVE,
                        'j' => scope |= SyncScope::JAVA,
                        _ => return Err(unrecognized()),
                    }
                }
                if scope.is_empty() {
                    scope = SyncScope::NATIVE;
                }
                (scope, threshold)
            }
            None => (SyncScope::NATIVE | SyncScope::JAVA, spec),
        };

        let setting = match threshold {
            "" | "calibrate" | "on" => Some(SyncThreshold::Calibrate),
            "off" => None,
            "all" => Some(SyncThreshold::All),
            n => {
                let value = parse_u32(n).ok_or_else(unrecognized)?;
                Some(SyncThreshold::from_wire_value(i64::from(value)).ok_or_else(unrecognized)?)
            }
        };

        self.transact(|s| {
            s.synctrace_scope = scope;
            match setting {
                Some(threshold) => {
                    s.synctrace_enabled = true;
                    s.synctrace_threshold = threshold;
                }
                None => s.synctrace_enabled = false,
            }
            Ok(Applied::Done)
        })
    }

    /// `on`, `off`, a size `N` or a range `N-M` of allocation sizes.
    pub fn set_heaptrace(&mut self, spec: Option<&str>) -> Result<Applied> {
        self.ensure_closed()?;
        let mode = match spec {
            Some("off") => None,
            None | Some("") | Some("on") => Some("on".to_string()),
            Some(s) if s.starts_with(|c: char| c.is_ascii_digit()) => {
                let bad_range =
                    || ControlError::Invalid(format!("Incorrect range in heap trace parameter '{}'", s));
                match s.split_once('-') {
                    Some((lo, hi)) => {
                        let lo = parse_number(lo).ok_or_else(bad_range)?;
                        let hi = parse_number(hi).ok_or_else(bad_range)?;
                        if hi < lo {
                            return Err(bad_range());
                        }
                    }
                    None => {
                        parse_number(s).ok_or_else(bad_range)?;
                    }
                }
                Some(s.to_string())
            }
            Some(s) => return Err(ControlError::unrecognized("heap tracing parameter", s)),
        };
        self.transact(|s| {
            s.heaptrace_mode = mode;
            Ok(Applied::Done)
        })
    }

    pub fn set_iotrace(&mut self, spec: Option<&str>) -> Result<Applied> {
        self.ensure_closed()?;
        let on = on_off(spec, "I/O tracing parameter")?;
        self.transact(|s| {
            s.iotrace_enabled = on;
            Ok(Applied::Done)
        })
    }

    /// `on`, `static` or `off`.
    ///
    /// Turning counting on drops everything that was only enabled by
    /// default: clock profiling, periodic samples and the default counters.
    pub fn set_count(&mut self, spec: Option<&str>) -> Result<Applied> {
        self.ensure_closed()?;
        let mode = match spec {
            None | Some("") | Some("off") => CountMode::Off,
            Some("on") => CountMode::Dynamic,
            Some("static") => CountMode::Static,
            Some(other) => return Err(ControlError::unrecognized("count parameter", other)),
        };
        self.transact(|s| {
            s.count_mode = mode;
            if !mode.is_on() {
                clear_count_flags(s);
                return Ok(Applied::Done);
            }
            if s.sample_default {
                s.sample_period = 0;
            }
            if s.clkprof_default {
                s.clkprof_default = false;
                s.clkprof_enabled = false;
            }
            if s.hwc_default {
                clear_counters(s);
            }
            Ok(Applied::Done)
        })
    }

    /// Add an instrumentation directory (`-I`); requires counting.
    pub fn add_count_instrument_dir(&mut self, dir: &str) -> Result<Applied> {
        self.transact(|s| {
            s.count_instrument_dirs.push(dir.to_string());
            Ok(Applied::Done)
        })
    }

    /// Exclude a library from instrumentation (`-N`); requires counting.
    pub fn add_count_excluded_lib(&mut self, lib: &str) -> Result<Applied> {
        self.transact(|s| {
            s.count_excluded_libs.push(lib.to_string());
            Ok(Applied::Done)
        })
    }

    /// `end`, `start-end` or `-end`, each in seconds with an optional `s`
    /// or `m` suffix.
    pub fn set_time_run(&mut self, spec: Option<&str>) -> Result<Applied> {
        self.ensure_closed()?;
        let spec = spec
            .ok_or_else(|| ControlError::Invalid("time parameter can not be NULL".to_string()))?;
        let unrecognized = || ControlError::unrecognized("time parameter", spec);

        let (start, end) = match spec.split_once('-') {
            Some((start, end)) => (
                Some(parse_seconds(start).ok_or_else(unrecognized)?),
                parse_seconds(end).ok_or_else(unrecognized)?,
            ),
            None => (None, parse_seconds(spec).ok_or_else(unrecognized)?),
        };
        if let Some(start) = start {
            if end != 0 && start >= end {
                return Err(ControlError::Invalid(format!(
                    "Invalid time parameter `{}': start time must be earlier than end time",
                    spec
                )));
            }
        }

        self.transact(|s| {
            if let Some(start) = start {
                s.start_delay = start;
            }
            s.time_run = end;
            Ok(Applied::Done)
        })
    }

    pub fn set_attach_pid(&mut self, spec: &str) -> Result<Applied> {
        self.ensure_closed()?;
        let pid = parse_u32(spec)
            .ok_or_else(|| ControlError::Invalid(format!("Invalid process pid `{}'", spec)))?;
        self.transact(|s| {
            s.attach_pid = Some(pid);
            Ok(Applied::Done)
        })
    }

    /// Replace the counter set with `spec`; `off` disables counters.
    pub fn set_hwc_string(&mut self, spec: Option<&str>) -> Result<Applied> {
        self.ensure_closed()?;
        match spec {
            None | Some("off") => self.disable_hwc().map(|_| Applied::Done),
            Some(spec) => self.apply_counter_spec(spec, false),
        }
    }

    /// Append `spec` to the user's counters, or replace default counters.
    pub fn add_hwc_string(&mut self, spec: Option<&str>) -> Result<Applied> {
        self.ensure_closed()?;
        match spec {
            None | Some("off") => self.disable_hwc().map(|_| Applied::Done),
            Some(spec) => self.apply_counter_spec(spec, true),
        }
    }

    fn apply_counter_spec(&mut self, spec: &str, append: bool) -> Result<Applied> {
        let driver = Arc::clone(&self.driver);
        self.transact(|s| {
            if !append || s.hwc_default {
                s.counters.clear();
            }
            if !spec.is_empty() {
                let min_time = s.clock.counter_min_time_ns(s.clkprof_target);
                let parsed = parse_counter_spec(
                    spec,
                    driver.as_ref(),
                    s.kernel_hwc,
                    min_time,
                    s.counters.remaining(),
                )?;
                for entry in parsed {
                    s.counters.try_push(entry)?;
                }
            }
            driver.validate(s.counters.as_slice(), s.kernel_hwc)?;
            s.hwc_default = false;
            s.hwc_string = Some(canonical_string(s.counters.as_slice()));
            Ok(Applied::Done)
        })
    }

    /// Use the CPU's default counter set at `resolution` (`on`, `lo`, `hi`).
    ///
    /// When clock profiling is still at its default, its interval follows
    /// the chosen resolution.
    pub fn add_default_hwc_string(&mut self, resolution: &str, append: bool) -> Result<Applied> {
        self.ensure_closed()?;
        let kernel = self.settings.kernel_hwc;
        let cpu = self.driver.cpu_name();
        let default_spec = self
            .driver
            .default_counters(kernel)
            .ok_or_else(|| CounterError::NoDefaultSet { cpu: cpu.clone() })?;
        if default_spec.is_empty() {
            return Err(CounterError::DefaultSetUnavailable { cpu }.into());
        }
        let spec = apply_resolution(&default_spec, resolution).ok_or_else(|| {
            CounterError::DefaultSetFormat {
                cpu,
                spec: default_spec.clone(),
            }
        })?;

        let applied = self.apply_counter_spec(&spec, append)?;

        if self.settings.clkprof_default {
            let clock = self.settings.clock;
            let target = match resolution {
                "on" => Some(clock.normal),
                "lo" => Some(clock.low),
                "hi" => Some(clock.high),
                _ => None,
            };
            if let Some(target) = target {
                self.retarget_default_clock(target);
            }
        }
        Ok(applied)
    }

    /// Move the clock target without leaving default clock profiling.
    pub(crate) fn retarget_default_clock(&mut self, target_us: u32) {
        let driver = Arc::clone(&self.driver);
        retarget_clock(&mut self.settings, target_us, driver.as_ref());
    }

    /// Load the CPU's default counters, marking them as defaulted.
    ///
    /// A CPU without a usable default set simply gets none.
    pub fn set_hwc_default(&mut self) {
        let spec = match self.driver.default_counters(self.settings.kernel_hwc) {
            Some(spec) if !spec.is_empty() => spec,
            _ => {
                self.settings.hwc_default = false;
                return;
            }
        };
        match self.add_hwc_string(Some(&spec)) {
            Ok(_) => self.settings.hwc_default = true,
            Err(e) => {
                log::debug!("[Engine] default counters `{}' rejected: {}", spec, e);
                self.settings.hwc_default = false;
            }
        }
    }

    pub fn disable_hwc(&mut self) -> Result<()> {
        self.ensure_closed()?;
        clear_counters(&mut self.settings);
        Ok(())
    }

    /// `on` (one second), `off`, or seconds between periodic samples.
    pub fn set_sample_period(&mut self, spec: Option<&str>) -> Result<Applied> {
        self.ensure_closed()?;
        let period = match spec {
            None | Some("on") => 1,
            Some("off") => 0,
            Some(s) => parse_u32(s)
                .filter(|n| *n > 0)
                .ok_or_else(|| ControlError::unrecognized("sample period", s))?,
        };
        self.transact(|s| {
            s.sample_period = period;
            s.sample_default = false;
            Ok(Applied::Done)
        })
    }

    /// Size limit in megabytes; `unlimited` or `none` removes it.
    pub fn set_size_limit(&mut self, spec: Option<&str>) -> Result<Applied> {
        self.ensure_closed()?;
        let limit = match spec {
            None | Some("") | Some("unlimited") | Some("none") => 0,
            Some(s) => parse_u32(s)
                .filter(|n| *n > 0)
                .ok_or_else(|| ControlError::unrecognized("size limit", s))?,
        };
        self.transact(|s| {
            s.size_limit = limit;
            Ok(Applied::Done)
        })
    }

    /// `on`, `off`, or the path of a Java installation to use.
    pub fn set_java_mode(&mut self, spec: Option<&str>) -> Result<Applied> {
        self.ensure_closed()?;
        enum Java<'a> {
            On,
            Off,
            Path(&'a str),
        }
        let mode = match spec {
            None | Some("") | Some("on") => Java::On,
            Some("off") => Java::Off,
            Some(path) if Path::new(path).is_dir() => Java::Path(path),
            Some(other) => {
                return Err(ControlError::Invalid(format!(
                    "Java-profiling parameter is neither \"on\", nor \"off\", nor is it a directory: `{}'",
                    other
                )))
            }
        };
        self.transact(|s| {
            s.java_default = false;
            match mode {
                Java::On => s.java_enabled = true,
                Java::Off => {
                    s.java_enabled = false;
                    s.java_path = None;
                }
                Java::Path(path) => {
                    s.java_enabled = true;
                    s.java_path = Some(path.to_string());
                }
            }
            Ok(Applied::Done)
        })
    }

    pub fn set_java_path(&mut self, path: &str) -> Result<Applied> {
        self.transact(|s| {
            s.java_path = Some(path.to_string());
            Ok(Applied::Done)
        })
    }

    /// Extra JVM arguments; blank clears them.
    pub fn set_java_args(&mut self, args: Option<&str>) -> Result<Applied> {
        let args = args.filter(|a| !a.trim().is_empty()).map(str::to_string);
        self.transact(|s| {
            s.java_args = args;
            Ok(Applied::Done)
        })
    }

    /// `on`, `all`, `off`, or `=<regex>` matched against descendant names.
    pub fn set_follow_mode(&mut self, spec: Option<&str>) -> Result<Applied> {
        self.ensure_closed()?;
        let (mode, pattern) = match spec {
            None | Some("") | Some("all") | Some("on") => (FollowMode::On, None),
            Some("off") => (FollowMode::None, None),
            Some(s) => {
                let pat = s
                    .strip_prefix('=')
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| ControlError::unrecognized("follow-mode parameter", s))?;
                let anchored = format!("^{}$", pat);
                if let Err(e) = Regex::new(&anchored) {
                    log::debug!("[Engine] follow pattern `{}' rejected: {}", pat, e);
                    return Err(ControlError::unrecognized("follow-mode parameter", s));
                }
                (
                    FollowMode::All,
                    Some(FollowPattern {
                        user: s.to_string(),
                        anchored,
                    }),
                )
            }
        };
        self.transact(|s| {
            s.follow_mode = mode;
            s.follow_default = false;
            s.follow_pattern = pattern;
            Ok(Applied::Done)
        })
    }

    pub fn set_prof_idle(&mut self, spec: Option<&str>) -> Result<Applied> {
        self.ensure_closed()?;
        let on = on_off(spec, "profiling idle cpus parameter")?;
        self.transact(|s| {
            s.prof_idle = on;
            Ok(Applied::Done)
        })
    }

    pub fn set_archive_mode(&mut self, spec: Option<&str>) -> Result<Applied> {
        self.ensure_closed()?;
        let mode = match spec {
            None | Some("") => ArchiveMode::On,
            Some(s) => s
                .parse::<ArchiveMode>()
                .map_err(|_| ControlError::unrecognized("archive-mode parameter", s))?,
        };
        self.transact(|s| {
            s.archive = mode;
            Ok(Applied::Done)
        })
    }

    /// Signal triggering a manual sample; `None` disables it.
    pub fn set_sample_signal(&mut self, signal: Option<i32>) -> Result<Applied> {
        self.ensure_closed()?;
        if let Some(sig) = signal {
            if self.settings.pause_resume.map(|p| p.signal) == Some(sig) {
                return Err(ControlError::SignalConflict(describe_signal(sig)));
            }
            if !is_valid_signal(sig) {
                return Err(ControlError::Invalid(format!("Invalid sample signal {}", sig)));
            }
        }
        self.transact(|s| {
            s.sample_sig = signal;
            Ok(Applied::Done)
        })
    }

    /// Signal toggling collection on and off; `None` disables it.
    pub fn set_pause_resume_signal(&mut self, signal: Option<i32>, start_paused: bool) -> Result<Applied> {
        self.ensure_closed()?;
        if let Some(sig) = signal {
            if self.settings.sample_sig == Some(sig) {
                return Err(ControlError::SignalConflict(describe_signal(sig)));
            }
            if !is_valid_signal(sig) {
                return Err(ControlError::Invalid(format!(
                    "Invalid pause-resume (delayed initialization) signal {}",
                    sig
                )));
            }
        }
        self.transact(|s| {
            s.pause_resume = signal.map(|signal| PauseResume {
                signal,
                start_paused,
            });
            Ok(Applied::Done)
        })
    }

    pub fn set_debug_mode(&mut self, on: bool) -> Result<Applied> {
        self.transact(|s| {
            s.debug = on;
            Ok(Applied::Done)
        })
    }

    pub fn set_target(&mut self, name: Option<&str>) -> Result<()> {
        self.ensure_closed()?;
        self.settings.target_name = name.map(str::to_string);
        Ok(())
    }

    pub fn set_project_home(&mut self, home: Option<&str>) -> Result<()> {
        self.ensure_closed()?;
        if let Some(home) = home {
            self.settings.project_home = Some(home.to_string());
        }
        Ok(())
    }

    /// Store experiments under `dir`.
    pub fn set_directory(&mut self, dir: &str) -> Result<Applied> {
        self.ensure_closed()?;
        let bad = |source: io::Error| NamingError::BadDirectory {
            path: dir.to_string(),
            source,
        };
        let meta = fs::metadata(dir).map_err(bad)?;
        if !meta.is_dir() {
            return Err(bad(io::Error::from_raw_os_error(libc::ENOTDIR)).into());
        }

        self.transact_names(|this| {
            this.settings.user_dir = Some(dir.to_string());
            let warning = this.preprocess_names();
            let reserve = if this.settings.user_expt_name.is_some() || this.config.interactive {
                Reserve {
                    change_msg: true,
                    check_only: true,
                    force_new: false,
                }
            } else {
                Reserve::QUIET
            };
            let note = this.reserve_name(reserve)?;
            Ok(Applied::from_warning(merge_warnings([warning, note])))
        })
    }

    /// Stem of default experiment names (`<stem>.<n>.er`).
    pub fn set_default_stem(&mut self, stem: &str) -> Result<Applied> {
        self.transact_names(|this| {
            this.settings.default_stem = stem.to_string();
            let warning = this.preprocess_names();
            this.reserve_name(Reserve::QUIET)?;
            Ok(Applied::from_warning(warning))
        })
    }

    /// Use an explicit experiment name, or go back to default names.
    ///
    /// With `overwrite` an existing experiment of that name is removed.
    pub fn set_expt(&mut self, name: Option<&str>, overwrite: bool) -> Result<Applied> {
        self.transact_names(|this| {
            let Some(name) = name else {
                this.settings.user_expt_name = None;
                let warning = this.preprocess_names();
                this.reserve_name(Reserve::QUIET)?;
                return Ok(Applied::from_warning(warning));
            };

            let name = canonical_path(name);
            if name.len() < EXPERIMENT_SUFFIX.len() + 1 || !name.ends_with(EXPERIMENT_SUFFIX) {
                return Err(NamingError::BadExperimentSuffix(name).into());
            }
            this.settings.user_expt_name = Some(name);
            let warning = this.preprocess_names();
            this.reserve_name(Reserve {
                change_msg: true,
                check_only: true,
                force_new: overwrite,
            })?;

            if overwrite {
                let path = this.names.store_path().to_string();
                match fs::remove_dir_all(&path) {
                    Ok(()) => log::info!("[Engine] removed existing experiment {}", path),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => log::debug!("[Engine] removing {} failed: {}", path, e),
                }
                if Path::new(&path).exists() {
                    return Err(NamingError::RemoveFailed(path).into());
                }
            }

            let note = this.reserve_name(Reserve {
                change_msg: true,
                check_only: false,
                force_new: false,
            })?;
            Ok(Applied::from_warning(merge_warnings([warning, note])))
        })
    }

    /// Register experiments in a group file; `None` leaves the group.
    pub fn set_group(&mut self, name: Option<&str>) -> Result<Applied> {
        if let Some(group) = name {
            if group.len() < GROUP_SUFFIX.len() + 1 || !group.ends_with(GROUP_SUFFIX) {
                self.ensure_closed()?;
                return Err(NamingError::BadGroupSuffix(group.to_string()).into());
            }
        }
        self.transact_names(|this| {
            this.settings.group = name.map(str::to_string);
            let warning = this.preprocess_names();
            let note = this.reserve_name(Reserve {
                change_msg: true,
                check_only: false,
                force_new: false,
            })?;
            Ok(Applied::from_warning(merge_warnings([warning, note])))
        })
    }
}
