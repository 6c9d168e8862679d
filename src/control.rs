//! Named controls: the string interface used by front ends.
//!
//! A control is addressed by any non-empty prefix of its name; the first
//! match in table order wins, so `s` means `sample`.

use crate::engine::CollectorControl;
use crate::error::{ControlError, Result};
use crate::models::{Applied, ArchiveMode, CountMode, FollowMode, SyncThreshold};
use crate::signals::{find_signal, signal_name};
use std::fmt;

/// Returned by the string entry points for a name matching no control.
pub const UNKNOWN_CONTROL: &str = "Unknown control";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlId {
    ExpLimit,
    TimeLimit,
    ArchExp,
    Descendant,
    ProfIdle,
    ClkProf,
    HwcProf,
    Hwc2Prof,
    JavaProf,
    Sample,
    SampleSig,
    PauseResumeSig,
    SyncTrace,
    HeapTrace,
    IoTrace,
    Count,
}

impl ControlId {
    /// Lookup order.
    pub const ALL: [ControlId; 16] = [
        ControlId::ExpLimit,
        ControlId::TimeLimit,
        ControlId::ArchExp,
        ControlId::Descendant,
        ControlId::ProfIdle,
        ControlId::ClkProf,
        ControlId::HwcProf,
        ControlId::Hwc2Prof,
        ControlId::JavaProf,
        ControlId::Sample,
        ControlId::SampleSig,
        ControlId::PauseResumeSig,
        ControlId::SyncTrace,
        ControlId::HeapTrace,
        ControlId::IoTrace,
        ControlId::Count,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ControlId::ExpLimit => "exp_limit",
            ControlId::TimeLimit => "time_limit",
            ControlId::ArchExp => "arch_exp",
            ControlId::Descendant => "descendant",
            ControlId::ProfIdle => "prof_idle",
            ControlId::ClkProf => "clkprof",
            ControlId::HwcProf => "hwcprof",
            ControlId::Hwc2Prof => "hwc2_prof",
            ControlId::JavaProf => "javaprof",
            ControlId::Sample => "sample",
            ControlId::SampleSig => "sample_sig",
            ControlId::PauseResumeSig => "pause_resume_sig",
            ControlId::SyncTrace => "synctrace",
            ControlId::HeapTrace => "heaptrace",
            ControlId::IoTrace => "iotrace",
            ControlId::Count => "count",
        }
    }

    /// First control whose name starts with `prefix`.
    pub fn lookup(prefix: &str) -> Option<ControlId> {
        if prefix.is_empty() {
            return None;
        }
        ControlId::ALL
            .iter()
            .copied()
            .find(|id| id.name().starts_with(prefix))
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn on_off(on: bool) -> String {
    if on { "on" } else { "off" }.to_string()
}

/// Split `"<signal>\n<state>"`; a non-zero state starts paused.
fn parse_pause_resume(value: &str) -> std::result::Result<(Option<i32>, bool), String> {
    let (signal, state) = match value.split_once('\n') {
        Some((signal, state)) => (signal, state.trim()),
        None => (value, ""),
    };
    let signal = find_signal(signal)?;
    let paused = !state.is_empty() && state.parse::<i64>().map(|n| n != 0).unwrap_or(false);
    Ok((signal, paused))
}

impl CollectorControl {
    /// Current value of a control for display.
    pub fn get_control(&self, id: ControlId) -> String {
        let s = self.settings();
        match id {
            ControlId::ExpLimit => match s.size_limit {
                0 => "unlimited".to_string(),
                mb => mb.to_string(),
            },
            ControlId::TimeLimit => match (s.start_delay, s.time_run) {
                (0, 0) => "unlimited".to_string(),
                (start, end) => format!("{}s-{}s", start, end),
            },
            ControlId::ArchExp => s.archive.to_string(),
            ControlId::Descendant => on_off(s.follow_mode != FollowMode::None),
            ControlId::ProfIdle => on_off(s.prof_idle),
            ControlId::ClkProf => {
                if s.clkprof_default && s.clkprof_enabled {
                    String::new()
                } else if !s.clkprof_enabled {
                    "off".to_string()
                } else {
                    (s.clkprof_timer / 1000).to_string()
                }
            }
            ControlId::HwcProf | ControlId::Hwc2Prof => {
                if s.counters.is_empty() {
                    "off".to_string()
                } else {
                    match &s.hwc_string {
                        Some(spec) => format!("on\n{}", spec),
                        None => "on".to_string(),
                    }
                }
            }
            ControlId::JavaProf => on_off(s.java_enabled),
            ControlId::Sample => {
                if s.sample_default && s.sample_period == 1 {
                    String::new()
                } else if s.sample_period == 0 {
                    "off".to_string()
                } else {
                    s.sample_period.to_string()
                }
            }
            ControlId::SampleSig => match s.sample_sig {
                None => "off".to_string(),
                Some(sig) => signal_name(sig).unwrap_or_else(|| format!("Invalid sample signal {}", sig)),
            },
            ControlId::PauseResumeSig => match s.pause_resume {
                None => "off".to_string(),
                Some(pr) => signal_name(pr.signal)
                    .unwrap_or_else(|| format!("Invalid pause/resume signal {}", pr.signal)),
            },
            ControlId::SyncTrace => {
                if !s.synctrace_enabled {
                    "off".to_string()
                } else {
                    format!("on\nthreshold: {}", s.synctrace_threshold)
                }
            }
            ControlId::HeapTrace => on_off(s.heaptrace_mode.is_some()),
            ControlId::IoTrace => on_off(s.iotrace_enabled),
            ControlId::Count => match s.count_mode {
                CountMode::Off => "off".to_string(),
                CountMode::Static => "on\nstatic".to_string(),
                CountMode::Dynamic => "on".to_string(),
            },
        }
    }

    /// Set a control from its string form.
    pub fn set_control(&mut self, id: ControlId, value: Option<&str>) -> Result<Applied> {
        self.ensure_closed()?;
        match id {
            ControlId::ExpLimit => self.set_size_limit(value),
            ControlId::TimeLimit => self.set_time_run(value),
            ControlId::ArchExp => self.set_archive_mode(value),
            ControlId::Descendant => self.set_follow_mode(value),
            ControlId::ProfIdle => self.set_prof_idle(value),
            ControlId::ClkProf => self.set_clkprof(value),
            ControlId::HwcProf | ControlId::Hwc2Prof => self.set_hwc_string(value),
            ControlId::JavaProf => self.set_java_mode(value),
            ControlId::Sample => self.set_sample_period(value),
            ControlId::SampleSig => {
                let signal = find_signal(value.unwrap_or("off")).map_err(ControlError::Invalid)?;
                self.set_sample_signal(signal)
            }
            ControlId::PauseResumeSig => {
                let (signal, paused) =
                    parse_pause_resume(value.unwrap_or("off")).map_err(ControlError::Invalid)?;
                self.set_pause_resume_signal(signal, paused)
            }
            ControlId::SyncTrace => self.set_synctrace(value),
            ControlId::HeapTrace => self.set_heaptrace(value),
            ControlId::IoTrace => self.set_iotrace(value),
            ControlId::Count => self.set_count(value),
        }
    }

    /// Restore a control's default.
    pub fn unset_control(&mut self, id: ControlId) -> Result<()> {
        self.ensure_closed()?;
        if matches!(id, ControlId::HwcProf | ControlId::Hwc2Prof) {
            self.disable_hwc()?;
            if self.config().default_hwc {
                self.set_hwc_default();
            }
            return Ok(());
        }

        let java_default = self.config().java_profiling;
        self.transact(|s| {
            match id {
                ControlId::ExpLimit => s.size_limit = 0,
                ControlId::TimeLimit => {
                    s.time_run = 0;
                    s.start_delay = 0;
                }
                ControlId::ArchExp => s.archive = ArchiveMode::On,
                ControlId::Descendant => {
                    s.follow_mode = FollowMode::On;
                    s.follow_default = true;
                    s.follow_pattern = None;
                }
                ControlId::ProfIdle => s.prof_idle = true,
                ControlId::ClkProf => {
                    s.clkprof_enabled = true;
                    s.clkprof_default = true;
                }
                ControlId::HwcProf | ControlId::Hwc2Prof => {}
                ControlId::JavaProf => {
                    s.java_enabled = java_default;
                    s.java_default = true;
                    s.java_path = None;
                    s.java_args = None;
                }
                ControlId::Sample => {
                    s.sample_period = 1;
                    s.sample_default = true;
                }
                ControlId::SampleSig => s.sample_sig = None,
                ControlId::PauseResumeSig => s.pause_resume = None,
                ControlId::SyncTrace => {
                    s.synctrace_enabled = false;
                    s.synctrace_threshold = SyncThreshold::Calibrate;
                }
                ControlId::HeapTrace => s.heaptrace_mode = None,
                ControlId::IoTrace => s.iotrace_enabled = false,
                ControlId::Count => {
                    s.count_mode = CountMode::Off;
                    s.count_instrument_dirs.clear();
                    s.count_excluded_libs.clear();
                }
            }
            Ok(Applied::Done)
        })?;
        if id == ControlId::ClkProf {
            let normal = self.settings().clock.normal;
            self.retarget_default_clock(normal);
        }
        Ok(())
    }
}

/// Display value of the named control, or [`UNKNOWN_CONTROL`].
pub fn get(engine: &CollectorControl, name: &str) -> String {
    match ControlId::lookup(name) {
        Some(id) => engine.get_control(id),
        None => UNKNOWN_CONTROL.to_string(),
    }
}

/// Set the named control. `None` when applied silently, otherwise the
/// warning or error message.
pub fn set(engine: &mut CollectorControl, name: &str, value: Option<&str>) -> Option<String> {
    let Some(id) = ControlId::lookup(name) else {
        return Some(UNKNOWN_CONTROL.to_string());
    };
    match engine.set_control(id, value) {
        Ok(applied) => applied.into_warning(),
        Err(e) => {
            log::debug!("[Control] set {}: {}", id, e);
            Some(e.to_string())
        }
    }
}

/// Restore the named control's default. `None` on success.
pub fn unset(engine: &mut CollectorControl, name: &str) -> Option<String> {
    let Some(id) = ControlId::lookup(name) else {
        return Some(UNKNOWN_CONTROL.to_string());
    };
    engine.unset_control(id).err().map(|e| e.to_string())
}
