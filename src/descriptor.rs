//! Data descriptor handed to the collection runtime.
//!
//! One `;`-terminated token per active setting, keyed by a single letter.
//! The sample signal precedes the pause/resume signal, which precedes the
//! clock interval: the runtime processes them in that order. Tokens are only
//! ever appended to this grammar, never reordered.

use crate::engine::CollectionSettings;
use crate::error::DescriptorError;
use crate::models::FollowMode;
use std::fmt::Write;

/// Serialize a settings snapshot.
pub fn build(s: &CollectionSettings) -> String {
    let mut desc = String::new();

    if let Some(home) = &s.project_home {
        let _ = write!(desc, "P:{};", home);
    }
    if let Some(sig) = s.sample_sig {
        let _ = write!(desc, "g:{};", sig);
    }
    if let Some(pr) = &s.pause_resume {
        let _ = write!(desc, "d:{}{};", pr.signal, if pr.start_paused { "p" } else { "" });
    }
    if s.clkprof_enabled {
        let _ = write!(desc, "p:{};", s.clkprof_timer);
    }
    if s.synctrace_enabled {
        let _ = write!(
            desc,
            "s:{},{};",
            s.synctrace_threshold.wire_value(),
            s.synctrace_scope.bits()
        );
    }
    if let Some(mode) = &s.heaptrace_mode {
        let _ = write!(desc, "H:{};", mode);
    }
    if s.iotrace_enabled {
        desc.push_str("i:;");
    }
    if !s.counters.is_empty() {
        desc.push_str("h:");
        if s.hwc_default {
            desc.push('*');
        }
        for (tag, h) in s.counters.iter().enumerate() {
            if tag > 0 {
                desc.push(',');
            }
            let _ = write!(
                desc,
                "{}:{}:{}:{}:{}:{}:{}:{}:m{}:{}:{}:0x{:x}",
                u8::from(h.use_perf_event_type),
                h.perf_type,
                h.config,
                h.config1,
                if h.name != h.int_name { h.name.as_str() } else { "" },
                h.int_name,
                h.reg_num,
                h.val,
                h.effective_min_time(),
                tag,
                h.timecvt,
                h.memop
            );
        }
        desc.push(';');
    }
    if s.time_run != 0 || s.start_delay != 0 {
        if s.start_delay != 0 {
            let _ = write!(desc, "t:{}:{};", s.start_delay, s.time_run);
        } else {
            let _ = write!(desc, "t:{};", s.time_run);
        }
    }
    if s.sample_period != 0 {
        let _ = write!(desc, "S:{};", s.sample_period);
    }
    if s.size_limit != 0 {
        let _ = write!(desc, "L:{};", s.size_limit);
    }
    if s.java_enabled {
        desc.push_str("j:1;");
    }
    if s.follow_mode != FollowMode::None {
        let _ = write!(desc, "F:{};", s.follow_mode.wire_code());
    }
    let _ = write!(desc, "a:{};", s.archive);

    log::trace!("[Descriptor] {}", desc);
    desc
}

/// One counter as read back from an `h:` token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterField {
    pub name: String,
    pub int_name: String,
    pub reg_num: i32,
    pub val: u64,
    pub min_time: i64,
}

/// Settings recovered from a descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorSummary {
    pub project_home: Option<String>,
    pub sample_sig: Option<i32>,
    /// Signal and start-paused flag.
    pub pause_resume: Option<(i32, bool)>,
    pub clock_us: Option<u32>,
    /// Threshold wire value and scope bits.
    pub synctrace: Option<(i64, u32)>,
    pub heaptrace: Option<String>,
    pub iotrace: bool,
    pub hwc_default: bool,
    pub counters: Vec<CounterField>,
    /// Start delay and end time.
    pub time: Option<(u32, u32)>,
    pub sample_period: Option<u32>,
    pub size_limit: Option<u32>,
    pub java: bool,
    pub follow: Option<FollowMode>,
    pub archive: Option<String>,
}

/// Which kinds of data a configuration collects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Toggles {
    pub clock: bool,
    pub counters: bool,
    pub synctrace: bool,
    pub heaptrace: bool,
    pub iotrace: bool,
    pub java: bool,
    pub follow: bool,
    pub sampling: bool,
    pub sample_sig: bool,
    pub pause_resume: bool,
    pub duration: bool,
    pub size_limit: bool,
}

impl Toggles {
    pub fn from_settings(s: &CollectionSettings) -> Self {
        Toggles {
            clock: s.clkprof_enabled,
            counters: !s.counters.is_empty(),
            synctrace: s.synctrace_enabled,
            heaptrace: s.heaptrace_mode.is_some(),
            iotrace: s.iotrace_enabled,
            java: s.java_enabled,
            follow: s.follow_mode != FollowMode::None,
            sampling: s.sample_period != 0,
            sample_sig: s.sample_sig.is_some(),
            pause_resume: s.pause_resume.is_some(),
            duration: s.time_run != 0 || s.start_delay != 0,
            size_limit: s.size_limit != 0,
        }
    }
}

impl DescriptorSummary {
    pub fn toggles(&self) -> Toggles {
        Toggles {
            clock: self.clock_us.is_some(),
            counters: !self.counters.is_empty(),
            synctrace: self.synctrace.is_some(),
            heaptrace: self.heaptrace.is_some(),
            iotrace: self.iotrace,
            java: self.java,
            follow: self.follow.is_some(),
            sampling: self.sample_period.is_some(),
            sample_sig: self.sample_sig.is_some(),
            pause_resume: self.pause_resume.is_some(),
            duration: self.time.is_some(),
            size_limit: self.size_limit.is_some(),
        }
    }
}

fn number<T: std::str::FromStr>(value: &str, token: &str) -> Result<T, DescriptorError> {
    value
        .parse()
        .map_err(|_| DescriptorError::Malformed(token.to_string()))
}

fn parse_counter(field: &str, token: &str) -> Result<CounterField, DescriptorError> {
    let parts: Vec<&str> = field.split(':').collect();
    if parts.len() != 12 {
        return Err(DescriptorError::Malformed(token.to_string()));
    }
    let int_name = parts[5].to_string();
    let name = if parts[4].is_empty() {
        int_name.clone()
    } else {
        parts[4].to_string()
    };
    let min_time = parts[8]
        .strip_prefix('m')
        .ok_or_else(|| DescriptorError::Malformed(token.to_string()))?;
    Ok(CounterField {
        name,
        int_name,
        reg_num: number(parts[6], token)?,
        val: number(parts[7], token)?,
        min_time: number(min_time, token)?,
    })
}

/// Read a descriptor back into its settings.
pub fn parse(desc: &str) -> Result<DescriptorSummary, DescriptorError> {
    let mut summary = DescriptorSummary::default();

    for token in desc.split(';').filter(|t| !t.is_empty()) {
        let (key, value) = token
            .split_once(':')
            .ok_or_else(|| DescriptorError::Malformed(token.to_string()))?;
        match key {
            "P" => summary.project_home = Some(value.to_string()),
            "g" => summary.sample_sig = Some(number(value, token)?),
            "d" => {
                let (sig, paused) = match value.strip_suffix('p') {
                    Some(sig) => (sig, true),
                    None => (value, false),
                };
                summary.pause_resume = Some((number(sig, token)?, paused));
            }
            "p" => summary.clock_us = Some(number(value, token)?),
            "s" => {
                let (thresh, scope) = value
                    .split_once(',')
                    .ok_or_else(|| DescriptorError::Malformed(token.to_string()))?;
                summary.synctrace = Some((number(thresh, token)?, number(scope, token)?));
            }
            "H" => summary.heaptrace = Some(value.to_string()),
            "i" => summary.iotrace = true,
            "h" => {
                let list = match value.strip_prefix('*') {
                    Some(rest) => {
                        summary.hwc_default = true;
                        rest
                    }
                    None => value,
                };
                summary.counters = list
                    .split(',')
                    .map(|field| parse_counter(field, token))
                    .collect::<Result<_, _>>()?;
            }
            "t" => {
                summary.time = Some(match value.split_once(':') {
                    Some((start, end)) => (number(start, token)?, number(end, token)?),
                    None => (0, number(value, token)?),
                });
            }
            "S" => summary.sample_period = Some(number(value, token)?),
            "L" => summary.size_limit = Some(number(value, token)?),
            "j" => summary.java = number::<u32>(value, token)? != 0,
            "F" => {
                let code = number(value, token)?;
                summary.follow = Some(
                    FollowMode::from_wire_code(code)
                        .ok_or_else(|| DescriptorError::Malformed(token.to_string()))?,
                );
            }
            "a" => summary.archive = Some(value.to_string()),
            other => return Err(DescriptorError::UnknownKey(other.to_string())),
        }
    }
    Ok(summary)
}
