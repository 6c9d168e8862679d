//! Profiling interval-timer calibration.
//!
//! The OS may not honour arbitrary clock-profiling intervals. Once per
//! process the profiling timer is armed at a deliberately odd interval and
//! read back; the result selects the clamp table that governs every later
//! clock-profiling request and every hardware-counter default overflow time.
//!
//! `clock_params()` is the access point: the first call performs the probe
//! and caches the table, later calls return the cached copy. The probe runs
//! before any engine exists, so no collection signal handlers are disturbed.

use crate::error::CalibrationError;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use once_cell::sync::Lazy;

/// Probe interval in microseconds; not a round number so rounding shows.
pub const PROBE_INTERVAL_US: i64 = 997;

pub const PROFINT_MIN: u32 = 500;
pub const PROFINT_MAX: u32 = 1_000_000;
pub const PROFINT_HIGH: u32 = 1_000;
pub const PROFINT_NORM: u32 = 10_000;
pub const PROFINT_LOW: u32 = 100_000;

/// Counter overflow times (ns) for the `on`, `lo` and `hi` presets. Fixed so
/// they stay stable whatever the calibrated clock values are.
pub const HWCTIME_ON: i64 = 1_000_000;
pub const HWCTIME_LO: i64 = 10_000_000;
pub const HWCTIME_HI: i64 = 100_000;

/// Calibrated clock-profiling limits, all in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockParams {
    pub min: u32,
    pub resolution: u32,
    pub max: u32,
    pub high: u32,
    pub normal: u32,
    pub low: u32,
}

impl ClockParams {
    /// Arbitrary microsecond precision.
    pub const PRECISE: ClockParams = ClockParams {
        min: PROFINT_MIN,
        resolution: 1,
        max: PROFINT_MAX,
        high: PROFINT_HIGH,
        normal: PROFINT_NORM,
        low: PROFINT_LOW,
    };

    /// Only 10ms ticks are available.
    pub const COARSE: ClockParams = ClockParams {
        min: 10_000,
        resolution: 10_000,
        max: PROFINT_MAX,
        high: 1_000,
        normal: 10_000,
        low: 100_000,
    };

    /// Pick the table for the interval the OS reported back.
    pub fn from_observed(requested_us: i64, observed_us: i64) -> ClockParams {
        if observed_us == requested_us {
            ClockParams::PRECISE
        } else if observed_us > 0 && observed_us < 10_000 {
            ClockParams {
                min: observed_us as u32,
                resolution: 1_000,
                max: PROFINT_MAX,
                high: 1_000,
                normal: 10_000,
                low: 100_000,
            }
        } else {
            ClockParams::COARSE
        }
    }

    /// Minimum counter overflow time (ns) matching a clock-profiling target.
    pub fn counter_min_time_ns(&self, target_us: u32) -> i64 {
        if target_us == self.normal {
            HWCTIME_ON
        } else if target_us == self.low {
            HWCTIME_LO
        } else if target_us == self.high {
            HWCTIME_HI
        } else {
            1000 * i64::from(target_us)
        }
    }

    /// Fit a requested interval to the table, collecting a warning for each
    /// adjustment made.
    pub fn fit(&self, requested_us: u32) -> (u32, Vec<String>) {
        let mut warnings = Vec::new();
        let mut value = requested_us;

        if value < self.min {
            warnings.push(format!(
                "Warning: Clock profiling at {} millisec. interval is not supported on this system; minimum {} millisec. used",
                millis(value),
                millis(self.min)
            ));
            value = self.min;
        }
        if value > self.max {
            warnings.push(format!(
                "Clock profiling at {} millisec. interval is not supported on this system; maximum {} millisec. used",
                millis(value),
                millis(self.max)
            ));
            value = self.max;
        }
        if value > self.resolution {
            let ticks = (value / self.resolution) * self.resolution;
            if ticks != value {
                warnings.push(format!(
                    "Clock profile interval rounded from {} to {} (system resolution = {}) millisec.",
                    millis(value),
                    millis(ticks),
                    millis(self.resolution)
                ));
                value = ticks;
            }
        }
        (value, warnings)
    }

    /// Clamp a target interval into the range counters can follow.
    pub fn clamp_target(requested_us: u32) -> u32 {
        requested_us.clamp(PROFINT_MIN, PROFINT_MAX)
    }
}

/// Format microseconds as milliseconds with three decimals.
pub fn millis(us: u32) -> String {
    format!("{:.3}", f64::from(us) / 1000.0)
}

/// Requested clock-profiling setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockRequest {
    Off,
    Interval(u32),
}

/// Parse a clock-profiling value: `off`, `on`, `lo[w]`, `hi[gh]`/`h`, or a
/// number with an optional `m` (milliseconds, the default) or `u`
/// (microseconds) suffix.
pub fn parse_clock_request(spec: Option<&str>, params: &ClockParams) -> Result<ClockRequest, String> {
    let spec = match spec {
        None | Some("on") => return Ok(ClockRequest::Interval(params.normal)),
        Some(s) => s,
    };
    if spec.starts_with('+') {
        return Err(
            "Warning: clock-based memoryspace and dataspace profiling is no longer supported"
                .to_string(),
        );
    }
    match spec {
        "off" => return Ok(ClockRequest::Off),
        "lo" | "low" => return Ok(ClockRequest::Interval(params.low)),
        "hi" | "high" | "h" => return Ok(ClockRequest::Interval(params.high)),
        _ => {}
    }

    let unrecognized = || format!("Unrecognized clock-profiling interval `{}'", spec);
    let split = spec
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(spec.len());
    let (number, suffix) = spec.split_at(split);
    let value: f64 = number.parse().map_err(|_| unrecognized())?;
    let micros = match suffix {
        "" | "m" => value * 1000.0,
        "u" => value,
        _ => return Err(unrecognized()),
    };
    let micros = (micros + 0.5) as i64;
    if micros <= 0 || micros > i64::from(u32::MAX) {
        return Err(unrecognized());
    }
    Ok(ClockRequest::Interval(micros as u32))
}

static CLOCK_PARAMS: Lazy<ClockParams> = Lazy::new(|| match calibrate() {
    Ok(params) => {
        log::debug!("[Timer] calibrated clock parameters: {:?}", params);
        params
    }
    Err(e) => {
        log::warn!("[Timer] calibration failed ({}); using 10ms resolution", e);
        ClockParams::COARSE
    }
});

/// Process-wide calibrated clamp table.
pub fn clock_params() -> ClockParams {
    *CLOCK_PARAMS
}

/// Probe the profiling timer resolution.
///
/// `SIGPROF` is ignored for the duration. The previous handler is put back
/// unless it was the default one: a stray SIGPROF from the probe must not
/// terminate the process.
pub fn calibrate() -> Result<ClockParams, CalibrationError> {
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::SA_RESTART, SigSet::empty());
    // SAFETY: SIG_IGN installs no Rust code as a handler.
    let previous = unsafe { sigaction(Signal::SIGPROF, &ignore) }
        .map_err(CalibrationError::InstallHandler)?;

    let observed = probe_interval(PROBE_INTERVAL_US);

    if previous.handler() != SigHandler::SigDfl {
        // SAFETY: reinstates exactly the disposition that was in place.
        unsafe { sigaction(Signal::SIGPROF, &previous) }
            .map_err(CalibrationError::RestoreHandler)?;
    }
    Ok(ClockParams::from_observed(PROBE_INTERVAL_US, observed))
}

/// Arm and immediately disarm `ITIMER_PROF`, returning the interval the
/// kernel stored, or -1 when the timer calls fail.
fn probe_interval(requested_us: i64) -> i64 {
    let interval = libc::timeval {
        tv_sec: (requested_us / 1_000_000) as libc::time_t,
        tv_usec: (requested_us % 1_000_000) as libc::suseconds_t,
    };
    let mut timer = libc::itimerval {
        it_interval: interval,
        it_value: interval,
    };
    let mut previous = libc::itimerval {
        it_interval: libc::timeval { tv_sec: 0, tv_usec: 0 },
        it_value: libc::timeval { tv_sec: 0, tv_usec: 0 },
    };

    // SAFETY: both pointers refer to live, properly initialised itimervals.
    unsafe {
        libc::setitimer(libc::ITIMER_PROF, &timer, &mut previous);
    }
    timer.it_value = libc::timeval { tv_sec: 0, tv_usec: 0 };
    // SAFETY: as above.
    let rc = unsafe { libc::setitimer(libc::ITIMER_PROF, &timer, &mut previous) };
    if rc == -1 {
        return -1;
    }
    previous.it_interval.tv_sec as i64 * 1_000_000 + previous.it_interval.tv_usec as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_resolution_selects_precise_table() {
        assert_eq!(ClockParams::from_observed(997, 997), ClockParams::PRECISE);
    }

    #[test]
    fn test_high_resolution_table_uses_observed_minimum() {
        let params = ClockParams::from_observed(997, 1000);
        assert_eq!(params.min, 1000);
        assert_eq!(params.resolution, 1000);
        assert_eq!(params.normal, 10_000);
    }

    #[test]
    fn test_coarse_and_failed_probe_select_coarse_table() {
        assert_eq!(ClockParams::from_observed(997, 10_000), ClockParams::COARSE);
        assert_eq!(ClockParams::from_observed(997, -1), ClockParams::COARSE);
    }

    #[test]
    fn test_counter_min_time_presets() {
        let p = ClockParams::PRECISE;
        assert_eq!(p.counter_min_time_ns(p.normal), HWCTIME_ON);
        assert_eq!(p.counter_min_time_ns(p.low), HWCTIME_LO);
        assert_eq!(p.counter_min_time_ns(p.high), HWCTIME_HI);
        assert_eq!(p.counter_min_time_ns(2_500), 2_500_000);
    }

    #[test]
    fn test_fit_raises_to_minimum() {
        let (value, warnings) = ClockParams::PRECISE.fit(100);
        assert_eq!(value, PROFINT_MIN);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("minimum 0.500 millisec."));
    }

    #[test]
    fn test_fit_lowers_to_maximum() {
        let (value, warnings) = ClockParams::PRECISE.fit(5_000_000);
        assert_eq!(value, PROFINT_MAX);
        assert!(warnings[0].contains("maximum 1000.000 millisec."));
    }

    #[test]
    fn test_fit_rounds_down_to_resolution() {
        let (value, warnings) = ClockParams::COARSE.fit(25_000);
        assert_eq!(value, 20_000);
        assert!(warnings[0].starts_with("Clock profile interval rounded from 25.000 to 20.000"));
    }

    #[test]
    fn test_fit_exact_value_no_warning() {
        let (value, warnings) = ClockParams::COARSE.fit(30_000);
        assert_eq!(value, 30_000);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_parse_clock_request_keywords() {
        let p = ClockParams::PRECISE;
        assert_eq!(parse_clock_request(None, &p), Ok(ClockRequest::Interval(p.normal)));
        assert_eq!(parse_clock_request(Some("off"), &p), Ok(ClockRequest::Off));
        assert_eq!(parse_clock_request(Some("hi"), &p), Ok(ClockRequest::Interval(p.high)));
        assert_eq!(parse_clock_request(Some("low"), &p), Ok(ClockRequest::Interval(p.low)));
    }

    #[test]
    fn test_parse_clock_request_units() {
        let p = ClockParams::PRECISE;
        assert_eq!(parse_clock_request(Some("2"), &p), Ok(ClockRequest::Interval(2_000)));
        assert_eq!(parse_clock_request(Some("1.5m"), &p), Ok(ClockRequest::Interval(1_500)));
        assert_eq!(parse_clock_request(Some("750u"), &p), Ok(ClockRequest::Interval(750)));
    }

    #[test]
    fn test_parse_clock_request_errors() {
        let p = ClockParams::PRECISE;
        assert!(parse_clock_request(Some("+on"), &p).is_err());
        assert!(parse_clock_request(Some("10s"), &p).is_err());
        assert!(parse_clock_request(Some("0"), &p).is_err());
        assert!(parse_clock_request(Some("abc"), &p).is_err());
    }

    #[test]
    fn test_clock_params_is_stable() {
        assert_eq!(clock_params(), clock_params());
    }
}
