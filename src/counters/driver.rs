//! Hardware-counter driver seam and the generic perf-event catalogue.

use super::entry::{CounterEntry, REG_ANY};
use crate::error::CounterError;
use crate::hardware::CpuInfo;
use std::path::Path;

/// Platform counter knowledge the engine defers to.
pub trait CounterDriver: Send + Sync {
    /// CPU name used in counter-set messages.
    fn cpu_name(&self) -> String;

    /// Default counter specification for this CPU.
    ///
    /// `None` means no default set is defined; an empty string means one is
    /// defined but can not be used on this system.
    fn default_counters(&self, kernel: bool) -> Option<String>;

    /// Template entry for a counter name, without rate or register applied.
    fn lookup(&self, name: &str, kernel: bool) -> Option<CounterEntry>;

    /// Number of counter registers available.
    fn register_count(&self) -> usize;

    /// Cross-counter validation of a complete set.
    fn validate(&self, entries: &[CounterEntry], kernel: bool) -> Result<(), CounterError>;

    /// Overflow value giving roughly `min_time_ns` between overflows.
    fn overflow_for(&self, entry: &CounterEntry, min_time_ns: i64) -> u64;
}

const PERF_TYPE_HARDWARE: u32 = 0;
const PERF_TYPE_RAW: u32 = 4;

/// (user name, perf event name, PERF_COUNT_HW_* config)
const GENERIC_EVENTS: &[(&str, &str, u64)] = &[
    ("cycles", "cpu-cycles", 0),
    ("insts", "instructions", 1),
    ("cache-refs", "cache-references", 2),
    ("cache-misses", "cache-misses", 3),
    ("branch-insts", "branch-instructions", 4),
    ("branch-misses", "branch-misses", 5),
    ("bus-cycles", "bus-cycles", 6),
    ("ref-cycles", "ref-cycles", 9),
];

const DEFAULT_SET: &str = "cycles,,insts,,";

/// Linux generic hardware events through perf_event_open.
#[derive(Debug, Clone)]
pub struct PerfEventDriver {
    cpu_name: String,
    clock_mhz: u32,
    registers: usize,
    available: bool,
}

impl PerfEventDriver {
    pub const REGISTERS: usize = 4;

    /// Driver for `cpu`; counters are usable when the kernel exposes perf
    /// events.
    pub fn new(cpu: &CpuInfo) -> Self {
        let available = Path::new("/proc/sys/kernel/perf_event_paranoid").exists();
        Self::with_availability(cpu, available)
    }

    pub fn with_availability(cpu: &CpuInfo, available: bool) -> Self {
        PerfEventDriver {
            cpu_name: cpu.model_name.clone(),
            clock_mhz: cpu.clock_mhz,
            registers: Self::REGISTERS,
            available,
        }
    }
}

impl CounterDriver for PerfEventDriver {
    fn cpu_name(&self) -> String {
        self.cpu_name.clone()
    }

    fn default_counters(&self, _kernel: bool) -> Option<String> {
        if self.available {
            Some(DEFAULT_SET.to_string())
        } else {
            Some(String::new())
        }
    }

    fn lookup(&self, name: &str, _kernel: bool) -> Option<CounterEntry> {
        if let Some(&(user, internal, config)) = GENERIC_EVENTS
            .iter()
            .find(|(user, internal, _)| *user == name || *internal == name)
        {
            let mut entry = CounterEntry::new(name, internal);
            if name == internal {
                entry.name = user.to_string();
            }
            entry.use_perf_event_type = true;
            entry.perf_type = PERF_TYPE_HARDWARE;
            entry.config = config;
            return Some(entry);
        }

        // raw event: r<hex>
        let raw = name.strip_prefix('r')?;
        let config = u64::from_str_radix(raw, 16).ok()?;
        let mut entry = CounterEntry::new(name, name);
        entry.use_perf_event_type = true;
        entry.perf_type = PERF_TYPE_RAW;
        entry.config = config;
        Some(entry)
    }

    fn register_count(&self) -> usize {
        self.registers
    }

    fn validate(&self, entries: &[CounterEntry], _kernel: bool) -> Result<(), CounterError> {
        if entries.len() > self.registers {
            return Err(CounterError::Rejected(format!(
                "{} counters requested but only {} registers are available on {}",
                entries.len(),
                self.registers,
                self.cpu_name
            )));
        }
        let mut used = vec![false; self.registers];
        for entry in entries.iter().filter(|e| e.reg_num != REG_ANY) {
            let reg = usize::try_from(entry.reg_num)
                .ok()
                .filter(|r| *r < self.registers)
                .ok_or_else(|| {
                    CounterError::Rejected(format!(
                        "counter `{}' can not use register {}",
                        entry.name, entry.reg_num
                    ))
                })?;
            if used[reg] {
                return Err(CounterError::Rejected(format!(
                    "counter `{}' conflicts with another counter on register {}",
                    entry.name, reg
                )));
            }
            used[reg] = true;
        }
        Ok(())
    }

    fn overflow_for(&self, _entry: &CounterEntry, min_time_ns: i64) -> u64 {
        // assume about one event per cycle
        let mhz = if self.clock_mhz == 0 { 1000 } else { self.clock_mhz };
        let events = i128::from(mhz) * i128::from(min_time_ns.max(0)) / 1000;
        u64::try_from(events).unwrap_or(u64::MAX).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver() -> PerfEventDriver {
        let cpu = CpuInfo {
            clock_mhz: 2000,
            ..CpuInfo::default()
        };
        PerfEventDriver::with_availability(&cpu, true)
    }

    #[test]
    fn test_lookup_by_user_and_internal_name() {
        let d = driver();
        let by_user = d.lookup("insts", false).unwrap();
        assert_eq!(by_user.int_name, "instructions");
        assert_eq!(by_user.config, 1);
        let by_internal = d.lookup("instructions", false).unwrap();
        assert_eq!(by_internal.name, "insts");
        assert!(d.lookup("bogus", false).is_none());
    }

    #[test]
    fn test_lookup_raw_event() {
        let entry = driver().lookup("r1c2", false).unwrap();
        assert_eq!(entry.perf_type, PERF_TYPE_RAW);
        assert_eq!(entry.config, 0x1c2);
    }

    #[test]
    fn test_default_counters_availability() {
        assert_eq!(driver().default_counters(false).as_deref(), Some(DEFAULT_SET));
        let off = PerfEventDriver::with_availability(&CpuInfo::default(), false);
        assert_eq!(off.default_counters(false).as_deref(), Some(""));
    }

    #[test]
    fn test_validate_register_conflicts() {
        let d = driver();
        let mut a = d.lookup("cycles", false).unwrap();
        let mut b = d.lookup("insts", false).unwrap();
        a.reg_num = 1;
        b.reg_num = 1;
        assert!(d.validate(&[a.clone(), b.clone()], false).is_err());
        b.reg_num = 2;
        assert!(d.validate(&[a.clone(), b], false).is_ok());
        a.reg_num = 7;
        assert!(d.validate(&[a], false).is_err());
    }

    #[test]
    fn test_validate_register_count() {
        let d = driver();
        let entries: Vec<_> = (0..5).map(|_| d.lookup("cycles", false).unwrap()).collect();
        assert!(d.validate(&entries, false).is_err());
    }

    #[test]
    fn test_overflow_scales_with_clock() {
        let d = driver();
        let entry = d.lookup("cycles", false).unwrap();
        assert_eq!(d.overflow_for(&entry, 1_000_000), 2_000_000);
        assert_eq!(d.overflow_for(&entry, 0), 1);
    }
}
