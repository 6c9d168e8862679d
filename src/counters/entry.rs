//! Hardware-counter entries and the bounded counter table.

use crate::error::CounterError;
use crate::timer::{HWCTIME_HI, HWCTIME_LO, HWCTIME_ON};

/// Maximum number of counters in one experiment.
pub const MAX_COUNTERS: usize = 20;

/// Register number meaning "any register".
pub const REG_ANY: i32 = -1;

/// Minimum-time marker: follow the clock-profiling target.
pub const HWCTIME_TBD: i64 = -1;

/// Overflow rate as written in a counter specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rate {
    /// Empty field: derived from the clock-profiling target.
    Auto,
    On,
    High,
    Low,
    /// An explicit overflow count.
    Count(u64),
}

impl Rate {
    /// Parse a rate field. Decimal and `0x` hex counts must be positive.
    pub fn parse(field: &str) -> Option<Rate> {
        match field {
            "" => Some(Rate::Auto),
            "on" => Some(Rate::On),
            "hi" | "high" | "h" => Some(Rate::High),
            "lo" | "low" | "l" => Some(Rate::Low),
            _ => {
                let count = match field.strip_prefix("0x").or_else(|| field.strip_prefix("0X")) {
                    Some(hex) => u64::from_str_radix(hex, 16).ok()?,
                    None => field.parse::<u64>().ok()?,
                };
                (count > 0).then_some(Rate::Count(count))
            }
        }
    }

    /// Minimum time between overflows implied by this rate, in nanoseconds.
    pub fn min_time(&self) -> i64 {
        match self {
            Rate::Auto => HWCTIME_TBD,
            Rate::On => HWCTIME_ON,
            Rate::High => HWCTIME_HI,
            Rate::Low => HWCTIME_LO,
            Rate::Count(_) => 0,
        }
    }

    /// Field written back into the canonical counter string.
    pub fn spec_field(&self) -> String {
        match self {
            Rate::Auto => String::new(),
            Rate::On => "on".to_string(),
            Rate::High => "hi".to_string(),
            Rate::Low => "lo".to_string(),
            Rate::Count(n) => n.to_string(),
        }
    }
}

/// One configured hardware counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterEntry {
    /// Name as the user wrote it.
    pub name: String,
    /// Driver's internal event name.
    pub int_name: String,
    pub reg_num: i32,
    /// Overflow value handed to the runtime.
    pub val: u64,
    pub rate: Rate,
    /// Minimum overflow time for `rate`; `HWCTIME_TBD` for [`Rate::Auto`].
    pub min_time: i64,
    /// Minimum overflow time derived from the clock-profiling target.
    pub min_time_default: i64,
    pub use_perf_event_type: bool,
    pub perf_type: u32,
    pub config: u64,
    pub config1: u64,
    pub timecvt: i32,
    pub memop: u32,
}

impl CounterEntry {
    /// An entry for an event with no rate applied yet.
    pub fn new(name: impl Into<String>, int_name: impl Into<String>) -> Self {
        CounterEntry {
            name: name.into(),
            int_name: int_name.into(),
            reg_num: REG_ANY,
            val: 0,
            rate: Rate::Auto,
            min_time: HWCTIME_TBD,
            min_time_default: HWCTIME_ON,
            use_perf_event_type: false,
            perf_type: 0,
            config: 0,
            config1: 0,
            timecvt: 0,
            memop: 0,
        }
    }

    /// Minimum time in effect, resolving the "follow the clock" marker.
    pub fn effective_min_time(&self) -> i64 {
        if self.min_time == HWCTIME_TBD {
            self.min_time_default
        } else {
            self.min_time
        }
    }
}

/// Fixed-capacity counter table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CounterTable {
    entries: Vec<CounterEntry>,
}

impl CounterTable {
    pub fn new() -> Self {
        CounterTable {
            entries: Vec::with_capacity(MAX_COUNTERS),
        }
    }

    /// Append one entry, failing once the table is full.
    pub fn try_push(&mut self, entry: CounterEntry) -> Result<(), CounterError> {
        if self.entries.len() >= MAX_COUNTERS {
            return Err(CounterError::TooMany { max: MAX_COUNTERS });
        }
        if entry.name.is_empty() || entry.int_name.is_empty() {
            return Err(CounterError::EmptyName(entry.name));
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn remaining(&self) -> usize {
        MAX_COUNTERS - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CounterEntry> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, CounterEntry> {
        self.entries.iter_mut()
    }

    pub fn as_slice(&self) -> &[CounterEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_parse() {
        assert_eq!(Rate::parse(""), Some(Rate::Auto));
        assert_eq!(Rate::parse("on"), Some(Rate::On));
        assert_eq!(Rate::parse("high"), Some(Rate::High));
        assert_eq!(Rate::parse("lo"), Some(Rate::Low));
        assert_eq!(Rate::parse("100003"), Some(Rate::Count(100_003)));
        assert_eq!(Rate::parse("0x10"), Some(Rate::Count(16)));
        assert_eq!(Rate::parse("0"), None);
        assert_eq!(Rate::parse("fast"), None);
    }

    #[test]
    fn test_effective_min_time_follows_default() {
        let mut entry = CounterEntry::new("cycles", "cpu-cycles");
        entry.min_time_default = 42;
        assert_eq!(entry.effective_min_time(), 42);
        entry.min_time = Rate::High.min_time();
        assert_eq!(entry.effective_min_time(), HWCTIME_HI);
    }

    #[test]
    fn test_table_capacity_is_enforced() {
        let mut table = CounterTable::new();
        for i in 0..MAX_COUNTERS {
            table
                .try_push(CounterEntry::new(format!("c{}", i), "x"))
                .unwrap();
        }
        assert_eq!(table.remaining(), 0);
        let err = table.try_push(CounterEntry::new("extra", "x")).unwrap_err();
        assert_eq!(err, CounterError::TooMany { max: MAX_COUNTERS });
        assert_eq!(table.len(), MAX_COUNTERS);
    }

    #[test]
    fn test_table_rejects_empty_names() {
        let mut table = CounterTable::new();
        assert!(table.try_push(CounterEntry::new("", "x")).is_err());
        assert!(table.try_push(CounterEntry::new("a", "")).is_err());
        assert!(table.is_empty());
    }
}
