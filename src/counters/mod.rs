//! Hardware-counter set management.
//!
//! Counter specifications are parsed into a bounded [`CounterTable`] through
//! a [`CounterDriver`], which knows the events and registers of the CPU.

pub mod driver;
pub mod entry;
pub mod spec;

pub use driver::{CounterDriver, PerfEventDriver};
pub use entry::{CounterEntry, CounterTable, Rate, HWCTIME_TBD, MAX_COUNTERS, REG_ANY};
pub use spec::{apply_resolution, parse_counter_spec, refresh_overflow};

/// Canonical `name,rate` list for a counter set.
pub fn canonical_string(entries: &[CounterEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{},{}", e.name, e.rate.spec_field()))
        .collect::<Vec<_>>()
        .join(",")
}
