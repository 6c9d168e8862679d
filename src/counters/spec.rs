//! Counter specification strings.
//!
//! A specification alternates counter names and rates:
//! `cycles,on,insts,,r1c2/2,100003`. A name may carry a `/N` register suffix;
//! a rate may be empty or missing at the end.

use super::driver::CounterDriver;
use super::entry::{CounterEntry, Rate, MAX_COUNTERS};
use crate::error::CounterError;

/// Parse `spec` into entries, allowing at most `room` new counters.
pub fn parse_counter_spec(
    spec: &str,
    driver: &dyn CounterDriver,
    kernel: bool,
    min_time_default: i64,
    room: usize,
) -> Result<Vec<CounterEntry>, CounterError> {
    let fields: Vec<&str> = spec.split(',').collect();
    let mut entries = Vec::new();

    let mut i = 0;
    while i < fields.len() {
        let name_field = fields[i].trim();
        let rate_field = fields.get(i + 1).map(|f| f.trim()).unwrap_or("");

        if name_field.is_empty() {
            // only a trailing comma may leave an empty name
            if i > 0 && i == fields.len() - 1 {
                break;
            }
            return Err(CounterError::Syntax(spec.to_string()));
        }

        let (name, reg_num) = match name_field.split_once('/') {
            Some((name, reg)) => {
                let reg = reg
                    .parse::<i32>()
                    .ok()
                    .filter(|r| *r >= 0)
                    .ok_or_else(|| CounterError::Syntax(spec.to_string()))?;
                (name, reg)
            }
            None => (name_field, super::entry::REG_ANY),
        };

        let rate = Rate::parse(rate_field).ok_or_else(|| CounterError::InvalidRate {
            name: name.to_string(),
            rate: rate_field.to_string(),
        })?;

        let mut entry = driver
            .lookup(name, kernel)
            .ok_or_else(|| CounterError::UnknownCounter(name.to_string()))?;
        entry.reg_num = reg_num;
        entry.rate = rate;
        entry.min_time = rate.min_time();
        entry.min_time_default = min_time_default;
        refresh_overflow(&mut entry, driver);

        if entries.len() >= room {
            return Err(CounterError::TooMany { max: MAX_COUNTERS });
        }
        entries.push(entry);
        i += 2;
    }

    if entries.is_empty() {
        return Err(CounterError::Syntax(spec.to_string()));
    }
    Ok(entries)
}

/// Recompute the overflow value after a rate or default change.
pub fn refresh_overflow(entry: &mut CounterEntry, driver: &dyn CounterDriver) {
    entry.val = match entry.rate {
        Rate::Count(n) => n,
        _ => driver.overflow_for(entry, entry.effective_min_time()),
    };
}

/// Insert `resolution` after every counter name of a default set.
///
/// Default sets separate names with an empty rate field (`a,,b,,`). A
/// single comma between names, a leading comma or an empty name is a
/// format error and yields `None`.
pub fn apply_resolution(default_spec: &str, resolution: &str) -> Option<String> {
    let bytes = default_spec.as_bytes();
    let mut out = String::with_capacity(2 * default_spec.len() + 10);
    // start of the pending field, including its leading separator after
    // the first one
    let mut start = 0;
    let mut first = true;

    loop {
        let search_from = if first { start } else { start + 1 };
        first = false;
        match default_spec[search_from..].find(',') {
            Some(offset) => {
                let comma = search_from + offset;
                if comma == search_from {
                    return None;
                }
                let next = bytes.get(comma + 1).copied();
                match next {
                    None | Some(b',') => {
                        out.push_str(&default_spec[start..comma]);
                        out.push(',');
                        out.push_str(resolution);
                        if next.is_none() {
                            break;
                        }
                    }
                    _ => return None,
                }
                start = comma + 1;
                if start + 1 >= bytes.len() {
                    break;
                }
            }
            None => {
                out.push_str(&default_spec[start..]);
                out.push(',');
                out.push_str(resolution);
                break;
            }
        }
    }
    Some(out)
}
