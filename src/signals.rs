//! Signal name and number resolution.
//!
//! Used by the sample-signal and pause/resume settings. Names may be given
//! with or without the `SIG` prefix; real-time signals are written
//! `SIGRTMIN+n`.

use nix::sys::signal::Signal;
use std::str::FromStr;

/// Resolve a user-supplied signal string.
///
/// Returns `Ok(None)` for `"off"`, `Ok(Some(number))` for a usable signal.
/// `SIGKILL` can never be caught and is rejected like an unknown name.
pub fn find_signal(spec: &str) -> Result<Option<i32>, String> {
    let spec = spec.trim();
    if spec == "off" {
        return Ok(None);
    }

    let number = if let Ok(n) = spec.parse::<i32>() {
        Some(n)
    } else {
        let name = if spec.starts_with("SIG") {
            spec.to_string()
        } else {
            format!("SIG{}", spec)
        };
        signal_number(&name)
    };

    match number {
        Some(n) if n == libc::SIGKILL => Err(format!("Invalid signal `{}'", spec)),
        Some(n) if is_valid_signal(n) => Ok(Some(n)),
        _ => Err(format!("Invalid signal `{}'", spec)),
    }
}

/// Look up a full `SIG...` name.
fn signal_number(name: &str) -> Option<i32> {
    if let Ok(sig) = Signal::from_str(name) {
        return Some(sig as i32);
    }
    if name == "SIGRTMIN" {
        return Some(libc::SIGRTMIN());
    }
    let offset = name.strip_prefix("SIGRTMIN+")?.parse::<i32>().ok()?;
    let number = libc::SIGRTMIN() + offset;
    (number <= libc::SIGRTMAX()).then_some(number)
}

/// Is this a signal number that exists on this system?
pub fn is_valid_signal(number: i32) -> bool {
    Signal::try_from(number).is_ok() || (libc::SIGRTMIN()..=libc::SIGRTMAX()).contains(&number)
}

/// Symbolic name of a signal number, if it has one.
pub fn signal_name(number: i32) -> Option<String> {
    if let Ok(sig) = Signal::try_from(number) {
        return Some(sig.as_str().to_string());
    }
    let rtmin = libc::SIGRTMIN();
    if (rtmin..=libc::SIGRTMAX()).contains(&number) {
        return Some(if number == rtmin {
            "SIGRTMIN".to_string()
        } else {
            format!("SIGRTMIN+{}", number - rtmin)
        });
    }
    None
}

/// `"SIGUSR1 (10)"`, or just the number when it has no name.
pub fn describe_signal(number: i32) -> String {
    match signal_name(number) {
        Some(name) => format!("{} ({})", name, number),
        None => number.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_signal_with_and_without_prefix() {
        assert_eq!(find_signal("SIGUSR1"), Ok(Some(libc::SIGUSR1)));
        assert_eq!(find_signal("USR2"), Ok(Some(libc::SIGUSR2)));
        assert_eq!(find_signal("PROF"), Ok(Some(libc::SIGPROF)));
    }

    #[test]
    fn test_find_signal_off() {
        assert_eq!(find_signal("off"), Ok(None));
    }

    #[test]
    fn test_find_signal_numeric() {
        assert_eq!(find_signal("10"), Ok(Some(10)));
    }

    #[test]
    fn test_find_signal_rejects_kill_and_garbage() {
        assert!(find_signal("KILL").is_err());
        assert!(find_signal("SIGKILL").is_err());
        assert!(find_signal("NOTASIGNAL").is_err());
        assert!(find_signal("0").is_err());
        assert!(find_signal("-3").is_err());
    }

    #[test]
    fn test_realtime_signal_names_round_trip() {
        let rt = libc::SIGRTMIN() + 2;
        let name = signal_name(rt).expect("realtime signal has a name");
        assert_eq!(name, "SIGRTMIN+2");
        assert_eq!(find_signal(&name), Ok(Some(rt)));
    }

    #[test]
    fn test_describe_signal() {
        assert_eq!(describe_signal(libc::SIGUSR1), format!("SIGUSR1 ({})", libc::SIGUSR1));
    }
}
