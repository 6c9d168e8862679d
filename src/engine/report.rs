//! Human-readable summaries and the equivalent launcher command line.

use super::CollectorControl;
use crate::counters::{canonical_string, CounterEntry, REG_ANY};
use crate::models::{CountMode, FollowMode, SyncScope, SyncThreshold};
use crate::signals::signal_name;
use crate::timer::millis;
use std::fmt::Write;

/// Upper bound on the launcher argument list.
pub const MAX_LAUNCHER_ARGS: usize = 100;

fn counter_line(entry: &CounterEntry) -> String {
    let mut line = entry.name.clone();
    if entry.reg_num != REG_ANY {
        let _ = write!(line, "/{}", entry.reg_num);
    }
    let rate = entry.rate.spec_field();
    if !rate.is_empty() {
        let _ = write!(line, ",{}", rate);
    }
    if entry.int_name != entry.name {
        let _ = write!(line, " ({})", entry.int_name);
    }
    line
}

fn signal_label(sig: i32) -> String {
    match signal_name(sig) {
        Some(name) => format!("{} ({})", name, sig),
        None => sig.to_string(),
    }
}

fn scope_letters(scope: SyncScope) -> String {
    let mut letters = String::new();
    if scope.contains(SyncScope::NATIVE) {
        letters.push('n');
    }
    if scope.contains(SyncScope::JAVA) {
        letters.push('j');
    }
    letters
}

impl CollectorControl {
    /// Multi-line description of the settings; `header` adds the title.
    pub fn show(&self, header: bool) -> String {
        let s = &self.settings;
        let mut out = String::new();
        let o = &mut out;
        if header {
            o.push_str("Collection parameters:\n");
            o.push_str("    experiment enabled\n");
        }
        if let Some(target) = &s.target_name {
            let _ = writeln!(o, "\ttarget = {}", target);
        }
        if let Some(name) = &s.user_expt_name {
            let _ = writeln!(o, "\tuser_expt_name = {}", name);
        }
        let _ = writeln!(o, "\texpt_name = {}", self.names.expt_name);
        if let Some(dir) = &s.user_dir {
            let _ = writeln!(o, "\tdir_name = {}", dir);
        }
        if let Some(group) = &s.group {
            let _ = writeln!(o, "\texpt_group = {}", group);
        }
        if s.debug {
            o.push_str("\tdebug_mode enabled\n");
        }
        if s.clkprof_enabled {
            let _ = writeln!(o, "\tclock profiling enabled, {} millisec.", millis(s.clkprof_timer));
        }
        if s.synctrace_enabled {
            match s.synctrace_threshold {
                SyncThreshold::Calibrate => {
                    o.push_str("\tsynchronization tracing enabled, threshold: calibrate; ")
                }
                SyncThreshold::All => o.push_str("\tsynchronization tracing enabled, threshold: all; "),
                SyncThreshold::Micros(us) => {
                    let _ = write!(o, "\tsynchronization tracing enabled, threshold: {} micros.; ", us);
                }
            }
            let native = s.synctrace_scope.contains(SyncScope::NATIVE);
            let java = s.synctrace_scope.contains(SyncScope::JAVA);
            match (native, java) {
                (true, false) => o.push_str("Native-APIs\n"),
                (false, true) => o.push_str("Java-APIs\n"),
                (true, true) => o.push_str("Native- and Java-APIs\n"),
                (false, false) => {
                    let _ = writeln!(o, "ERR -- unexpected synctrace_scope {}", s.synctrace_scope.bits());
                }
            }
        }
        if !s.counters.is_empty() {
            if s.hwc_default {
                o.push_str("\thardware counter profiling (default) enabled:\n");
            } else {
                o.push_str("\thardware counter profiling enabled:\n");
            }
            for (i, entry) in s.counters.iter().enumerate() {
                let _ = writeln!(o, "\t  {}. {}", i + 1, counter_line(entry));
            }
        }
        if s.heaptrace_mode.is_some() {
            o.push_str("\theap tracing enabled\n");
        }
        if s.iotrace_enabled {
            o.push_str("\tI/O tracing enabled\n");
        }
        match s.count_mode {
            CountMode::Off => {}
            CountMode::Dynamic => o.push_str("\tcount data enabled\n"),
            CountMode::Static => {
                o.push_str("\tstatic count data will be generated (for a.out only)\n")
            }
        }
        match (s.follow_mode, &s.follow_pattern) {
            (FollowMode::On, _) => o.push_str("\tdescendant processes will be followed\n"),
            (FollowMode::All, Some(pattern)) => {
                let _ = writeln!(
                    o,
                    "\texperiments will be recorded for descendant processes that match pattern '{}'",
                    pattern.user
                );
            }
            (FollowMode::All, None) => o.push_str("\tdescendant processes will all be followed\n"),
            (FollowMode::None, _) => o.push_str("\tdescendant processes will not be followed\n"),
        }
        if !s.java_enabled {
            o.push_str("\tjava profiling disabled\n");
        }
        if let Some(pr) = s.pause_resume {
            let _ = writeln!(
                o,
                "\tpause-resume (delayed initialization) signal {}{}",
                signal_label(pr.signal),
                if pr.start_paused { " -- paused" } else { "" }
            );
        }
        if let Some(sig) = s.sample_sig {
            let _ = writeln!(o, "\tsample signal {}", signal_label(sig));
        }
        match (s.start_delay, s.time_run) {
            (0, 0) => {}
            (0, end) => {
                let _ = writeln!(o, "\tdata-collection duration, {} secs.", end);
            }
            (start, 0) => {
                let _ = writeln!(o, "\tdata-collection duration, {}- secs.", start);
            }
            (start, end) => {
                let _ = writeln!(o, "\tdata-collection duration, {}-{} secs.", start, end);
            }
        }
        if s.sample_period != 0 {
            let _ = writeln!(o, "\tperiodic sampling, {} secs.", s.sample_period);
        } else {
            o.push_str("\tno periodic sampling\n");
        }
        if s.size_limit != 0 {
            let _ = writeln!(o, "\texperiment size limit {} MB.", s.size_limit);
        } else {
            o.push_str("\tno experiment size limit set\n");
        }
        let _ = writeln!(o, "\texperiment archiving: -a {}", s.archive);
        let _ = writeln!(o, "\tdata descriptor: \"{}\"", self.data_desc);
        let _ = writeln!(
            o,
            "\t\thost: `{}', ncpus = {}, clock frequency {} MHz.",
            self.host.node_name, self.host.cpu.count, self.host.cpu.clock_mhz
        );
        if let Some(mb) = self.host.memory_mb() {
            let _ = writeln!(
                o,
                "\t\tmemory:  {} pages @ {} bytes = {} MB.",
                self.host.phys_pages, self.host.page_size, mb
            );
        }
        out
    }

    /// Banner printed when the experiment directory is created.
    pub fn show_expt(&self) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let line = format!(
            "Creating experiment directory {} (Process ID: {}) ...\n",
            self.names.store_path(),
            std::process::id()
        );
        let mut banner = line.clone();
        if self.config.from_gui {
            banner.push('\n');
            banner.push_str(&line);
        }
        Some(banner)
    }

    /// Launcher command line reproducing these settings.
    ///
    /// # Panics
    ///
    /// If the list would exceed [`MAX_LAUNCHER_ARGS`]; the option set is
    /// fixed, so this is an internal error.
    pub fn launcher_args(&self) -> Vec<String> {
        let s = &self.settings;
        let mut args = vec!["collect".to_string()];
        let mut opt = |flag: &str, value: Option<String>| {
            args.push(flag.to_string());
            if let Some(v) = value {
                args.push(v);
            }
        };

        if s.debug {
            opt("-x", None);
        }
        if s.clkprof_enabled {
            opt("-p", Some(format!("{}u", s.clkprof_timer)));
        }
        if !s.counters.is_empty() {
            opt("-h", Some(canonical_string(s.counters.as_slice())));
        }
        if let Some(mode) = &s.heaptrace_mode {
            opt("-H", Some(mode.clone()));
        }
        if s.iotrace_enabled {
            opt("-i", Some("on".to_string()));
        }
        if s.synctrace_enabled {
            opt(
                "-s",
                Some(format!("{},{}", s.synctrace_threshold, scope_letters(s.synctrace_scope))),
            );
        }
        if s.follow_mode != FollowMode::None {
            let value = match (&s.follow_pattern, s.follow_mode) {
                (Some(pattern), _) => pattern.user.clone(),
                (None, FollowMode::All) => "all".to_string(),
                (None, _) => "on".to_string(),
            };
            opt("-F", Some(value));
        }
        opt("-a", Some(s.archive.to_string()));
        if s.java_enabled {
            opt("-j", Some("on".to_string()));
        }
        if let Some(pr) = s.pause_resume {
            let resume = if pr.start_paused { "" } else { ",r" };
            opt("-y", Some(format!("{}{}", pr.signal, resume)));
        }
        if let Some(sig) = s.sample_sig {
            opt("-l", Some(sig.to_string()));
        }
        if s.sample_period != 0 {
            opt("-S", Some(s.sample_period.to_string()));
        }
        if s.size_limit != 0 {
            opt("-L", Some(s.size_limit.to_string()));
        }
        if let Some(group) = &s.group {
            opt("-g", Some(group.clone()));
        }
        if let Some(dir) = &s.user_dir {
            opt("-d", Some(dir.clone()));
        }
        if !self.names.expt_name.is_empty() {
            opt("-o", Some(self.names.expt_name.clone()));
        }

        if args.len() >= MAX_LAUNCHER_ARGS {
            panic!("launcher argument list overflow: {} arguments", args.len());
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::tests::engine;

    #[test]
    fn test_show_defaults() {
        let e = engine();
        let text = e.show(true);
        assert!(text.starts_with("Collection parameters:\n    experiment enabled\n"));
        assert!(text.contains("\texpt_name = test.1.er\n"));
        assert!(text.contains("\tclock profiling enabled, 10.000 millisec.\n"));
        assert!(text.contains("\tdescendant processes will be followed\n"));
        assert!(text.contains("\tperiodic sampling, 1 secs.\n"));
        assert!(text.contains("\tno experiment size limit set\n"));
        assert!(text.contains("\texperiment archiving: -a on\n"));
        assert!(text.contains("host: `node', ncpus = 4, clock frequency 2000 MHz."));
        assert!(text.contains("memory:  1024 pages @ 4096 bytes = 4 MB."));
    }

    #[test]
    fn test_show_counters_and_signals() {
        let mut e = engine();
        e.set_hwc_string(Some("cycles,hi,insts/1,100003")).unwrap();
        e.set_sample_signal(Some(libc::SIGUSR1)).unwrap();
        e.set_pause_resume_signal(Some(libc::SIGUSR2), true).unwrap();
        e.set_time_run(Some("5-60")).unwrap();
        let text = e.show(false);
        assert!(!text.contains("Collection parameters"));
        assert!(text.contains("\thardware counter profiling enabled:\n"));
        assert!(text.contains("\t  1. cycles,hi (cpu-cycles)\n"));
        assert!(text.contains("\t  2. insts/1,100003 (instructions)\n"));
        assert!(text.contains("\tsample signal SIGUSR1 (10)\n"));
        assert!(text.contains("signal SIGUSR2 (12) -- paused\n"));
        assert!(text.contains("\tdata-collection duration, 5-60 secs.\n"));
    }

    #[test]
    fn test_show_expt_only_when_enabled() {
        let mut e = engine();
        assert_eq!(e.show_expt(), None);
        e.enable_expt().unwrap();
        let banner = e.show_expt().unwrap();
        assert!(banner.starts_with("Creating experiment directory test.1.er (Process ID: "));
        assert_eq!(banner.matches("Creating").count(), 1);
    }

    #[test]
    fn test_launcher_args_defaults() {
        let e = engine();
        assert_eq!(
            e.launcher_args(),
            vec!["collect", "-p", "10000u", "-F", "on", "-a", "on", "-j", "on", "-S", "1", "-o", "test.1.er"]
        );
    }

    #[test]
    fn test_launcher_args_full() {
        let mut e = engine();
        e.set_debug_mode(true).unwrap();
        e.set_hwc_string(Some("cycles,on")).unwrap();
        e.set_heaptrace(Some("on")).unwrap();
        e.set_iotrace(Some("on")).unwrap();
        e.set_synctrace(Some("n,100")).unwrap();
        e.set_follow_mode(Some("=a.*")).unwrap();
        e.set_pause_resume_signal(Some(libc::SIGUSR2), false).unwrap();
        e.set_size_limit(Some("500")).unwrap();
        let args = e.launcher_args();
        let joined = args.join(" ");
        assert!(joined.starts_with("collect -x -p 10000u -h cycles,on -H on -i on -s 100,n -F =a.* -a on"));
        assert!(joined.contains("-y 12,r"));
        assert!(joined.contains("-L 500"));
    }
}
