//! Host detection public API module.
//!
//! Aggregates the processor, memory and clock facts the engine records in
//! every experiment and uses to decide whether collection can be enabled.

pub mod cpu;

pub use cpu::{detect_cpu_info, parse_cpuinfo, CpuInfo};

use nix::unistd::{gethostname, sysconf, SysconfVar};
use once_cell::sync::Lazy;

/// Host facts, detected once per process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    /// Host name up to the first `.`.
    pub node_name: String,
    pub cpu: CpuInfo,
    /// Clock ticks per second; 0 when unknown.
    pub clock_ticks: i64,
    pub page_size: i64,
    pub phys_pages: i64,
}

static HOST: Lazy<HostInfo> = Lazy::new(HostInfo::probe);

impl HostInfo {
    /// Cached host facts. The first call probes the system.
    pub fn detect() -> HostInfo {
        HOST.clone()
    }

    fn probe() -> HostInfo {
        let node_name = gethostname()
            .ok()
            .and_then(|name| name.into_string().ok())
            .map(|name| short_host_name(&name).to_string())
            .unwrap_or_else(|| "localhost".to_string());

        let sysconf_or_zero = |var: SysconfVar| sysconf(var).ok().flatten().map(i64::from).unwrap_or(0);

        let host = HostInfo {
            node_name,
            cpu: detect_cpu_info(),
            clock_ticks: sysconf_or_zero(SysconfVar::CLK_TCK),
            page_size: sysconf_or_zero(SysconfVar::PAGE_SIZE),
            phys_pages: sysconf_or_zero(SysconfVar::_PHYS_PAGES),
        };
        log::debug!(
            "[Hardware] host `{}', {} cpus @ {} MHz, {} ticks/s",
            host.node_name,
            host.cpu.count,
            host.cpu.clock_mhz,
            host.clock_ticks
        );
        host
    }

    /// Physical memory in MB, when the page count is known.
    pub fn memory_mb(&self) -> Option<i64> {
        (self.phys_pages > 0).then(|| self.phys_pages * self.page_size / (1024 * 1024))
    }
}

/// Strip the domain part of a host name.
pub fn short_host_name(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}
