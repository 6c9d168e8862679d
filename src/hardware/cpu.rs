//! CPU detection and identification module.

use std::fs;

/// Processor facts the engine needs: counts and clock for validation, names
/// for counter-set messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuInfo {
    pub count: u32,
    /// Clock frequency in MHz; 0 when it can not be determined.
    pub clock_mhz: u32,
    pub family: i64,
    pub model: i64,
    pub vendor: String,
    pub model_name: String,
}

impl Default for CpuInfo {
    fn default() -> Self {
        CpuInfo {
            count: 0,
            clock_mhz: 0,
            family: 0,
            model: 0,
            vendor: "Unknown processor".to_string(),
            model_name: "Unknown cpu model".to_string(),
        }
    }
}

/// Value after the first `:` on a cpuinfo line, trimmed.
fn field_value(line: &str) -> Option<&str> {
    let (_, value) = line.split_once(':')?;
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

/// Integer after the `:`; accepts `0x` hex like the kernel prints for ARM.
fn field_int(line: &str) -> i64 {
    let Some(value) = field_value(line) else {
        return 0;
    };
    if let Some(hex) = value.strip_prefix("0x") {
        return i64::from_str_radix(hex, 16).unwrap_or(0);
    }
    // "cpu MHz : 2400.000" keeps only the integral part
    let integral = value.split('.').next().unwrap_or(value);
    integral.parse().unwrap_or(0)
}

/// Parse the text of /proc/cpuinfo.
pub fn parse_cpuinfo(content: &str) -> CpuInfo {
    let mut info = CpuInfo::default();
    let mut vendor: Option<String> = None;
    let mut model_name: Option<String> = None;

    for line in content.lines() {
        if line.starts_with("processor") {
            info.count += 1;
        } else if line.starts_with("cpu MHz") {
            info.clock_mhz = u32::try_from(field_int(line)).unwrap_or(0);
        } else if line.starts_with("cpu family") || line.starts_with("CPU implementer") {
            info.family = field_int(line);
        } else if line.starts_with("vendor_id") || line.starts_with("mvendorid") {
            if vendor.is_none() {
                vendor = field_value(line).map(str::to_string);
            }
        } else if line.starts_with("model name") {
            if model_name.is_none() {
                model_name = field_value(line).map(str::to_string);
            }
        } else if line.starts_with("model") || line.starts_with("CPU architecture") {
            info.model = field_int(line);
        }
    }

    if let Some(v) = vendor {
        info.vendor = v;
    }
    if let Some(m) = model_name {
        info.model_name = m;
    }
    info
}

/// Read /proc/cpuinfo, falling back to defaults when unreadable.
pub fn detect_cpu_info() -> CpuInfo {
    match fs::read_to_string("/proc/cpuinfo") {
        Ok(content) => {
            let mut info = parse_cpuinfo(&content);
            if info.clock_mhz == 0 && cfg!(any(target_arch = "riscv64", target_arch = "aarch64")) {
                // no "cpu MHz" line on these; assume a nominal clock
                info.clock_mhz = 1000;
            }
            info
        }
        Err(e) => {
            log::debug!("[Hardware] /proc/cpuinfo unreadable: {}", e);
            CpuInfo::default()
        }
    }
}
