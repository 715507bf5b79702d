//! Server status as reported by `GET /api/stats`, plus display helpers

use serde::{Deserialize, Serialize};

/// Shown in place of a value when no stats snapshot is available
pub const UNKNOWN_PLACEHOLDER: &str = "??";

const BYTE_UNITS: [&str; 9] = ["Bytes", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub mem_total: u64,
    pub mem_used: u64,
    pub proc_mem: u64,
    pub cpu_num: usize,
    pub cpu_used: f32,
    pub proc_cpu: f32,
    pub uptime: u64,
    pub proc_id: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub system_status: SystemStatus,
    pub clients: usize,
}

impl StatsSnapshot {
    /// Host CPU usage, rounded and zero-padded to two digits
    #[must_use]
    pub fn cpu_percent(&self) -> String {
        pad_percent(f64::from(self.system_status.cpu_used))
    }

    /// Server process CPU usage, rounded and zero-padded to two digits
    #[must_use]
    pub fn proc_cpu_percent(&self) -> String {
        pad_percent(f64::from(self.system_status.proc_cpu))
    }

    /// Host memory usage in percent
    #[must_use]
    pub fn mem_percent(&self) -> String {
        let status = &self.system_status;
        if status.mem_total == 0 {
            return UNKNOWN_PLACEHOLDER.to_string();
        }
        pad_percent(status.mem_used as f64 / status.mem_total as f64 * 100.0)
    }

    /// Server process resident memory, human readable
    #[must_use]
    pub fn proc_mem_pretty(&self) -> String {
        format_bytes(self.system_status.proc_mem, 1)
    }
}

fn pad_percent(value: f64) -> String {
    format!("{:02}", value.round() as i64)
}

/// Format a byte count in 1024-based units, dropping trailing zero decimals
#[must_use]
pub fn format_bytes(bytes: u64, decimals: usize) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut exponent = 0;
    let mut scaled = bytes as f64;
    while scaled >= 1024.0 && exponent < BYTE_UNITS.len() - 1 {
        scaled /= 1024.0;
        exponent += 1;
    }

    let mut number = format!("{scaled:.decimals$}");
    if number.contains('.') {
        number = number.trim_end_matches('0').trim_end_matches('.').to_string();
    }

    format!("{number} {}", BYTE_UNITS[exponent])
}
