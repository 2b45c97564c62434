use std::path::Path;

use super::{read_file, TelemetryError};

/// Memory figures from `/proc/meminfo`, in kB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryUsage {
    pub total_kb: u64,
    pub available_kb: u64,
}

impl MemoryUsage {
    pub fn used_kb(&self) -> u64 {
        self.total_kb.saturating_sub(self.available_kb)
    }

    pub fn used_mb(&self) -> u64 {
        self.used_kb() / 1024
    }

    pub fn total_mb(&self) -> u64 {
        self.total_kb / 1024
    }

    pub fn percent(&self) -> f64 {
        if self.total_kb == 0 {
            return 0.0;
        }
        self.used_kb() as f64 * 100.0 / self.total_kb as f64
    }
}

pub fn read_usage(path: &Path) -> Result<MemoryUsage, TelemetryError> {
    let raw = read_file(path)?;
    parse_meminfo(&raw).ok_or_else(|| TelemetryError::parse(path, "missing MemTotal/MemAvailable"))
}

fn parse_meminfo(text: &str) -> Option<MemoryUsage> {
    let mut total = None;
    let mut available = None;
    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let kb = value.split_whitespace().next().and_then(|v| v.parse::<u64>().ok());
        match key {
            "MemTotal" => total = kb,
            "MemAvailable" => available = kb,
            _ => {}
        }
    }
    Some(MemoryUsage {
        total_kb: total?,
        available_kb: available?,
    })
}
