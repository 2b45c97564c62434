//! System telemetry for the status screen.
//!
//! Each metric is a standalone function returning a ready-to-draw line. Any
//! of them may fail on its own (interface down, USB stick unplugged); the
//! render loop substitutes that metric's fallback text and carries on.

mod clock;
mod cpu;
mod disk;
mod memory;
mod network;
mod uptime;

use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected contents in {path}: {detail}")]
    Parse { path: PathBuf, detail: String },

    #[error("network interface '{0}' not found")]
    InterfaceNotFound(String),

    #[error("{0} is not a mount point")]
    NotMounted(PathBuf),

    #[error("invalid time format '{0}'")]
    Format(String),

    #[error("{0}")]
    Unavailable(String),
}

impl TelemetryError {
    fn parse(path: &Path, detail: impl Into<String>) -> Self {
        TelemetryError::Parse {
            path: path.to_path_buf(),
            detail: detail.into(),
        }
    }
}

/// Reads a small pseudo-file such as `/proc/loadavg`.
fn read_file(path: &Path) -> Result<String, TelemetryError> {
    std::fs::read_to_string(path).map_err(|source| TelemetryError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// The metrics shown on the status screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Date,
    Time,
    IpAddress,
    Network,
    Disk,
    CpuTemperature,
    CpuLoad,
    Memory,
    Uptime,
}

impl Metric {
    /// Text drawn in place of the metric when it cannot be read.
    pub fn fallback(self) -> &'static str {
        match self {
            Metric::Date => "--- -- ----",
            Metric::Time => "--:--:--",
            Metric::IpAddress => "Network Unavailable",
            Metric::Network => "Check back later",
            Metric::Disk => "USB Storage not accessible",
            Metric::CpuTemperature => "CPU Temp: n/a",
            Metric::CpuLoad => "CPU Load: n/a",
            Metric::Memory => "Mem: n/a",
            Metric::Uptime => "Uptime: n/a",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Metric::Date => "date",
            Metric::Time => "time",
            Metric::IpAddress => "ip",
            Metric::Network => "network",
            Metric::Disk => "disk",
            Metric::CpuTemperature => "cpu-temp",
            Metric::CpuLoad => "cpu-load",
            Metric::Memory => "memory",
            Metric::Uptime => "uptime",
        }
    }
}

/// Source of formatted telemetry lines.
pub trait Telemetry {
    fn date(&self, format: &str) -> Result<String, TelemetryError>;
    fn time(&self, format: &str) -> Result<String, TelemetryError>;
    fn ip_address(&self) -> Result<String, TelemetryError>;
    fn network(&self, interface: &str) -> Result<String, TelemetryError>;
    fn disk(&self, mount: &Path) -> Result<String, TelemetryError>;
    fn cpu_temperature(&self) -> Result<String, TelemetryError>;
    fn cpu_load(&self) -> Result<String, TelemetryError>;
    fn memory(&self) -> Result<String, TelemetryError>;
    fn uptime(&self) -> Result<String, TelemetryError>;
}

/// Telemetry read from the running Linux system.
///
/// `root` is normally `/`; tests point it at a directory holding fake
/// `proc` and `sys` trees.
pub struct SystemTelemetry {
    root: PathBuf,
}

impl SystemTelemetry {
    pub fn new() -> Self {
        Self::with_root(Path::new("/"))
    }

    pub fn with_root(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }
}

impl Default for SystemTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry for SystemTelemetry {
    fn date(&self, format: &str) -> Result<String, TelemetryError> {
        clock::now_formatted(format)
    }

    fn time(&self, format: &str) -> Result<String, TelemetryError> {
        clock::now_formatted(format)
    }

    fn ip_address(&self) -> Result<String, TelemetryError> {
        network::local_ip().map(|ip| format!("IP: {}", ip))
    }

    fn network(&self, interface: &str) -> Result<String, TelemetryError> {
        let counters = network::read_counters(&self.path("proc/net/dev"), interface)?;
        Ok(format!(
            "{}: Tx: {}, Rx: {}",
            interface,
            bytes_to_human(counters.tx_bytes),
            bytes_to_human(counters.rx_bytes)
        ))
    }

    fn disk(&self, mount: &Path) -> Result<String, TelemetryError> {
        let usage = disk::usage(&self.path("proc/self/mounts"), mount)?;
        Ok(format!(
            "Disk: {}/{} {}%",
            disk::size_to_human(usage.used_bytes),
            disk::size_to_human(usage.total_bytes),
            usage.percent()
        ))
    }

    fn cpu_temperature(&self) -> Result<String, TelemetryError> {
        let celsius = cpu::read_temperature(&self.path("sys/class/thermal/thermal_zone0/temp"))?;
        Ok(format!("CPU Temp: {:.1}'C", celsius))
    }

    fn cpu_load(&self) -> Result<String, TelemetryError> {
        let load = cpu::read_load_average(&self.path("proc/loadavg"))?;
        Ok(format!("CPU Load: {:.2}", load))
    }

    fn memory(&self) -> Result<String, TelemetryError> {
        let usage = memory::read_usage(&self.path("proc/meminfo"))?;
        Ok(format!(
            "Mem: {}/{} MB {:.2}%",
            usage.used_mb(),
            usage.total_mb(),
            usage.percent()
        ))
    }

    fn uptime(&self) -> Result<String, TelemetryError> {
        let seconds = uptime::read_seconds(&self.path("proc/uptime"))?;
        Ok(format!("Uptime: {}", uptime::format_duration(seconds)))
    }
}

/// Formats a byte count with binary prefixes, truncating: `10000` -> `9K`.
pub fn bytes_to_human(bytes: u64) -> String {
    const SYMBOLS: [char; 8] = ['K', 'M', 'G', 'T', 'P', 'E', 'Z', 'Y'];
    for (index, symbol) in SYMBOLS.iter().enumerate().rev() {
        let prefix = 1u128 << ((index + 1) * 10);
        if u128::from(bytes) >= prefix {
            return format!("{}{}", u128::from(bytes) / prefix, symbol);
        }
    }
    format!("{}B", bytes)
}
