use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::sensor::TemperatureUnit;

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SensorConfig {
    /// Seconds between sensor reads
    #[serde(default = "default_sensor_interval")]
    pub interval_secs: f64,
    /// IIO device directory exposed by the dht11 kernel driver
    #[serde(default = "default_sensor_device")]
    pub device: PathBuf,
    /// Unit for the atmosphere line
    #[serde(default)]
    pub unit: TemperatureUnit,
}

/// Longest accepted sensor interval: one read a day.
pub const MAX_SENSOR_INTERVAL_SECS: f64 = 86_400.0;

impl SensorConfig {
    /// Falls back to the default cadence for values `validate` rejects.
    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.interval_secs)
            .ok()
            .filter(|interval| {
                !interval.is_zero() && interval.as_secs_f64() <= MAX_SENSOR_INTERVAL_SECS
            })
            .unwrap_or_else(|| Duration::from_secs_f64(default_sensor_interval()))
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sensor_interval(),
            device: default_sensor_device(),
            unit: TemperatureUnit::default(),
        }
    }
}

fn default_sensor_interval() -> f64 {
    2.0
}

fn default_sensor_device() -> PathBuf {
    PathBuf::from("/sys/bus/iio/devices/iio:device0")
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DisplayKind {
    /// Character rendering on stdout
    #[default]
    Terminal,
    /// Frames are only logged at debug level
    Log,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DisplayConfig {
    #[serde(default)]
    pub kind: DisplayKind,
    /// Panel width in pixels
    #[serde(default = "default_display_width")]
    pub width: u32,
    /// Panel height in pixels; 32 shows the network block only, 64 adds
    /// CPU, memory and atmosphere, taller panels add uptime
    #[serde(default = "default_display_height")]
    pub height: u32,
    /// Milliseconds between redraws
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl DisplayConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            kind: DisplayKind::default(),
            width: default_display_width(),
            height: default_display_height(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

fn default_display_width() -> u32 {
    128
}

fn default_display_height() -> u32 {
    64
}

fn default_poll_interval() -> u64 {
    100
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TelemetryConfig {
    /// Interface whose byte counters are shown
    #[serde(default = "default_network_interface")]
    pub network_interface: String,
    /// Mount point whose usage is shown
    #[serde(default = "default_disk_mount")]
    pub disk_mount: PathBuf,
    /// Date format (chrono strftime)
    #[serde(default = "default_date_format")]
    pub date_format: String,
    /// Time format (chrono strftime)
    #[serde(default = "default_time_format")]
    pub time_format: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            network_interface: default_network_interface(),
            disk_mount: default_disk_mount(),
            date_format: default_date_format(),
            time_format: default_time_format(),
        }
    }
}

fn default_network_interface() -> String {
    "wlan0".to_string()
}

fn default_disk_mount() -> PathBuf {
    PathBuf::from("/mnt/usb_share")
}

fn default_date_format() -> String {
    "%e %b %Y".to_string()
}

fn default_time_format() -> String {
    "%H:%M:%S".to_string()
}

/// A problem found while validating the config.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigIssue {
    pub field: &'static str,
    pub message: String,
    pub is_error: bool,
}

impl ConfigIssue {
    fn error(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
            is_error: true,
        }
    }

    fn warning(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
            is_error: false,
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl Config {
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        let interval = self.sensor.interval_secs;
        if !interval.is_finite() || interval <= 0.0 {
            issues.push(ConfigIssue::error(
                "sensor.interval_secs",
                format!("must be a positive number of seconds, got {}", interval),
            ));
        } else if interval > MAX_SENSOR_INTERVAL_SECS {
            issues.push(ConfigIssue::error(
                "sensor.interval_secs",
                format!(
                    "must be at most {} seconds, got {}",
                    MAX_SENSOR_INTERVAL_SECS, interval
                ),
            ));
        } else if interval < 2.0 {
            // DHT22 needs about two seconds between conversions.
            issues.push(ConfigIssue::warning(
                "sensor.interval_secs",
                format!("{}s is faster than a DHT22 can sample", interval),
            ));
        }

        if self.display.poll_interval_ms == 0 {
            issues.push(ConfigIssue::error("display.poll_interval_ms", "must be greater than 0"));
        }
        if self.display.width == 0 {
            issues.push(ConfigIssue::error("display.width", "must be greater than 0"));
        }
        if self.display.height == 0 {
            issues.push(ConfigIssue::error("display.height", "must be greater than 0"));
        } else if self.display.height % 8 != 0 {
            issues.push(ConfigIssue::warning(
                "display.height",
                format!("{} is not a multiple of the 8px line height", self.display.height),
            ));
        }

        if self.telemetry.network_interface.trim().is_empty() {
            issues.push(ConfigIssue::error("telemetry.network_interface", "must not be empty"));
        }
        if self.telemetry.date_format.is_empty() {
            issues.push(ConfigIssue::error("telemetry.date_format", "must not be empty"));
        }
        if self.telemetry.time_format.is_empty() {
            issues.push(ConfigIssue::error("telemetry.time_format", "must not be empty"));
        }

        issues
    }
}
