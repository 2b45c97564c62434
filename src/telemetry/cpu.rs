use std::path::Path;

use super::{read_file, TelemetryError};

/// Reads a thermal zone temperature (millidegrees) in °C.
pub fn read_temperature(path: &Path) -> Result<f32, TelemetryError> {
    let raw = read_file(path)?;
    let milli: i64 = raw
        .trim()
        .parse()
        .map_err(|_| TelemetryError::parse(path, format!("not a temperature: {:?}", raw.trim())))?;
    Ok(milli as f32 / 1000.0)
}

/// Reads the 5-minute load average from `/proc/loadavg`.
pub fn read_load_average(path: &Path) -> Result<f64, TelemetryError> {
    let raw = read_file(path)?;
    raw.split_whitespace()
        .nth(1)
        .and_then(|field| field.parse().ok())
        .ok_or_else(|| TelemetryError::parse(path, "missing 5-minute load average"))
}
