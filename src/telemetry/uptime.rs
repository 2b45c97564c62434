use std::path::Path;

use super::{read_file, TelemetryError};

/// Seconds since boot from `/proc/uptime`.
pub fn read_seconds(path: &Path) -> Result<u64, TelemetryError> {
    let raw = read_file(path)?;
    raw.split_whitespace()
        .next()
        .and_then(|field| field.parse::<f64>().ok())
        .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
        .map(|seconds| seconds as u64)
        .ok_or_else(|| TelemetryError::parse(path, "missing uptime"))
}

/// `3 days, 4:05:06`, `1 day, 0:00:10` or `4:05:06`.
pub fn format_duration(total_seconds: u64) -> String {
    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    let clock = format!("{}:{:02}:{:02}", hours, minutes, seconds);
    match days {
        0 => clock,
        1 => format!("1 day, {}", clock),
        n => format!("{} days, {}", n, clock),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_like_timedelta() {
        assert_eq!(format_duration(0), "0:00:00");
        assert_eq!(format_duration(3599), "0:59:59");
        assert_eq!(format_duration(86_410), "1 day, 0:00:10");
        assert_eq!(format_duration(273_906), "3 days, 4:05:06");
    }
}
