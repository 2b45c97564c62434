use chrono::Local;
use std::fmt::Write;

use super::TelemetryError;

/// Formats the current local time with a strftime-style pattern.
///
/// An invalid pattern is reported instead of panicking inside `chrono`.
pub fn now_formatted(format: &str) -> Result<String, TelemetryError> {
    let mut out = String::new();
    write!(out, "{}", Local::now().format(format))
        .map_err(|_| TelemetryError::Format(format.to_string()))?;
    Ok(out)
}
