//! Status screen layout.
//!
//! Lines sit on the 8px rows of the default 6x8 font. A 32px panel shows the
//! clock and network block; 64px adds CPU, memory and the atmosphere line;
//! anything taller adds uptime.

use std::collections::HashSet;

use crate::config::Config;
use crate::display::Frame;
use crate::sensor::SensorReading;
use crate::telemetry::{Metric, Telemetry, TelemetryError};

const LINE_HEIGHT: u32 = 8;
const TIME_X: u32 = 80;

/// Tracks which metrics are currently failing so each outage is logged once.
#[derive(Debug, Default)]
pub struct MetricHealth {
    failing: HashSet<Metric>,
}

impl MetricHealth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the metric's text, or its fallback if it could not be read.
    pub fn resolve(&mut self, metric: Metric, result: Result<String, TelemetryError>) -> String {
        match result {
            Ok(text) => {
                if self.failing.remove(&metric) {
                    log::info!("{} is available again", metric.name());
                }
                text
            }
            Err(err) => {
                if self.failing.insert(metric) {
                    log::warn!("{} unavailable: {}", metric.name(), err);
                } else {
                    log::debug!("{} still unavailable: {}", metric.name(), err);
                }
                metric.fallback().to_string()
            }
        }
    }

    #[cfg(test)]
    pub fn is_failing(&self, metric: Metric) -> bool {
        self.failing.contains(&metric)
    }
}

/// Builds one frame for a panel `height` pixels tall.
pub fn compose<T: Telemetry + ?Sized>(
    telemetry: &T,
    reading: &SensorReading,
    config: &Config,
    height: u32,
    health: &mut MetricHealth,
) -> Frame {
    let settings = &config.telemetry;
    let mut frame = Frame::new();
    let row = |n: u32| n * LINE_HEIGHT;

    frame.push(
        0,
        row(0),
        health.resolve(Metric::Date, telemetry.date(&settings.date_format)),
    );
    frame.push(
        TIME_X,
        row(0),
        health.resolve(Metric::Time, telemetry.time(&settings.time_format)),
    );
    frame.push(0, row(1), health.resolve(Metric::IpAddress, telemetry.ip_address()));
    frame.push(
        0,
        row(2),
        health.resolve(Metric::Network, telemetry.network(&settings.network_interface)),
    );
    frame.push(
        0,
        row(3),
        health.resolve(Metric::Disk, telemetry.disk(&settings.disk_mount)),
    );

    if height > row(4) {
        frame.push(
            0,
            row(4),
            health.resolve(Metric::CpuTemperature, telemetry.cpu_temperature()),
        );
        frame.push(0, row(5), health.resolve(Metric::CpuLoad, telemetry.cpu_load()));
        frame.push(0, row(6), health.resolve(Metric::Memory, telemetry.memory()));
        frame.push(0, row(7), reading.display_text(config.sensor.unit));
    }

    if height > row(8) {
        frame.push(0, row(8), health.resolve(Metric::Uptime, telemetry.uptime()));
    }

    frame
}
