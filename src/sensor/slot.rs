//! Single-writer, multi-reader hand-off of the latest sensor reading.

use chrono::{DateTime, Local};
use std::sync::{Arc, RwLock};

use super::{Measurement, TemperatureUnit};

/// Snapshot of the environment sensor.
///
/// `None` fields mean no successful read has happened yet.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorReading {
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub sampled_at: Option<DateTime<Local>>,
}

impl SensorReading {
    pub fn from_measurement(measurement: Measurement, sampled_at: DateTime<Local>) -> Self {
        Self {
            temperature: Some(measurement.temperature),
            humidity: Some(measurement.humidity),
            sampled_at: Some(sampled_at),
        }
    }

    /// Formats the atmosphere line, e.g. `Atmo: 23.45*C  45.67%`.
    pub fn display_text(&self, unit: TemperatureUnit) -> String {
        let temperature = match self.temperature {
            Some(celsius) => format!("{:.2}*{}", unit.convert(celsius), unit.symbol()),
            None => format!("--.--*{}", unit.symbol()),
        };
        let humidity = match self.humidity {
            Some(humidity) => format!("{:.2}%", humidity),
            None => "--.--%".to_string(),
        };
        format!("Atmo: {}  {}", temperature, humidity)
    }
}

/// Creates an empty slot and returns its unique writer and a reader handle.
pub fn reading_slot() -> (ReadingPublisher, ReadingSlot) {
    let cell = Arc::new(RwLock::new(SensorReading::default()));
    (
        ReadingPublisher {
            cell: Arc::clone(&cell),
        },
        ReadingSlot { cell },
    )
}

/// Write side of the slot. Not `Clone`: there is exactly one writer.
pub struct ReadingPublisher {
    cell: Arc<RwLock<SensorReading>>,
}

impl ReadingPublisher {
    /// Replaces the whole reading at once.
    pub fn publish(&self, reading: SensorReading) {
        let mut guard = self
            .cell
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = reading;
    }
}

/// Read side of the slot.
#[derive(Clone)]
pub struct ReadingSlot {
    cell: Arc<RwLock<SensorReading>>,
}

impl ReadingSlot {
    /// Returns a copy of the most recent reading. The lock is only held for
    /// the copy, never across sensor I/O.
    pub fn latest(&self) -> SensorReading {
        *self
            .cell
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
