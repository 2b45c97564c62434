//! Environmental sensor access.
//!
//! The sensor is slow and unreliable: reads block and fail often. It is only
//! ever touched from the scheduler's worker thread; the render loop sees the
//! result through a `ReadingSlot`.

mod iio;
mod sampler;
mod slot;

pub use iio::IioSensor;
pub use sampler::SensorSampler;
pub use slot::{reading_slot, ReadingPublisher, ReadingSlot, SensorReading};

use serde::Deserialize;
use std::io;

/// Valid DHT22 humidity range in %RH.
const HUMIDITY_RANGE: std::ops::RangeInclusive<f32> = 0.0..=100.0;
/// Valid DHT22 temperature range in °C.
const TEMPERATURE_RANGE: std::ops::RangeInclusive<f32> = -40.0..=80.0;

/// One successful read, temperature in °C and relative humidity in %.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub temperature: f32,
    pub humidity: f32,
}

impl Measurement {
    /// Rejects values outside what the sensor can physically report.
    pub fn validate(self) -> Result<Self, SensorError> {
        let plausible = self.temperature.is_finite()
            && self.humidity.is_finite()
            && TEMPERATURE_RANGE.contains(&self.temperature)
            && HUMIDITY_RANGE.contains(&self.humidity);
        if plausible {
            Ok(self)
        } else {
            Err(SensorError::Implausible {
                temperature: self.temperature,
                humidity: self.humidity,
            })
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("sensor returned no data")]
    NoData,

    #[error("implausible reading: {temperature}°C, {humidity}%")]
    Implausible { temperature: f32, humidity: f32 },

    #[error("could not parse sensor value {0:?}")]
    Parse(String),

    #[error("sensor I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SensorError {
    /// Whether retrying on the next cycle can be expected to help.
    ///
    /// A missing device node or a permission problem is a setup issue; every
    /// other failure is the usual one-wire timing noise.
    pub fn is_transient(&self) -> bool {
        match self {
            SensorError::Io(err) => !matches!(
                err.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
            ),
            _ => true,
        }
    }
}

/// A blocking temperature/humidity sensor.
pub trait Sensor: Send {
    fn read(&mut self) -> Result<Measurement, SensorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn convert(self, celsius: f32) -> f32 {
        match self {
            TemperatureUnit::Celsius => celsius,
            TemperatureUnit::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            TemperatureUnit::Celsius => 'C',
            TemperatureUnit::Fahrenheit => 'F',
        }
    }
}
