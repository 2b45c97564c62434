//! The scheduler callback that samples the sensor into the reading slot.

use chrono::Local;

use super::{ReadingPublisher, Sensor, SensorError, SensorReading};

/// Log a warning after this many consecutive failed reads (about a minute at
/// the default 2s cadence).
const FAILURE_STREAK_WARNING: u32 = 30;

pub struct SensorSampler {
    sensor: Box<dyn Sensor>,
    publisher: ReadingPublisher,
    consecutive_failures: u32,
}

impl SensorSampler {
    pub fn new(sensor: Box<dyn Sensor>, publisher: ReadingPublisher) -> Self {
        Self {
            sensor,
            publisher,
            consecutive_failures: 0,
        }
    }

    /// Reads the sensor once and publishes the result if it is usable.
    ///
    /// On failure the slot keeps its previous reading.
    pub fn sample(&mut self) -> Result<SensorReading, SensorError> {
        match self.sensor.read() {
            Ok(measurement) => {
                if self.consecutive_failures >= FAILURE_STREAK_WARNING {
                    log::info!(
                        "Sensor recovered after {} failed reads",
                        self.consecutive_failures
                    );
                }
                self.consecutive_failures = 0;
                let reading = SensorReading::from_measurement(measurement, Local::now());
                self.publisher.publish(reading);
                log::debug!(
                    "Sensor sample: {:.2}°C {:.2}%",
                    measurement.temperature,
                    measurement.humidity
                );
                Ok(reading)
            }
            Err(err) => {
                self.consecutive_failures += 1;
                Err(err)
            }
        }
    }

    /// Scheduler entry point: swallows the expected transient failures and
    /// hands setup problems back to the scheduler for logging.
    pub fn tick(&mut self) -> Result<(), SensorError> {
        match self.sample() {
            Ok(_) => Ok(()),
            Err(err) if err.is_transient() => {
                log::debug!("Sensor read failed, keeping last reading: {}", err);
                if self.consecutive_failures % FAILURE_STREAK_WARNING == 0 {
                    log::warn!(
                        "Sensor has failed {} reads in a row (last: {})",
                        self.consecutive_failures,
                        err
                    );
                }
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    #[cfg(test)]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
