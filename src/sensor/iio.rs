//! DHT11/DHT22 readings through the Linux `dht11` IIO driver.
//!
//! With `dtoverlay=dht11,gpiopin=18` the kernel exposes the sensor as an IIO
//! device. Each attribute read triggers a fresh one-wire transfer, which fails
//! with EIO or ETIMEDOUT whenever the timing glitches.

use std::fs;
use std::path::{Path, PathBuf};

use super::{Measurement, Sensor, SensorError};

const TEMPERATURE_ATTR: &str = "in_temp_input";
const HUMIDITY_ATTR: &str = "in_humidityrelative_input";

pub struct IioSensor {
    device: PathBuf,
}

impl IioSensor {
    pub fn new(device: &Path) -> Self {
        Self {
            device: device.to_path_buf(),
        }
    }

    /// Reads an attribute reported in thousandths of a unit.
    fn read_milli(&self, attribute: &str) -> Result<f32, SensorError> {
        let raw = fs::read_to_string(self.device.join(attribute))?;
        let value = raw.trim();
        if value.is_empty() {
            return Err(SensorError::NoData);
        }
        value
            .parse::<i64>()
            .map(|milli| milli as f32 / 1000.0)
            .map_err(|_| SensorError::Parse(value.to_string()))
    }
}

impl Sensor for IioSensor {
    fn read(&mut self) -> Result<Measurement, SensorError> {
        let humidity = self.read_milli(HUMIDITY_ATTR)?;
        let temperature = self.read_milli(TEMPERATURE_ATTR)?;
        Measurement {
            temperature,
            humidity,
        }
        .validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device_with(temperature: &str, humidity: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(TEMPERATURE_ATTR), temperature).unwrap();
        fs::write(dir.path().join(HUMIDITY_ATTR), humidity).unwrap();
        dir
    }

    #[test]
    fn reads_milli_units() {
        let dir = device_with("23400\n", "45100\n");
        let mut sensor = IioSensor::new(dir.path());
        let m = sensor.read().unwrap();
        assert!((m.temperature - 23.4).abs() < 0.001);
        assert!((m.humidity - 45.1).abs() < 0.001);
    }

    #[test]
    fn negative_temperature() {
        let dir = device_with("-5200", "80000");
        let mut sensor = IioSensor::new(dir.path());
        assert!((sensor.read().unwrap().temperature + 5.2).abs() < 0.001);
    }

    #[test]
    fn missing_device_is_not_transient() {
        let dir = tempfile::tempdir().unwrap();
        let mut sensor = IioSensor::new(&dir.path().join("iio:device9"));
        let err = sensor.read().unwrap_err();
        assert!(matches!(err, SensorError::Io(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn empty_attribute_is_no_data() {
        let dir = device_with("", "45000");
        let mut sensor = IioSensor::new(dir.path());
        assert!(matches!(sensor.read(), Err(SensorError::NoData)));
    }

    #[test]
    fn garbage_attribute_is_parse_error() {
        let dir = device_with("23400", "n/a");
        let mut sensor = IioSensor::new(dir.path());
        assert!(matches!(sensor.read(), Err(SensorError::Parse(_))));
    }

    #[test]
    fn implausible_value_rejected() {
        let dir = device_with("23400", "250000");
        let mut sensor = IioSensor::new(dir.path());
        assert!(matches!(sensor.read(), Err(SensorError::Implausible { .. })));
    }
}
