use log::{info, warn};

use crate::{error::SensorError, types::EnvReading};

pub const NOT_FOUND_NAME: &str = "BME not found";

/// A temperature/pressure/humidity chip that has already been initialized.
pub trait EnvironmentSensor {
    fn name(&self) -> &'static str;

    /// `Ok(None)` means the chip is healthy but has nothing new to report yet.
    fn read(&mut self) -> Result<Option<EnvReading>, SensorError>;
}

/// Whichever environment chip answered at startup.
#[derive(Debug)]
pub enum EnvSensor<A, B> {
    None,
    Bme280(A),
    Bme68x(B),
}

impl<A: EnvironmentSensor, B: EnvironmentSensor> EnvSensor<A, B> {
    /// Tries the BME280 first and the BME68x second. The second probe is
    /// skipped once the first one succeeds.
    pub fn probe<P280, P68x>(probe_bme280: P280, probe_bme68x: P68x) -> Self
    where
        P280: FnOnce() -> Result<A, SensorError>,
        P68x: FnOnce() -> Result<B, SensorError>,
    {
        match probe_bme280() {
            Ok(sensor) => {
                info!("found {}", sensor.name());
                return Self::Bme280(sensor);
            }
            Err(err) => info!("BME280 probe failed: {err}"),
        }

        match probe_bme68x() {
            Ok(sensor) => {
                info!("found {}", sensor.name());
                Self::Bme68x(sensor)
            }
            Err(err) => {
                info!("BME68x probe failed: {err}");
                warn!("no environment sensor found; temperature, pressure and humidity stay empty");
                Self::None
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => NOT_FOUND_NAME,
            Self::Bme280(sensor) => sensor.name(),
            Self::Bme68x(sensor) => sensor.name(),
        }
    }

    pub fn is_present(&self) -> bool {
        !matches!(self, Self::None)
    }

    pub fn poll(&mut self) -> Result<Option<EnvReading>, SensorError> {
        match self {
            Self::None => Ok(None),
            Self::Bme280(sensor) => sensor.read(),
            Self::Bme68x(sensor) => sensor.read(),
        }
    }
}
