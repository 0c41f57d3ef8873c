pub mod aggregate;
pub mod air_quality;
pub mod aqi;
pub mod bus;
pub mod config;
pub mod display;
pub mod env_sensor;
pub mod error;
pub mod frames;
pub mod i2c;
pub mod metrics;
pub mod smoothing;
pub mod types;
pub mod units;

pub use aggregate::{OverallStatus, PollutantAqi};
pub use air_quality::AirQualityEngine;
pub use aqi::{AqiCategory, AqiResult, BreakpointTable, Rgb, AQI_CATEGORIES};
pub use config::{HardwareConfig, HttpConfig, MonitorConfig, RuntimeConfig};
pub use display::DisplayFrame;
pub use env_sensor::{EnvSensor, EnvironmentSensor};
pub use error::{FrameError, SensorError};
pub use metrics::DeviceLabels;
pub use types::{EnvReading, MonitorStatus, ParticleCounts, Quantity, SensorSample, SensorSource};
