use serde::{Deserialize, Serialize};

use crate::types::SensorSource;

const MIN_POLL_MS: u64 = 100;
const MAX_POLL_MS: u64 = 60_000;
const MIN_TIMEOUT_MS: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub smoothing_window_ms: u64,
    pub env_poll_ms: u64,
    pub particulate_poll_ms: u64,
    pub co2_poll_ms: u64,
    pub bus_lock_timeout_ms: u64,
    pub particulate_packet_timeout_ms: u64,
    pub particulate_retry_delay_ms: u64,
    pub co2_read_timeout_ms: u64,
    pub co2_retry_delay_ms: u64,
    pub display_refresh_ms: u64,
    pub summary_log_interval_ms: u64,
    pub metrics_warmup_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            smoothing_window_ms: 10_000,
            env_poll_ms: 1_000,
            particulate_poll_ms: 1_000,
            co2_poll_ms: 1_000,
            bus_lock_timeout_ms: 1_000,
            particulate_packet_timeout_ms: 5_000,
            particulate_retry_delay_ms: 1_000,
            co2_read_timeout_ms: 2_000,
            co2_retry_delay_ms: 5_000,
            display_refresh_ms: 1_000,
            summary_log_interval_ms: 600_000,
            metrics_warmup_ms: 60_000,
        }
    }
}

impl MonitorConfig {
    pub fn sanitize(&mut self) {
        for poll_ms in [
            &mut self.env_poll_ms,
            &mut self.particulate_poll_ms,
            &mut self.co2_poll_ms,
            &mut self.display_refresh_ms,
        ] {
            *poll_ms = (*poll_ms).clamp(MIN_POLL_MS, MAX_POLL_MS);
        }

        for timeout_ms in [
            &mut self.bus_lock_timeout_ms,
            &mut self.particulate_packet_timeout_ms,
            &mut self.particulate_retry_delay_ms,
            &mut self.co2_read_timeout_ms,
            &mut self.co2_retry_delay_ms,
            &mut self.summary_log_interval_ms,
        ] {
            *timeout_ms = (*timeout_ms).max(MIN_TIMEOUT_MS);
        }

        let slowest_poll_ms = self
            .env_poll_ms
            .max(self.particulate_poll_ms)
            .max(self.co2_poll_ms);
        self.smoothing_window_ms = self.smoothing_window_ms.max(slowest_poll_ms);
    }

    pub fn poll_period_ms(&self, source: SensorSource) -> u64 {
        match source {
            SensorSource::Environment => self.env_poll_ms,
            SensorSource::Particulate => self.particulate_poll_ms,
            SensorSource::Co2 => self.co2_poll_ms,
        }
    }

    /// Number of samples that fit in the smoothing window at the given poll
    /// period. Faster sensors average over more samples so every quantity
    /// responds on the same time scale.
    pub fn periods_for(&self, poll_period_ms: u64) -> u32 {
        let periods = self.smoothing_window_ms / poll_period_ms.max(1);
        periods.clamp(1, u64::from(u32::MAX)) as u32
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub i2c_sda_pin: i32,
    pub i2c_scl_pin: i32,
    pub i2c_baud_hz: u32,
    pub pms_rx_pin: i32,
    pub pms_tx_pin: i32,
    pub pms_baud: u32,
    pub bme280_address: u8,
    pub co2_address: u8,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            i2c_sda_pin: 21,
            i2c_scl_pin: 22,
            i2c_baud_hz: 100_000,
            pms_rx_pin: 26,
            pms_tx_pin: 27,
            pms_baud: 9_600,
            bme280_address: 0x76,
            co2_address: 0x08,
        }
    }
}

impl HardwareConfig {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();

        for (pin, default) in [
            (&mut self.i2c_sda_pin, defaults.i2c_sda_pin),
            (&mut self.i2c_scl_pin, defaults.i2c_scl_pin),
            (&mut self.pms_tx_pin, defaults.pms_tx_pin),
        ] {
            if !is_output_gpio(*pin) {
                *pin = default;
            }
        }
        if !is_input_gpio(self.pms_rx_pin) {
            self.pms_rx_pin = defaults.pms_rx_pin;
        }

        if !matches!(self.bme280_address, 0x76 | 0x77) {
            self.bme280_address = defaults.bme280_address;
        }
        if !is_valid_i2c_address(self.co2_address) {
            self.co2_address = defaults.co2_address;
        }

        self.i2c_baud_hz = self.i2c_baud_hz.clamp(10_000, 1_000_000);
        if self.pms_baud == 0 {
            self.pms_baud = defaults.pms_baud;
        }
    }
}

/// GPIOs an ESP32 module actually bonds out. 6..=11 drive the SPI flash.
fn is_input_gpio(pin: i32) -> bool {
    matches!(pin, 0..=5 | 12..=19 | 21..=23 | 25..=27 | 32..=39)
}

/// 34..=39 are input only.
fn is_output_gpio(pin: i32) -> bool {
    is_input_gpio(pin) && pin < 34
}

fn is_valid_i2c_address(address: u8) -> bool {
    (0x08..=0x77).contains(&address)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub hostname: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            hostname: "pneumatic".to_string(),
        }
    }
}

impl HttpConfig {
    pub fn sanitize(&mut self) {
        if self.port == 0 {
            self.port = Self::default().port;
        }
        if self.hostname.trim().is_empty() {
            self.hostname = Self::default().hostname;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub hardware: HardwareConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.monitor.sanitize();
        self.hardware.sanitize();
        self.http.sanitize();
    }
}
