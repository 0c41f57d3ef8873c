//! Stand-ins for the sensors so the host build exercises the same frame
//! parsing, bus arbitration and smoothing paths as the device.

use pneumatic_common::{
    frames::{Co2Frame, PmsFrame, CO2_FRAME_LEN},
    EnvReading, EnvSensor, EnvironmentSensor, ParticleCounts, SensorError,
};

/// Every Nth transfer arrives damaged, like a marginal cable would.
const CORRUPT_EVERY: u64 = 17;
/// Every Nth environment reading is an implausible spike.
const SPIKE_EVERY: u64 = 29;

pub type HostEnvSensor = EnvSensor<SimulatedBme280, SimulatedBme68x>;

/// The shared I2C bus and the CO2 sensor that sits on it.
#[derive(Debug, Default)]
pub struct SimulatedBus {
    tick: u64,
}

impl SimulatedBus {
    pub fn read_co2_frame(&mut self) -> [u8; CO2_FRAME_LEN] {
        let tick = self.tick;
        self.tick = self.tick.wrapping_add(1);

        let co2_ppm = 620 + ((tick % 12) as u16 * 35);
        let mut raw = Co2Frame {
            co2_ppm,
            calibration: [0x0001, 0x0000],
        }
        .encode();

        if tick % CORRUPT_EVERY == CORRUPT_EVERY - 1 {
            raw[5] ^= 0x20;
        }
        raw
    }
}

fn env_reading(tick: u64) -> EnvReading {
    if tick % SPIKE_EVERY == SPIKE_EVERY - 1 {
        return EnvReading {
            temp_c: 85.0,
            pressure_pa: 101_200.0,
            humidity_pct: 100.0,
        };
    }

    EnvReading {
        temp_c: 21.0 + ((tick % 8) as f32 * 0.2),
        pressure_pa: 101_200.0 + ((tick % 5) as f32 * 12.5),
        humidity_pct: 42.0 + ((tick % 6) as f32 * 0.5),
    }
}

#[derive(Debug, Default)]
pub struct SimulatedBme280 {
    tick: u64,
}

impl EnvironmentSensor for SimulatedBme280 {
    fn name(&self) -> &'static str {
        "BME280"
    }

    fn read(&mut self) -> Result<Option<EnvReading>, SensorError> {
        let reading = env_reading(self.tick);
        self.tick = self.tick.wrapping_add(1);
        Ok(Some(reading))
    }
}

/// BSEC only produces a fresh sample on alternate polls.
#[derive(Debug, Default)]
pub struct SimulatedBme68x {
    tick: u64,
}

impl EnvironmentSensor for SimulatedBme68x {
    fn name(&self) -> &'static str {
        "BME68x"
    }

    fn read(&mut self) -> Result<Option<EnvReading>, SensorError> {
        let tick = self.tick;
        self.tick = self.tick.wrapping_add(1);
        if tick % 2 == 1 {
            return Ok(None);
        }
        Ok(Some(env_reading(tick / 2)))
    }
}

/// `kind` names the chip that should answer: `bme280`, `bme68x` or anything
/// else for none.
pub fn probe_env(kind: &str) -> HostEnvSensor {
    EnvSensor::probe(
        || match kind {
            "bme280" => Ok(SimulatedBme280::default()),
            _ => Err(SensorError::NotFound("BME280")),
        },
        || match kind {
            "bme68x" => Ok(SimulatedBme68x::default()),
            _ => Err(SensorError::NotFound("BME68x")),
        },
    )
}

/// Serial output of a PMSx003, one chunk per measurement.
#[derive(Debug, Default)]
pub struct SimulatedPms {
    tick: u64,
}

impl SimulatedPms {
    pub fn next_chunk(&mut self) -> Vec<u8> {
        let tick = self.tick;
        self.tick = self.tick.wrapping_add(1);

        let pm2_5 = 6 + (tick % 10) as u16;
        let frame = PmsFrame {
            pm1_0_standard: pm2_5 / 2,
            pm2_5_standard: pm2_5,
            pm10_0_standard: pm2_5 + 4,
            pm1_0: pm2_5 / 2,
            pm2_5,
            pm10_0: pm2_5 + 4,
            particles: ParticleCounts {
                gt_0_3um: 900 + pm2_5 * 10,
                gt_0_5um: 260 + pm2_5 * 3,
                gt_1_0um: 40 + pm2_5,
                gt_2_5um: 5,
                gt_5_0um: 2,
                gt_10um: (tick % 2) as u16,
            },
        };

        let mut chunk = Vec::with_capacity(36);
        if tick % 7 == 3 {
            chunk.extend_from_slice(&[0x00, 0xfe, 0x13]);
        }
        chunk.extend_from_slice(&frame.encode());
        if tick % CORRUPT_EVERY == CORRUPT_EVERY - 1 {
            let last = chunk.len() - 1;
            chunk[last] ^= 0x01;
        }
        chunk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pneumatic_common::frames::verify;

    #[test]
    fn probe_follows_requested_chip() {
        assert_eq!(probe_env("bme280").name(), "BME280");
        assert_eq!(probe_env("bme68x").name(), "BME68x");
        assert_eq!(probe_env("none").name(), "BME not found");
    }

    #[test]
    fn bme68x_reports_on_alternate_polls() {
        let mut sensor = SimulatedBme68x::default();
        assert!(sensor.read().unwrap().is_some());
        assert!(sensor.read().unwrap().is_none());
        assert!(sensor.read().unwrap().is_some());
    }

    #[test]
    fn co2_frames_are_valid_until_corrupted() {
        let mut bus = SimulatedBus::default();
        for tick in 0..CORRUPT_EVERY {
            let raw = bus.read_co2_frame();
            assert_eq!(verify(&raw).is_ok(), tick != CORRUPT_EVERY - 1, "tick {tick}");
        }
    }
}
