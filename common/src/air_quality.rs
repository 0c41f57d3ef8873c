use crate::{
    aggregate::{OverallStatus, PollutantAqi},
    aqi::{AqiResult, BreakpointTable},
    config::MonitorConfig,
    env_sensor::NOT_FOUND_NAME,
    frames::{Co2Frame, PmsFrame},
    smoothing::SmoothedValue,
    types::{
        Co2Status, EnvReading, EnvironmentStatus, MonitorStatus, ParticleCounts, PollutantStatus,
        Quantity, SensorSample,
    },
    units::{c_to_f, seconds_human_readable},
};

/// Owns the smoothed state for every quantity. Readers feed it raw values and
/// presentation code reads smoothed values and indexes back out.
#[derive(Debug, Clone)]
pub struct AirQualityEngine {
    pub config: MonitorConfig,
    smoothed: [SmoothedValue; Quantity::COUNT],
    particles: Option<ParticleCounts>,
    env_sensor: &'static str,
}

impl AirQualityEngine {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            smoothed: [SmoothedValue::default(); Quantity::COUNT],
            particles: None,
            env_sensor: NOT_FOUND_NAME,
        }
    }

    /// Filters and smooths one raw reading using the poll period configured
    /// for its source. Returns whether the reading was kept.
    pub fn ingest(&mut self, quantity: Quantity, raw: f32) -> bool {
        let poll_period_ms = self.config.poll_period_ms(quantity.source());
        self.ingest_sample(SensorSample {
            quantity,
            value: raw,
            poll_period_ms,
        })
    }

    pub fn ingest_sample(&mut self, sample: SensorSample) -> bool {
        let periods = self.config.periods_for(sample.poll_period_ms);
        self.smoothed[sample.quantity.slot()].offer(sample.quantity, sample.value, periods)
    }

    pub fn ingest_env(&mut self, reading: &EnvReading) {
        self.ingest(Quantity::Temperature, reading.temp_c);
        self.ingest(Quantity::Pressure, reading.pressure_pa);
        self.ingest(Quantity::Humidity, reading.humidity_pct);
    }

    pub fn ingest_particulate(&mut self, frame: &PmsFrame) {
        self.ingest(Quantity::Pm1_0, f32::from(frame.pm1_0));
        self.ingest(Quantity::Pm2_5, f32::from(frame.pm2_5));
        self.ingest(Quantity::Pm10_0, f32::from(frame.pm10_0));
        self.particles = Some(frame.particles);
    }

    pub fn ingest_co2(&mut self, frame: &Co2Frame) -> bool {
        self.ingest(Quantity::Co2, f32::from(frame.co2_ppm))
    }

    pub fn set_env_sensor(&mut self, name: &'static str) {
        self.env_sensor = name;
    }

    pub fn env_sensor(&self) -> &'static str {
        self.env_sensor
    }

    /// Zero until the first accepted sample; see [`Self::has_data`].
    pub fn current_smoothed(&self, quantity: Quantity) -> f32 {
        self.smoothed[quantity.slot()].value()
    }

    pub fn has_data(&self, quantity: Quantity) -> bool {
        self.smoothed[quantity.slot()].has_data()
    }

    pub fn rejected(&self, quantity: Quantity) -> u32 {
        self.smoothed[quantity.slot()].rejected()
    }

    pub fn total_rejected(&self) -> u32 {
        self.smoothed
            .iter()
            .fold(0_u32, |total, value| total.saturating_add(value.rejected()))
    }

    pub fn particle_counts(&self) -> Option<ParticleCounts> {
        self.particles
    }

    pub fn compute_aqi(&self, table: &BreakpointTable, quantity: Quantity) -> AqiResult {
        table.aqi(self.current_smoothed(quantity))
    }

    pub fn compute_overall(&self) -> OverallStatus {
        OverallStatus::from_concentrations(
            self.current_smoothed(Quantity::Pm1_0),
            self.current_smoothed(Quantity::Pm2_5),
            self.current_smoothed(Quantity::Pm10_0),
            self.current_smoothed(Quantity::Co2),
        )
    }

    pub fn status(&self, uptime_ms: u64) -> MonitorStatus {
        let overall = self.compute_overall();
        let temp_c = self.current_smoothed(Quantity::Temperature);

        MonitorStatus {
            overall_aqi: overall.overall.index,
            overall_tag: overall.overall.category.tag,
            overall_message: overall.overall.category.message,
            overall_web_color: overall.overall.category.web_color.to_hex(),
            dominant_pollutant: overall.dominant.as_str(),
            pm1: self.pollutant_status(&overall.pm1_0_indicative, true),
            pm25: self.pollutant_status(&overall.pm2_5, false),
            pm10: self.pollutant_status(&overall.pm10_0, false),
            co2: Co2Status {
                ppm: overall.co2.concentration,
                tag: overall.co2.result.category.tag,
                message: overall.co2.result.category.message,
                web_color: overall.co2.result.category.web_color.to_hex(),
                has_data: self.has_data(Quantity::Co2),
            },
            environment: EnvironmentStatus {
                sensor: self.env_sensor,
                temp_c,
                temp_f: c_to_f(temp_c),
                humidity_pct: self.current_smoothed(Quantity::Humidity),
                pressure_hpa: self.current_smoothed(Quantity::Pressure) / 100.0,
                temp_has_data: self.has_data(Quantity::Temperature),
                humidity_has_data: self.has_data(Quantity::Humidity),
                pressure_has_data: self.has_data(Quantity::Pressure),
            },
            particles: self.particles,
            outlier_rejections: self.total_rejected(),
            uptime_ms,
            uptime: seconds_human_readable(uptime_ms),
        }
    }

    fn pollutant_status(&self, pollutant: &PollutantAqi, indicative_only: bool) -> PollutantStatus {
        PollutantStatus {
            concentration: pollutant.concentration,
            aqi: pollutant.result.index,
            tag: pollutant.result.category.tag,
            message: pollutant.result.category.message,
            web_color: pollutant.result.category.web_color.to_hex(),
            indicative_only,
            has_data: self.has_data(pollutant.quantity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aqi::{CO2, PM2_5};
    use pretty_assertions::assert_eq;

    fn engine() -> AirQualityEngine {
        AirQualityEngine::new(MonitorConfig::default())
    }

    #[test]
    fn pm2_5_sequence_with_spike_is_smoothed_not_filtered() {
        let mut engine = engine();
        for raw in [10.0, 11.0, 2_000.0, 12.0] {
            assert!(engine.ingest(Quantity::Pm2_5, raw));
        }

        // alpha = 2 / 11, starting from zero:
        // 1.8182, 3.4876, 366.4899, 302.0372
        let smoothed = engine.current_smoothed(Quantity::Pm2_5);
        assert!((smoothed - 302.0372).abs() < 1e-2, "smoothed = {smoothed}");

        let result = engine.compute_aqi(&PM2_5, Quantity::Pm2_5);
        assert_eq!(result.index, 352);
        assert_eq!(result.category.tag, "hazardous");
    }

    #[test]
    fn explicit_poll_period_changes_decay() {
        let mut engine = engine();
        assert!(engine.ingest_sample(SensorSample {
            quantity: Quantity::Pm10_0,
            value: 30.0,
            poll_period_ms: 10_000,
        }));

        assert_eq!(engine.current_smoothed(Quantity::Pm10_0), 30.0);
    }

    #[test]
    fn outlier_keeps_last_good_value() {
        let mut engine = engine();
        engine.ingest(Quantity::Temperature, 22.0);
        let before = engine.current_smoothed(Quantity::Temperature);

        assert!(!engine.ingest(Quantity::Temperature, 75.0));
        assert!(!engine.ingest(Quantity::Temperature, f32::NAN));

        assert_eq!(engine.current_smoothed(Quantity::Temperature), before);
        assert_eq!(engine.rejected(Quantity::Temperature), 2);
        assert_eq!(engine.total_rejected(), 2);
    }

    #[test]
    fn co2_frames_feed_pseudo_category() {
        let mut engine = engine();
        let frame = Co2Frame {
            co2_ppm: 1_200,
            calibration: [0, 0],
        };
        for _ in 0..200 {
            engine.ingest_co2(&frame);
        }

        assert!(!engine.ingest_co2(&Co2Frame {
            co2_ppm: 250,
            calibration: [0, 0],
        }));

        let result = engine.compute_aqi(&CO2, Quantity::Co2);
        assert_eq!(result.category.tag, "unhealthy-for-sensitive-groups");
        assert_eq!(
            engine.compute_overall().co2.result.category.tag,
            "unhealthy-for-sensitive-groups"
        );
    }

    #[test]
    fn particulate_frame_updates_counts_and_pm() {
        let mut engine = engine();
        let particles = ParticleCounts {
            gt_0_3um: 500,
            ..ParticleCounts::default()
        };
        engine.ingest_particulate(&PmsFrame {
            pm1_0_standard: 0,
            pm2_5_standard: 0,
            pm10_0_standard: 0,
            pm1_0: 11,
            pm2_5: 22,
            pm10_0: 33,
            particles,
        });

        assert_eq!(engine.particle_counts(), Some(particles));
        assert!(engine.has_data(Quantity::Pm1_0));
        assert!((engine.current_smoothed(Quantity::Pm10_0) - 6.0).abs() < 1e-4);
    }

    #[test]
    fn status_reports_missing_sources() {
        let mut engine = engine();
        engine.ingest_env(&EnvReading {
            temp_c: 20.0,
            pressure_pa: 101_000.0,
            humidity_pct: 45.0,
        });
        engine.set_env_sensor("BME280");

        let status = engine.status(61_000);

        assert_eq!(status.overall_aqi, 0);
        assert_eq!(status.overall_tag, "good");
        assert_eq!(status.dominant_pollutant, "pm2.5");
        assert!(!status.pm25.has_data);
        assert!(status.pm1.indicative_only);
        assert!(!status.co2.has_data);
        assert!(status.environment.temp_has_data);
        assert!(status.environment.humidity_has_data);
        assert!(status.environment.pressure_has_data);
        assert_eq!(status.environment.sensor, "BME280");
        assert!((status.environment.pressure_hpa - 183.6364).abs() < 1e-2);
        assert_eq!(status.uptime, "1m01s");
        assert_eq!(status.particles, None);
    }

    #[test]
    fn environment_flags_track_each_quantity() {
        let mut engine = engine();
        engine.ingest_env(&EnvReading {
            temp_c: 21.5,
            pressure_pa: 100_800.0,
            humidity_pct: 100.0,
        });

        let environment = engine.status(1_000).environment;

        assert!(environment.temp_has_data);
        assert!(environment.pressure_has_data);
        assert!(!environment.humidity_has_data);
        assert_eq!(environment.humidity_pct, 0.0);
    }
}
