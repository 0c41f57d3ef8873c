use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Quantity {
    Temperature,
    Pressure,
    Humidity,
    Co2,
    #[serde(rename = "pm1.0")]
    Pm1_0,
    #[serde(rename = "pm2.5")]
    Pm2_5,
    #[serde(rename = "pm10.0")]
    Pm10_0,
}

impl Quantity {
    pub const COUNT: usize = 7;

    pub const ALL: [Quantity; Self::COUNT] = [
        Self::Temperature,
        Self::Pressure,
        Self::Humidity,
        Self::Co2,
        Self::Pm1_0,
        Self::Pm2_5,
        Self::Pm10_0,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Pressure => "pressure",
            Self::Humidity => "humidity",
            Self::Co2 => "co2",
            Self::Pm1_0 => "pm1.0",
            Self::Pm2_5 => "pm2.5",
            Self::Pm10_0 => "pm10.0",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Self::Temperature => "°C",
            Self::Pressure => "Pa",
            Self::Humidity => "%",
            Self::Co2 => "ppm",
            Self::Pm1_0 | Self::Pm2_5 | Self::Pm10_0 => "µg/m³",
        }
    }

    pub fn source(self) -> SensorSource {
        match self {
            Self::Temperature | Self::Pressure | Self::Humidity => SensorSource::Environment,
            Self::Co2 => SensorSource::Co2,
            Self::Pm1_0 | Self::Pm2_5 | Self::Pm10_0 => SensorSource::Particulate,
        }
    }

    pub(crate) fn slot(self) -> usize {
        self as usize
    }
}

/// The physical device family a quantity is read from. Each one is polled on
/// its own schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorSource {
    Environment,
    Particulate,
    Co2,
}

impl SensorSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Environment => "environment",
            Self::Particulate => "particulate",
            Self::Co2 => "co2",
        }
    }
}

/// One raw reading plus the poll period of the reader that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    pub quantity: Quantity,
    pub value: f32,
    pub poll_period_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvReading {
    pub temp_c: f32,
    pub pressure_pa: f32,
    pub humidity_pct: f32,
}

/// Particles per 0.1 L of air above each diameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParticleCounts {
    #[serde(rename = "gt0_3um")]
    pub gt_0_3um: u16,
    #[serde(rename = "gt0_5um")]
    pub gt_0_5um: u16,
    #[serde(rename = "gt1_0um")]
    pub gt_1_0um: u16,
    #[serde(rename = "gt2_5um")]
    pub gt_2_5um: u16,
    #[serde(rename = "gt5_0um")]
    pub gt_5_0um: u16,
    #[serde(rename = "gt10um")]
    pub gt_10um: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct PollutantStatus {
    pub concentration: f32,
    pub aqi: u32,
    pub tag: &'static str,
    pub message: &'static str,
    #[serde(rename = "webColor")]
    pub web_color: String,
    #[serde(rename = "indicativeOnly")]
    pub indicative_only: bool,
    #[serde(rename = "hasData")]
    pub has_data: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Co2Status {
    pub ppm: f32,
    pub tag: &'static str,
    pub message: &'static str,
    #[serde(rename = "webColor")]
    pub web_color: String,
    #[serde(rename = "hasData")]
    pub has_data: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentStatus {
    pub sensor: &'static str,
    #[serde(rename = "tempC")]
    pub temp_c: f32,
    #[serde(rename = "tempF")]
    pub temp_f: f32,
    #[serde(rename = "humidityPct")]
    pub humidity_pct: f32,
    #[serde(rename = "pressureHpa")]
    pub pressure_hpa: f32,
    #[serde(rename = "tempHasData")]
    pub temp_has_data: bool,
    #[serde(rename = "humidityHasData")]
    pub humidity_has_data: bool,
    #[serde(rename = "pressureHasData")]
    pub pressure_has_data: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    #[serde(rename = "overallAqi")]
    pub overall_aqi: u32,
    #[serde(rename = "overallTag")]
    pub overall_tag: &'static str,
    #[serde(rename = "overallMessage")]
    pub overall_message: &'static str,
    #[serde(rename = "overallWebColor")]
    pub overall_web_color: String,
    #[serde(rename = "dominantPollutant")]
    pub dominant_pollutant: &'static str,
    pub pm1: PollutantStatus,
    pub pm25: PollutantStatus,
    pub pm10: PollutantStatus,
    pub co2: Co2Status,
    pub environment: EnvironmentStatus,
    pub particles: Option<ParticleCounts>,
    #[serde(rename = "outlierRejections")]
    pub outlier_rejections: u32,
    #[serde(rename = "uptimeMs")]
    pub uptime_ms: u64,
    pub uptime: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn quantity_slots_follow_declaration_order() {
        for (slot, quantity) in Quantity::ALL.iter().enumerate() {
            assert_eq!(quantity.slot(), slot);
        }
    }

    #[test]
    fn particulate_names_keep_their_decimal_point() {
        assert_eq!(
            serde_json::to_string(&Quantity::Pm2_5).unwrap(),
            "\"pm2.5\""
        );
        assert_eq!(Quantity::Pm10_0.as_str(), "pm10.0");
        assert_eq!(Quantity::Co2.source(), SensorSource::Co2);
    }
}
