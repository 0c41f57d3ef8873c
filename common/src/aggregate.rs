use crate::{
    aqi::{self, AqiResult},
    types::Quantity,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollutantAqi {
    pub quantity: Quantity,
    pub concentration: f32,
    pub result: AqiResult,
}

/// Snapshot handed to presentation adapters. It is rebuilt from the current
/// smoothed values on every request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverallStatus {
    pub overall: AqiResult,
    pub dominant: Quantity,
    pub pm2_5: PollutantAqi,
    pub pm10_0: PollutantAqi,
    /// PM1.0 has no index of its own. It is pushed through the PM2.5 table
    /// as a color hint only and never competes for `overall`.
    pub pm1_0_indicative: PollutantAqi,
    /// CO2 severity on the borrowed scale, also kept out of `overall`.
    pub co2: PollutantAqi,
}

/// PM2.5 wins unless PM10 is strictly worse.
pub fn worst_of(pm2_5: AqiResult, pm10_0: AqiResult) -> (AqiResult, Quantity) {
    if pm10_0.index > pm2_5.index {
        (pm10_0, Quantity::Pm10_0)
    } else {
        (pm2_5, Quantity::Pm2_5)
    }
}

impl OverallStatus {
    pub fn from_concentrations(pm1_0: f32, pm2_5: f32, pm10_0: f32, co2_ppm: f32) -> Self {
        let pm2_5 = PollutantAqi {
            quantity: Quantity::Pm2_5,
            concentration: pm2_5,
            result: aqi::PM2_5.aqi(pm2_5),
        };
        let pm10_0 = PollutantAqi {
            quantity: Quantity::Pm10_0,
            concentration: pm10_0,
            result: aqi::PM10_0.aqi(pm10_0),
        };
        let (overall, dominant) = worst_of(pm2_5.result, pm10_0.result);

        Self {
            overall,
            dominant,
            pm2_5,
            pm10_0,
            pm1_0_indicative: PollutantAqi {
                quantity: Quantity::Pm1_0,
                concentration: pm1_0,
                result: aqi::PM2_5.aqi(pm1_0),
            },
            co2: PollutantAqi {
                quantity: Quantity::Co2,
                concentration: co2_ppm,
                result: aqi::CO2.aqi(co2_ppm),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn worse_pm10_takes_over() {
        let (overall, dominant) = worst_of(AqiResult::from_index(80), AqiResult::from_index(120));

        assert_eq!(overall.index, 120);
        assert_eq!(overall.category.tag, "unhealthy-for-sensitive-groups");
        assert_eq!(dominant, Quantity::Pm10_0);
    }

    #[test]
    fn tie_goes_to_pm2_5() {
        let (overall, dominant) = worst_of(AqiResult::from_index(97), AqiResult::from_index(97));

        assert_eq!(overall.index, 97);
        assert_eq!(overall.category.tag, "moderate");
        assert_eq!(dominant, Quantity::Pm2_5);
    }

    #[test]
    fn pm1_0_and_co2_never_drive_overall() {
        let status = OverallStatus::from_concentrations(400.0, 5.0, 20.0, 4_500.0);

        assert_eq!(status.overall.index, 21);
        assert_eq!(status.dominant, Quantity::Pm2_5);
        assert!(status.pm1_0_indicative.result.index > 400);
        assert_eq!(status.co2.result.category.tag, "very-hazardous");
    }

    #[test]
    fn no_data_reads_as_good() {
        let status = OverallStatus::from_concentrations(0.0, 0.0, 0.0, 0.0);

        assert_eq!(status.overall.index, 0);
        assert_eq!(status.overall.category.tag, "good");
        assert_eq!(status.co2.result.index, 0);
    }
}
