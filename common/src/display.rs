use crate::{aggregate::OverallStatus, aqi::Rgb, units::seconds_human_readable};

/// Everything the screen draws on one refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayFrame {
    pub aqi: u32,
    pub aqi_message: &'static str,
    pub aqi_background: Rgb,
    pub aqi_foreground: Rgb,
    pub co2_ppm: u32,
    pub co2_background: Rgb,
    pub co2_foreground: Rgb,
    pub status_led: Rgb,
    pub uptime: String,
}

impl DisplayFrame {
    pub fn from_status(status: &OverallStatus, uptime_ms: u64) -> Self {
        let aqi_category = status.overall.category;
        let co2_category = status.co2.result.category;

        Self {
            aqi: status.overall.index,
            aqi_message: aqi_category.message,
            aqi_background: aqi_category.color,
            aqi_foreground: aqi_category.color.foreground(),
            co2_ppm: status.co2.concentration.round().max(0.0) as u32,
            co2_background: co2_category.color,
            co2_foreground: co2_category.color.foreground(),
            status_led: aqi_category.led_color,
            uptime: seconds_human_readable(uptime_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn frame_uses_worst_pollutant_and_co2_colors() {
        let status = OverallStatus::from_concentrations(2.0, 8.0, 160.0, 1_650.0);

        let frame = DisplayFrame::from_status(&status, 3_600_000);

        assert_eq!(
            frame,
            DisplayFrame {
                aqi: 103,
                aqi_message: "Unhealthy for sensitive groups 🙁",
                aqi_background: Rgb(0xff7e00),
                aqi_foreground: Rgb::BLACK,
                co2_ppm: 1_650,
                co2_background: Rgb(0xff0000),
                co2_foreground: Rgb::WHITE,
                status_led: Rgb(0xff6000),
                uptime: "1h00m00s".to_string(),
            }
        );
    }
}
