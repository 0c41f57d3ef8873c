//! Prometheus text exposition of the monitor's state.

use std::fmt::{self, Write};

use crate::{aqi, types::Quantity, AirQualityEngine};

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

const PARTICULATE_SENSOR: &str = "PMSA003";
const CO2_SENSOR: &str = "DS-CO2-20";

/// Identity labels attached to every line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceLabels {
    pub mac_address: String,
    pub ip_address: String,
    pub hostname: String,
}

/// A label value with backslashes, quotes and newlines escaped.
struct LabelValue<'a>(&'a str);

impl fmt::Display for LabelValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0.chars() {
            match c {
                '\\' => f.write_str("\\\\")?,
                '"' => f.write_str("\\\"")?,
                '\n' => f.write_str("\\n")?,
                c => f.write_char(c)?,
            }
        }
        Ok(())
    }
}

struct MetricWriter<'a> {
    out: String,
    labels: &'a DeviceLabels,
}

impl MetricWriter<'_> {
    fn line(&mut self, name: &str, fields: &[(&str, &str)], value: impl std::fmt::Display) {
        let _ = write!(
            self.out,
            "{name}{{mac_address=\"{}\",ip_address=\"{}\",hostname=\"{}\"",
            LabelValue(&self.labels.mac_address),
            LabelValue(&self.labels.ip_address),
            LabelValue(&self.labels.hostname)
        );
        for (key, field) in fields {
            let _ = write!(self.out, ",{key}=\"{}\"", LabelValue(field));
        }
        let _ = writeln!(self.out, "}} {value}");
    }
}

/// Sensor lines are held back until `warmup_ms` of uptime so scrapers do not
/// record the smoothing warm-up from zero.
pub fn render_varz(
    engine: &AirQualityEngine,
    labels: &DeviceLabels,
    uptime_ms: u64,
    warmup_ms: u64,
) -> String {
    let mut writer = MetricWriter {
        out: String::new(),
        labels,
    };

    writer.line("uptime_ms", &[], uptime_ms);

    if uptime_ms < warmup_ms {
        return writer.out;
    }

    let particulates = [
        (Quantity::Pm1_0, &aqi::PM2_5),
        (Quantity::Pm2_5, &aqi::PM2_5),
        (Quantity::Pm10_0, &aqi::PM10_0),
    ];
    for (quantity, _) in particulates {
        writer.line(
            "pm_ug_m3",
            &[("sensor", PARTICULATE_SENSOR), ("size", quantity.as_str())],
            format_args!("{:.2}", engine.current_smoothed(quantity)),
        );
    }
    for (quantity, table) in particulates {
        writer.line(
            "us_aqi",
            &[("sensor", PARTICULATE_SENSOR), ("size", quantity.as_str())],
            engine.compute_aqi(table, quantity).index,
        );
    }

    writer.line(
        "co2_ppm",
        &[("sensor", CO2_SENSOR)],
        format_args!("{:.0}", engine.current_smoothed(Quantity::Co2)),
    );

    let env_sensor = engine.env_sensor();
    for (name, quantity) in [
        ("temp_c", Quantity::Temperature),
        ("pressure_pa", Quantity::Pressure),
        ("humidity_percent", Quantity::Humidity),
    ] {
        writer.line(
            name,
            &[("sensor", env_sensor)],
            format_args!("{:.2}", engine.current_smoothed(quantity)),
        );
    }

    for quantity in Quantity::ALL {
        writer.line(
            "outlier_rejections_total",
            &[("quantity", quantity.as_str())],
            engine.rejected(quantity),
        );
    }

    writer.out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use pretty_assertions::assert_eq;

    fn labels() -> DeviceLabels {
        DeviceLabels {
            mac_address: "24:6f:28:aa:bb:cc".to_string(),
            ip_address: "192.168.1.40".to_string(),
            hostname: "pneumatic".to_string(),
        }
    }

    #[test]
    fn only_uptime_during_warmup() {
        let engine = AirQualityEngine::new(MonitorConfig::default());

        assert_eq!(
            render_varz(&engine, &labels(), 59_999, 60_000),
            "uptime_ms{mac_address=\"24:6f:28:aa:bb:cc\",ip_address=\"192.168.1.40\",hostname=\"pneumatic\"} 59999\n"
        );
    }

    #[test]
    fn sensor_lines_after_warmup() {
        let mut engine = AirQualityEngine::new(MonitorConfig {
            smoothing_window_ms: 1_000,
            ..MonitorConfig::default()
        });
        engine.set_env_sensor("BME280");
        engine.ingest(Quantity::Pm2_5, 12.0);
        engine.ingest(Quantity::Co2, 640.0);
        engine.ingest(Quantity::Temperature, 21.25);
        engine.ingest(Quantity::Humidity, 120.0);

        let body = render_varz(&engine, &labels(), 60_000, 60_000);
        let lines: Vec<&str> = body.lines().collect();
        let prefix = "mac_address=\"24:6f:28:aa:bb:cc\",ip_address=\"192.168.1.40\",hostname=\"pneumatic\"";

        assert_eq!(lines.len(), 1 + 3 + 3 + 1 + 3 + Quantity::COUNT);
        assert_eq!(
            lines[2],
            format!("pm_ug_m3{{{prefix},sensor=\"PMSA003\",size=\"pm2.5\"}} 12.00")
        );
        assert_eq!(
            lines[5],
            format!("us_aqi{{{prefix},sensor=\"PMSA003\",size=\"pm2.5\"}} 50")
        );
        assert_eq!(lines[7], format!("co2_ppm{{{prefix},sensor=\"DS-CO2-20\"}} 640"));
        assert_eq!(lines[8], format!("temp_c{{{prefix},sensor=\"BME280\"}} 21.25"));
        assert!(body.contains("outlier_rejections_total{"));
        assert!(body.contains(",quantity=\"humidity\"} 1\n"));
    }

    #[test]
    fn label_values_are_escaped() {
        let mut engine = AirQualityEngine::new(MonitorConfig::default());
        engine.set_env_sensor("BME\"280");
        let labels = DeviceLabels {
            hostname: "desk\\lab\"2\"\nnext".to_string(),
            ..labels()
        };

        let body = render_varz(&engine, &labels, 60_000, 60_000);

        assert!(body.starts_with(
            "uptime_ms{mac_address=\"24:6f:28:aa:bb:cc\",ip_address=\"192.168.1.40\",hostname=\"desk\\\\lab\\\"2\\\"\\nnext\"} 60000\n"
        ));
        assert!(body.contains("temp_c{"));
        assert!(body.contains(",sensor=\"BME\\\"280\"} 0.00\n"));
        assert_eq!(body.lines().count(), 1 + 3 + 3 + 1 + 3 + Quantity::COUNT);
    }
}
