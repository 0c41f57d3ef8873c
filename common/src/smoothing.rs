use std::fmt;

use log::warn;

use crate::types::Quantity;

/// Open interval of physically plausible readings. A missing lower bound means
/// only the upper bound is checked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidRange {
    pub low: Option<f32>,
    pub high: f32,
}

impl ValidRange {
    pub fn contains(&self, value: f32) -> bool {
        let above_low = self.low.map_or(true, |low| value > low);
        above_low && value < self.high
    }
}

impl fmt::Display for ValidRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.low {
            Some(low) => write!(f, "({low}, {})", self.high),
            None => write!(f, "(-inf, {})", self.high),
        }
    }
}

pub fn valid_range(quantity: Quantity) -> Option<ValidRange> {
    match quantity {
        Quantity::Temperature => Some(ValidRange {
            low: Some(-60.0),
            high: 75.0,
        }),
        Quantity::Pressure => Some(ValidRange {
            low: Some(33_000.0),
            high: 110_000.0,
        }),
        // Dry air can legitimately read near zero, so only saturation is rejected.
        Quantity::Humidity => Some(ValidRange {
            low: None,
            high: 99.99,
        }),
        Quantity::Co2 => Some(ValidRange {
            low: Some(300.0),
            high: 10_000.0,
        }),
        Quantity::Pm1_0 | Quantity::Pm2_5 | Quantity::Pm10_0 => None,
    }
}

pub fn accepts(quantity: Quantity, value: f32) -> bool {
    if !value.is_finite() {
        return false;
    }
    valid_range(quantity).map_or(true, |range| range.contains(value))
}

pub fn ewma(new_value: f32, previous: f32, periods: u32) -> f32 {
    let alpha = 2.0 / (periods.max(1) as f32 + 1.0);
    alpha * new_value + (1.0 - alpha) * previous
}

/// Running average for one quantity. Only accepted samples move it; a rejected
/// sample leaves the value exactly where it was.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SmoothedValue {
    value: f32,
    accepted: u32,
    rejected: u32,
}

impl SmoothedValue {
    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn accepted(&self) -> u32 {
        self.accepted
    }

    pub fn rejected(&self) -> u32 {
        self.rejected
    }

    pub fn has_data(&self) -> bool {
        self.accepted > 0
    }

    pub fn offer(&mut self, quantity: Quantity, raw: f32, periods: u32) -> bool {
        if !accepts(quantity, raw) {
            self.rejected = self.rejected.saturating_add(1);
            match valid_range(quantity) {
                Some(range) => warn!(
                    "discarding {} reading {raw} {}: outside {range}",
                    quantity.as_str(),
                    quantity.unit()
                ),
                None => warn!("discarding non-finite {} reading", quantity.as_str()),
            }
            return false;
        }

        self.value = ewma(raw, self.value, periods);
        self.accepted = self.accepted.saturating_add(1);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn single_period_takes_new_value() {
        assert_eq!(ewma(42.0, 7.0, 1), 42.0);
        assert_eq!(ewma(42.0, 7.0, 0), 42.0);
    }

    #[test]
    fn repeated_input_converges() {
        let mut value = 0.0;
        for _ in 0..200 {
            value = ewma(25.0, value, 10);
        }
        assert!((value - 25.0).abs() < 1e-3, "value = {value}");
    }

    #[test]
    fn temperature_bounds_are_open() {
        assert!(!accepts(Quantity::Temperature, -60.0));
        assert!(!accepts(Quantity::Temperature, 75.0));
        assert!(accepts(Quantity::Temperature, -59.999));
        assert!(accepts(Quantity::Temperature, 74.999));
    }

    #[test]
    fn pressure_and_co2_bounds() {
        assert!(!accepts(Quantity::Pressure, 33_000.0));
        assert!(accepts(Quantity::Pressure, 101_325.0));
        assert!(!accepts(Quantity::Pressure, 110_000.0));
        assert!(!accepts(Quantity::Co2, 300.0));
        assert!(accepts(Quantity::Co2, 415.0));
        assert!(!accepts(Quantity::Co2, 10_000.0));
    }

    #[test]
    fn humidity_only_rejects_saturation() {
        assert!(accepts(Quantity::Humidity, 0.0));
        assert!(accepts(Quantity::Humidity, -3.0));
        assert!(accepts(Quantity::Humidity, 99.98));
        assert!(!accepts(Quantity::Humidity, 99.99));
        assert!(!accepts(Quantity::Humidity, 100.0));
    }

    #[test]
    fn particulates_accept_any_finite_value() {
        assert!(accepts(Quantity::Pm2_5, 2_000.0));
        assert!(accepts(Quantity::Pm10_0, -1.0));
        assert!(!accepts(Quantity::Pm2_5, f32::NAN));
        assert!(!accepts(Quantity::Pm1_0, f32::INFINITY));
    }

    #[test]
    fn rejected_sample_keeps_previous_value() {
        let mut smoothed = SmoothedValue::default();
        assert!(smoothed.offer(Quantity::Temperature, 20.0, 1));
        assert!(!smoothed.offer(Quantity::Temperature, 80.0, 1));

        assert_eq!(smoothed.value(), 20.0);
        assert_eq!(smoothed.accepted(), 1);
        assert_eq!(smoothed.rejected(), 1);
    }

    #[test]
    fn first_sample_blends_with_zero() {
        let mut smoothed = SmoothedValue::default();
        assert!(!smoothed.has_data());

        smoothed.offer(Quantity::Co2, 1_100.0, 10);

        assert!(smoothed.has_data());
        assert!((smoothed.value() - 200.0).abs() < 1e-3);
    }

    #[test]
    fn range_display() {
        assert_eq!(valid_range(Quantity::Temperature).unwrap().to_string(), "(-60, 75)");
        assert_eq!(valid_range(Quantity::Humidity).unwrap().to_string(), "(-inf, 99.99)");
    }
}
