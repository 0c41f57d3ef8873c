//! Breakpoint tables and the piecewise-linear concentration to index mapping.
//!
//! Every table has one concentration range per severity level, so level `i`
//! of any table always interpolates into the AQI bounds of
//! `AQI_CATEGORIES[i]`.

pub const LEVELS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u32);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0x000000);
    pub const WHITE: Rgb = Rgb(0xffffff);

    pub fn r(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn g(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn b(self) -> u8 {
        self.0 as u8
    }

    /// Black or white, whichever reads better on top of this color.
    pub fn foreground(self) -> Rgb {
        let brightness =
            u32::from(self.r()) * 299 + u32::from(self.g()) * 587 + u32::from(self.b()) * 114;
        if brightness > 127_500 {
            Self::BLACK
        } else {
            Self::WHITE
        }
    }

    pub fn to_rgb565(self) -> u16 {
        let r = u16::from(self.r()) & 0xf8;
        let g = u16::from(self.g()) & 0xfc;
        let b = u16::from(self.b());
        (r << 8) | (g << 3) | (b >> 3)
    }

    pub fn to_hex(self) -> String {
        format!("#{:06x}", self.0 & 0xff_ffff)
    }
}

#[derive(Debug, PartialEq)]
pub struct AqiCategory {
    pub tag: &'static str,
    pub message: &'static str,
    pub low_aqi: u32,
    pub high_aqi: u32,
    pub color: Rgb,
    pub web_color: Rgb,
    pub led_color: Rgb,
}

pub static AQI_CATEGORIES: [AqiCategory; LEVELS] = [
    AqiCategory {
        tag: "good",
        message: "Good 😀",
        low_aqi: 0,
        high_aqi: 50,
        color: Rgb(0x00e400),
        web_color: Rgb(0x68e143),
        led_color: Rgb(0x00ff00),
    },
    AqiCategory {
        tag: "moderate",
        message: "Moderate 😐",
        low_aqi: 51,
        high_aqi: 100,
        color: Rgb(0xffff00),
        web_color: Rgb(0xffff55),
        led_color: Rgb(0xffff00),
    },
    AqiCategory {
        tag: "unhealthy-for-sensitive-groups",
        message: "Unhealthy for sensitive groups 🙁",
        low_aqi: 101,
        high_aqi: 150,
        color: Rgb(0xff7e00),
        web_color: Rgb(0xef8533),
        led_color: Rgb(0xff6000),
    },
    AqiCategory {
        tag: "unhealthy",
        message: "Unhealthy 😷",
        low_aqi: 151,
        high_aqi: 200,
        color: Rgb(0xff0000),
        web_color: Rgb(0xea3324),
        led_color: Rgb(0xff0000),
    },
    AqiCategory {
        tag: "very-unhealthy",
        message: "Very Unhealthy 🤢",
        low_aqi: 201,
        high_aqi: 300,
        color: Rgb(0x8f3f97),
        web_color: Rgb(0x8c1a4b),
        led_color: Rgb(0xff0020),
    },
    AqiCategory {
        tag: "hazardous",
        message: "Hazardous 😵",
        low_aqi: 301,
        high_aqi: 400,
        color: Rgb(0x7e0023),
        web_color: Rgb(0x8c1a4b),
        led_color: Rgb(0xff0040),
    },
    AqiCategory {
        tag: "very-hazardous",
        message: "Very Hazardous ☠️",
        low_aqi: 401,
        high_aqi: 500,
        color: Rgb(0x7e0023),
        web_color: Rgb(0x731425),
        led_color: Rgb(0xff0060),
    },
];

/// First category whose upper bound covers `index`; anything past the table
/// saturates at the most severe category.
pub fn category_for(index: u32) -> &'static AqiCategory {
    AQI_CATEGORIES
        .iter()
        .find(|category| index <= category.high_aqi)
        .unwrap_or(&AQI_CATEGORIES[LEVELS - 1])
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConcentrationRange {
    pub low: f32,
    pub high: f32,
}

const fn range(low: f32, high: f32) -> ConcentrationRange {
    ConcentrationRange { low, high }
}

#[derive(Debug, PartialEq)]
pub struct BreakpointTable {
    pub name: &'static str,
    pub truncate_decimals: u8,
    pub levels: [ConcentrationRange; LEVELS],
}

pub static PM2_5: BreakpointTable = BreakpointTable {
    name: "pm2.5",
    truncate_decimals: 1,
    levels: [
        range(0.0, 12.0),
        range(12.1, 35.4),
        range(35.5, 55.4),
        range(55.5, 150.4),
        range(150.5, 250.4),
        range(250.5, 350.4),
        range(350.5, 500.4),
    ],
};

pub static PM10_0: BreakpointTable = BreakpointTable {
    name: "pm10.0",
    truncate_decimals: 0,
    levels: [
        range(0.0, 54.0),
        range(55.0, 154.0),
        range(155.0, 254.0),
        range(255.0, 354.0),
        range(355.0, 424.0),
        range(425.0, 504.0),
        range(505.0, 604.0),
    ],
};

/// CO2 has no official index. These ppm bands only borrow the severity scale
/// so the display can color CO2 consistently with particulates.
pub static CO2: BreakpointTable = BreakpointTable {
    name: "co2",
    truncate_decimals: 0,
    levels: [
        range(0.0, 700.0),
        range(701.0, 1000.0),
        range(1001.0, 1500.0),
        range(1501.0, 2000.0),
        range(2001.0, 3000.0),
        range(3001.0, 4000.0),
        range(4001.0, 5000.0),
    ],
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AqiResult {
    pub index: u32,
    pub category: &'static AqiCategory,
}

impl AqiResult {
    pub fn from_index(index: u32) -> Self {
        Self {
            index,
            category: category_for(index),
        }
    }
}

impl BreakpointTable {
    /// Scaling stays in f32 so the multiply rounds 12.2 (stored as 12.1999…)
    /// back onto 122 before the fraction is cut.
    pub fn truncate(&self, concentration: f32) -> f32 {
        let scale = 10_f32.powi(i32::from(self.truncate_decimals));
        (concentration * scale).trunc() / scale
    }

    pub fn aqi(&self, concentration: f32) -> AqiResult {
        let concentration = self.truncate(concentration);
        let level = self
            .levels
            .iter()
            .position(|range| concentration <= range.high)
            .unwrap_or(LEVELS - 1);

        let range = self.levels[level];
        let category = &AQI_CATEGORIES[level];
        let low_aqi = category.low_aqi as f32;
        let high_aqi = category.high_aqi as f32;

        let index = low_aqi
            + (high_aqi - low_aqi) / (range.high - range.low) * (concentration - range.low);

        AqiResult::from_index(index.round().max(0.0) as u32)
    }
}
