//! Humidex thermal comfort index.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComfortLevel {
    Comfort,
    LittleDiscomfort,
    SomeDiscomfort,
    GreatDiscomfort,
    Dangerous,
}

impl ComfortLevel {
    pub fn classify(humidex: f64) -> Self {
        if humidex <= 19.0 {
            ComfortLevel::Comfort
        } else if humidex <= 29.0 {
            ComfortLevel::LittleDiscomfort
        } else if humidex <= 39.0 {
            ComfortLevel::SomeDiscomfort
        } else if humidex <= 45.0 {
            ComfortLevel::GreatDiscomfort
        } else {
            ComfortLevel::Dangerous
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ComfortLevel::Comfort => "Comfort",
            ComfortLevel::LittleDiscomfort => "Little discomfort",
            ComfortLevel::SomeDiscomfort => "Some discomfort",
            ComfortLevel::GreatDiscomfort => "Great discomfort",
            ComfortLevel::Dangerous => "Dangerous",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        [
            ComfortLevel::Comfort,
            ComfortLevel::LittleDiscomfort,
            ComfortLevel::SomeDiscomfort,
            ComfortLevel::GreatDiscomfort,
            ComfortLevel::Dangerous,
        ]
        .into_iter()
        .find(|level| level.label() == label)
    }
}

impl fmt::Display for ComfortLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comfort {
    pub humidex: f64,
    pub level: ComfortLevel,
}

/// Humidex for air temperature `temperature` (°C) at `relative_humidity`
/// (%), rounded to one decimal place.
pub fn humidex(temperature: f64, relative_humidity: f64) -> f64 {
    let vapour_pressure =
        6.112 * 10f64.powf(7.5 * temperature / (237.7 + temperature)) * relative_humidity / 100.0;
    let value = temperature + 5.0 / 9.0 * (vapour_pressure - 10.0);
    (value * 10.0).round() / 10.0
}

pub fn assess(temperature: f64, relative_humidity: f64) -> Comfort {
    let humidex = humidex(temperature, relative_humidity);
    Comfort { humidex, level: ComfortLevel::classify(humidex) }
}
