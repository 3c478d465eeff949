// src/units.rs - Temperature units and conversion from Celsius
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unit the thermostat reports and regulates in.
///
/// Hardware that measures in Celsius is converted once at the sensor
/// boundary, so the controller only ever compares values in this unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum Units {
    #[default]
    #[serde(rename = "f")]
    Fahrenheit,
    #[serde(rename = "c")]
    Celsius,
    #[serde(rename = "k")]
    Kelvin,
}

impl Units {
    pub fn from_celsius(self, celsius: f64) -> f64 {
        match self {
            Units::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
            Units::Celsius => celsius,
            Units::Kelvin => celsius + 273.15,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Units::Fahrenheit => "°F",
            Units::Celsius => "°C",
            Units::Kelvin => "K",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Units {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "f" | "fahrenheit" => Ok(Units::Fahrenheit),
            "c" | "celsius" => Ok(Units::Celsius),
            "k" | "kelvin" => Ok(Units::Kelvin),
            other => Err(format!("unknown units '{}', expected one of f, c, k", other)),
        }
    }
}
