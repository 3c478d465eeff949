//! # Thermostat Configuration
//!
//! The thermostat is configured from a single TOML file. Every key has a
//! default, so an empty file (or no `[thermostat]` table) yields a heater
//! holding 80°F with a 2° tolerance band.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [thermostat]
//! mode = "cool"
//! units = "c"
//! target_temp = 4.0
//! tolerance = 1.5
//! hold_time_ms = -1
//! frequency_ms = 1000
//! buffer_ms = 60000
//! read_timeout_ms = 5000
//!
//! [hardware]
//! sensor = "serial"
//! serial = "/dev/ttyUSB0"
//! baud = 115200
//! ```
//!
//! Command-line flags are applied on top of the file as a [`ConfigDelta`],
//! which is validated before it replaces anything.

// src/config.rs - Single configuration file
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::units::Units;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid { field, reason: reason.into() }
    }
}

/// Main configuration struct: the control parameters plus the hardware the
/// binary should attach to them.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub thermostat: ThermostatConfig,
    #[serde(default)]
    pub hardware: HardwareConfig,
}

/// Which direction of deviation turns the actuator on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum Mode {
    #[default]
    #[serde(rename = "heat")]
    Heating,
    #[serde(rename = "cool")]
    Cooling,
}

impl Mode {
    pub fn actuator_name(self) -> &'static str {
        match self {
            Mode::Heating => "heater",
            Mode::Cooling => "chiller",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Heating => f.write_str("heat"),
            Mode::Cooling => f.write_str("cool"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "heat" | "heating" => Ok(Mode::Heating),
            "cool" | "cooling" => Ok(Mode::Cooling),
            other => Err(format!("unknown mode '{}', expected heat or cool", other)),
        }
    }
}

/// Control parameters. Immutable once handed to a controller; changes go
/// through [`ThermostatConfig::apply`], which produces a new validated value.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ThermostatConfig {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub units: Units,
    #[serde(default = "default_target_temp")]
    pub target_temp: f64,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Milliseconds to hold at target before stopping; negative disables.
    #[serde(default = "default_hold_time_ms")]
    pub hold_time_ms: i64,
    #[serde(default = "default_frequency_ms")]
    pub frequency_ms: u64,
    #[serde(default = "default_buffer_ms")]
    pub buffer_ms: u64,
    /// Upper bound on a single sensor read. `None` waits indefinitely.
    #[serde(default)]
    pub read_timeout_ms: Option<u64>,
}

impl Default for ThermostatConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            units: Units::default(),
            target_temp: default_target_temp(),
            tolerance: default_tolerance(),
            hold_time_ms: default_hold_time_ms(),
            frequency_ms: default_frequency_ms(),
            buffer_ms: default_buffer_ms(),
            read_timeout_ms: None,
        }
    }
}

impl ThermostatConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.target_temp.is_finite() {
            return Err(ConfigError::invalid("target_temp", "must be a finite number"));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(ConfigError::invalid("tolerance", "must be a finite number >= 0"));
        }
        if self.frequency_ms == 0 {
            return Err(ConfigError::invalid("frequency_ms", "must be > 0"));
        }
        if self.read_timeout_ms == Some(0) {
            return Err(ConfigError::invalid("read_timeout_ms", "must be > 0 when set"));
        }
        Ok(())
    }

    /// Returns a copy with every field present in `delta` replaced.
    ///
    /// Nothing is applied unless the resulting configuration validates.
    pub fn apply(&self, delta: &ConfigDelta) -> Result<ThermostatConfig, ConfigError> {
        let mut next = self.clone();
        if let Some(mode) = delta.mode {
            next.mode = mode;
        }
        if let Some(units) = delta.units {
            next.units = units;
        }
        if let Some(target) = delta.target_temp {
            next.target_temp = target;
        }
        if let Some(tolerance) = delta.tolerance {
            next.tolerance = tolerance;
        }
        if let Some(hold) = delta.hold_time_ms {
            next.hold_time_ms = hold;
        }
        if let Some(frequency) = delta.frequency_ms {
            next.frequency_ms = frequency;
        }
        if let Some(buffer) = delta.buffer_ms {
            next.buffer_ms = buffer;
        }
        if let Some(timeout) = delta.read_timeout_ms {
            next.read_timeout_ms = Some(timeout);
        }
        next.validate()?;
        Ok(next)
    }

    pub fn frequency(&self) -> Duration {
        Duration::from_millis(self.frequency_ms)
    }

    pub fn buffer(&self) -> Duration {
        Duration::from_millis(self.buffer_ms)
    }

    /// `None` when hold tracking is disabled.
    pub fn hold_time(&self) -> Option<Duration> {
        u64::try_from(self.hold_time_ms).ok().map(Duration::from_millis)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }
}

/// Partial update of a [`ThermostatConfig`]. Absent fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ConfigDelta {
    pub mode: Option<Mode>,
    pub units: Option<Units>,
    pub target_temp: Option<f64>,
    pub tolerance: Option<f64>,
    pub hold_time_ms: Option<i64>,
    pub frequency_ms: Option<u64>,
    pub buffer_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
}

impl ConfigDelta {
    pub fn is_empty(&self) -> bool {
        *self == ConfigDelta::default()
    }
}

/// Source of temperature readings for the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    /// Simulated thermal mass driven by the relay.
    #[default]
    Sim,
    /// Line-oriented serial probe reporting Celsius.
    Serial,
}

impl FromStr for SensorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sim" => Ok(SensorKind::Sim),
            "serial" => Ok(SensorKind::Serial),
            other => Err(format!("unknown sensor '{}', expected sim or serial", other)),
        }
    }
}

/// Hardware wiring for the binary.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HardwareConfig {
    #[serde(default)]
    pub sensor: SensorKind,
    #[serde(default)]
    pub serial: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
    /// Run without a relay, as a thermometer.
    #[serde(default = "default_switch_enabled")]
    pub switch_enabled: bool,
    /// Starting and ambient temperature of the simulated load, in the configured units.
    #[serde(default = "default_sim_ambient")]
    pub sim_ambient: f64,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            sensor: SensorKind::default(),
            serial: "".to_string(),
            baud: default_baud(),
            switch_enabled: default_switch_enabled(),
            sim_ambient: default_sim_ambient(),
        }
    }
}

impl HardwareConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sensor == SensorKind::Serial && self.serial.is_empty() {
            return Err(ConfigError::invalid("serial", "a serial port is required for the serial sensor"));
        }
        if !self.sim_ambient.is_finite() {
            return Err(ConfigError::invalid("sim_ambient", "must be a finite number"));
        }
        Ok(())
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thermostat.validate()?;
        self.hardware.validate()
    }
}

// Default value functions
fn default_target_temp() -> f64 { 80.0 }
fn default_tolerance() -> f64 { 2.0 }
fn default_hold_time_ms() -> i64 { -1 }
fn default_frequency_ms() -> u64 { 1000 }
fn default_buffer_ms() -> u64 { 2000 }
fn default_baud() -> u32 { 115200 }
fn default_switch_enabled() -> bool { true }
fn default_sim_ambient() -> f64 { 70.0 }

/// Load and validate configuration from a TOML file at the given path.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        tracing::error!("Failed to read config file '{}': {}", path, e);
        ConfigError::Io(e)
    })?;
    let config: Config = toml::from_str(&contents).map_err(|e| {
        tracing::error!("Failed to parse config TOML: {}", e);
        ConfigError::Toml(e)
    })?;
    config.validate()?;
    Ok(config)
}
