// src/hardware/mod.rs - Sensor and relay interfaces
pub mod serial;
pub mod sim;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Why a sensor read produced no value.
///
/// All variants are treated the same by the sampler: the cycle is skipped and
/// the previous reading is kept.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorError {
    #[error("Sensor read timed out after {0:?}")]
    Timeout(Duration),
    #[error("Sensor I/O error: {0}")]
    Io(String),
    #[error("Unexpected sensor response: {0}")]
    Protocol(String),
    #[error("Sensor returned a non-finite reading")]
    NonFinite,
    #[error("Sensor read was abandoned before completing")]
    Abandoned,
}

impl From<std::io::Error> for SensorError {
    fn from(e: std::io::Error) -> Self {
        SensorError::Io(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("Switch command '{command}' failed: {reason}")]
    Switch { command: &'static str, reason: String },
    #[error("Serial error: {0}")]
    Serial(#[from] std::io::Error),
}

/// Source of temperature readings, in the thermostat's configured units.
///
/// Callers issue at most one outstanding read at a time.
#[async_trait]
pub trait TemperatureSensor: Send + Sync {
    async fn read_temperature(&self) -> Result<f64, SensorError>;
}

/// Binary relay driving the heater or chiller.
///
/// `set_on`/`set_off` must be safe to call when the relay is already in that
/// state.
pub trait PowerSwitch: Send {
    fn is_on(&self) -> bool;
    fn set_on(&mut self) -> Result<(), HardwareError>;
    fn set_off(&mut self) -> Result<(), HardwareError>;
}
