//! Relay thermostat: hysteresis control of a heater or chiller relay from
//! periodic temperature readings.
//!
//! [`controller::Controller`] makes the on/off decision for one reading at a
//! time. [`sampler::Sampler`] runs it on a fixed period, keeping at most one
//! sensor read in flight, and forces the relay off when it stops.

pub mod config;
pub mod controller;
pub mod hardware;
pub mod sampler;
pub mod status;
pub mod thermostat;
pub mod units;

pub use config::{Config, ConfigDelta, Mode, ThermostatConfig};
pub use controller::{ActuatorCommand, ControlState, Controller};
pub use hardware::{HardwareError, PowerSwitch, SensorError, TemperatureSensor};
pub use sampler::{Sampler, SamplerError, SamplerHandle, SamplerReport, SamplerStats, StopReason};
pub use status::{StatusReporter, ThermostatStatus};
pub use thermostat::{Thermostat, ThermostatError};
pub use units::Units;
