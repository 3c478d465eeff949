// src/thermostat.rs - Wires configuration, hardware and sampler together
use std::sync::Arc;
use thiserror::Error;

use crate::config::{Config, ConfigDelta, ConfigError, SensorKind};
use crate::controller::Controller;
use crate::hardware::serial::{SerialLink, SerialRelay, SerialSensor};
use crate::hardware::sim::{SimulatedSensor, SimulatedSwitch, ThermalModel};
use crate::hardware::{HardwareError, PowerSwitch, TemperatureSensor};
use crate::sampler::{Sampler, SamplerError, SamplerHandle, SamplerReport, SamplerStats};
use crate::status::{LogReporter, StatusReporter, ThermostatStatus};

#[derive(Debug, Error)]
pub enum ThermostatError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),
    #[error("Sampler error: {0}")]
    Sampler(#[from] SamplerError),
    #[error("Thermostat is not running")]
    NotRunning,
}

/// A configured thermostat: hardware attached, sampler not yet started.
pub struct Thermostat {
    config: Config,
    sampler: Option<Sampler>,
    handle: Option<SamplerHandle>,
}

impl Thermostat {
    /// Build the hardware described by `config` with a logging reporter.
    ///
    /// Must be called from within a tokio runtime when the serial relay is used.
    pub fn new(config: Config) -> Result<Self, ThermostatError> {
        Self::with_reporter(config, Box::new(LogReporter))
    }

    pub fn with_reporter(config: Config, reporter: Box<dyn StatusReporter>) -> Result<Self, ThermostatError> {
        config.validate()?;
        let (sensor, switch) = build_hardware(&config)?;
        let controller = Controller::new(config.thermostat.clone(), switch);
        let sampler = Sampler::new(controller).with_sensor(sensor).with_reporter(reporter);
        Ok(Self { config, sampler: Some(sampler), handle: None })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn start(&mut self) -> Result<(), ThermostatError> {
        let Some(sampler) = self.sampler.take() else {
            return Ok(());
        };
        tracing::info!(
            "Starting thermostat: {} to {:.1}{} ±{:.1}",
            self.config.thermostat.mode,
            self.config.thermostat.target_temp,
            self.config.thermostat.units,
            self.config.thermostat.tolerance
        );
        self.handle = Some(sampler.start()?);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| h.is_running())
    }

    pub async fn status(&self) -> Result<(ThermostatStatus, SamplerStats), ThermostatError> {
        let handle = self.handle.as_ref().ok_or(ThermostatError::NotRunning)?;
        Ok(handle.status().await?)
    }

    pub async fn update(&mut self, delta: ConfigDelta) -> Result<(), ThermostatError> {
        let handle = self.handle.as_ref().ok_or(ThermostatError::NotRunning)?;
        handle.update(delta.clone()).await?;
        self.config.thermostat = self.config.thermostat.apply(&delta)?;
        Ok(())
    }

    /// Resolves when the sampler ends by itself (hold time elapsed).
    pub async fn wait(&mut self) -> Result<Option<SamplerReport>, ThermostatError> {
        match self.handle.as_mut() {
            Some(handle) => Ok(handle.wait().await?),
            None => Ok(None),
        }
    }

    /// Stop sampling and force the relay off. Safe to call repeatedly.
    pub async fn shutdown(&mut self) -> Result<Option<SamplerReport>, ThermostatError> {
        tracing::info!("Shutting down thermostat");
        match self.handle.as_mut() {
            Some(handle) => Ok(handle.stop().await?),
            None => Ok(None),
        }
    }
}

type Hardware = (Arc<dyn TemperatureSensor>, Option<Box<dyn PowerSwitch>>);

fn build_hardware(config: &Config) -> Result<Hardware, ThermostatError> {
    let hw = &config.hardware;
    let tc = &config.thermostat;
    match hw.sensor {
        SensorKind::Sim => {
            let switch = SimulatedSwitch::new();
            let model = ThermalModel { ambient: hw.sim_ambient, ..Default::default() };
            let sensor = SimulatedSensor::new(tc.mode, model, switch.clone());
            let switch: Option<Box<dyn PowerSwitch>> = if hw.switch_enabled {
                Some(Box::new(switch))
            } else {
                None
            };
            Ok((Arc::new(sensor), switch))
        }
        SensorKind::Serial => {
            let link = SerialLink::open(&hw.serial, hw.baud)?;
            let switch: Option<Box<dyn PowerSwitch>> = if hw.switch_enabled {
                Some(Box::new(SerialRelay::new(link.clone())))
            } else {
                None
            };
            Ok((Arc::new(SerialSensor::new(link, tc.units)), switch))
        }
    }
}
