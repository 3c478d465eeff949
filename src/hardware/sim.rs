// src/hardware/sim.rs - Simulated thermal load for running without hardware
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use super::{HardwareError, PowerSwitch, SensorError, TemperatureSensor};
use crate::config::Mode;

/// Relay that only flips a shared flag. Clones observe the same relay.
#[derive(Debug, Clone, Default)]
pub struct SimulatedSwitch {
    on: Arc<AtomicBool>,
    commands: Arc<AtomicU64>,
}

impl SimulatedSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set_on`/`set_off` calls received so far.
    pub fn command_count(&self) -> u64 {
        self.commands.load(Ordering::SeqCst)
    }
}

impl PowerSwitch for SimulatedSwitch {
    fn is_on(&self) -> bool {
        self.on.load(Ordering::SeqCst)
    }

    fn set_on(&mut self) -> Result<(), HardwareError> {
        self.commands.fetch_add(1, Ordering::SeqCst);
        self.on.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn set_off(&mut self) -> Result<(), HardwareError> {
        self.commands.fetch_add(1, Ordering::SeqCst);
        self.on.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Parameters of the simulated load. Temperatures are in the configured units.
#[derive(Debug, Clone)]
pub struct ThermalModel {
    pub ambient: f64,
    /// Degrees per second added (heating) or removed (cooling) while the relay is on.
    pub drive_rate: f64,
    /// Fraction of the difference to ambient lost per second.
    pub loss_rate: f64,
    /// Peak-to-peak amplitude of uniform measurement noise.
    pub noise: f64,
    /// Time the simulated probe takes to answer.
    pub latency: Duration,
}

impl Default for ThermalModel {
    fn default() -> Self {
        Self {
            ambient: 70.0,
            drive_rate: 0.8,
            loss_rate: 0.01,
            noise: 0.1,
            latency: Duration::from_millis(50),
        }
    }
}

#[derive(Debug)]
struct LoadState {
    temperature: f64,
    last_update: Option<Instant>,
}

/// Sensor reading a first-order thermal mass that warms or cools while the
/// paired [`SimulatedSwitch`] is on.
pub struct SimulatedSensor {
    mode: Mode,
    model: ThermalModel,
    switch: SimulatedSwitch,
    state: Mutex<LoadState>,
}

impl SimulatedSensor {
    pub fn new(mode: Mode, model: ThermalModel, switch: SimulatedSwitch) -> Self {
        let state = LoadState { temperature: model.ambient, last_update: None };
        Self { mode, model, switch, state: Mutex::new(state) }
    }

    fn step(&self, state: &mut LoadState, now: Instant) {
        let dt = state
            .last_update
            .map(|last| now.saturating_duration_since(last).as_secs_f64())
            .unwrap_or(0.0);
        state.last_update = Some(now);
        if self.switch.is_on() {
            let drive = self.model.drive_rate * dt;
            match self.mode {
                Mode::Heating => state.temperature += drive,
                Mode::Cooling => state.temperature -= drive,
            }
        }
        state.temperature -= self.model.loss_rate * (state.temperature - self.model.ambient) * dt;
    }
}

#[async_trait]
impl TemperatureSensor for SimulatedSensor {
    async fn read_temperature(&self) -> Result<f64, SensorError> {
        if !self.model.latency.is_zero() {
            tokio::time::sleep(self.model.latency).await;
        }
        let mut state = self.state.lock().await;
        self.step(&mut state, Instant::now());
        let noise = self.model.noise * (rand::random::<f64>() - 0.5);
        Ok(state.temperature + noise)
    }
}
