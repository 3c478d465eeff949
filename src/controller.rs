// src/controller.rs - Hysteresis relay controller
//
// Decides, from one reading at a time, whether the relay should be on. The
// decision is gated by a minimum dwell between relay edges and by an
// asymmetric tolerance band that only applies to re-engaging the relay after
// the target was met.

use tokio::time::{Duration, Instant};

use crate::config::{ConfigDelta, ConfigError, Mode, ThermostatConfig};
use crate::hardware::PowerSwitch;
use crate::status::ThermostatStatus;

/// Requested relay state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorCommand {
    On,
    Off,
}

/// Mutable control state, owned by a single [`Controller`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlState {
    /// Last reading, unset until the first successful read.
    pub current_temp: Option<f64>,
    /// Mirrors the relay as of the last command.
    pub actuator_on: bool,
    /// When the relay last changed state.
    pub last_state_change: Option<Instant>,
    /// First time the target condition held. Never cleared for the life of the controller.
    pub time_target_reached: Option<Instant>,
    /// Whether the tolerance band applies to the next ON transition.
    pub allow_tolerance: bool,
}

pub struct Controller {
    config: ThermostatConfig,
    state: ControlState,
    switch: Option<Box<dyn PowerSwitch>>,
}

impl Controller {
    /// Without a switch the controller only records readings.
    pub fn new(config: ThermostatConfig, switch: Option<Box<dyn PowerSwitch>>) -> Self {
        let actuator_on = switch.as_ref().is_some_and(|s| s.is_on());
        Self {
            config,
            state: ControlState { actuator_on, ..Default::default() },
            switch,
        }
    }

    pub fn config(&self) -> &ThermostatConfig {
        &self.config
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    pub fn has_switch(&self) -> bool {
        self.switch.is_some()
    }

    /// Feed one reading taken at `now`.
    ///
    /// `reading` must be finite and `now` must not go backwards between
    /// calls. Returns the command the hysteresis table chose, which may or
    /// may not have produced a relay edge.
    pub fn evaluate(&mut self, reading: f64, now: Instant) -> Option<ActuatorCommand> {
        self.state.current_temp = Some(reading);
        if self.switch.is_none() {
            return None;
        }

        let command = if self.within_buffer(now) {
            tracing::trace!("Reading {:.2} inside switch buffer, decision deferred", reading);
            None
        } else {
            self.decide(reading)
        };

        if self.config.hold_time().is_some()
            && self.state.time_target_reached.is_none()
            && self.target_satisfied(reading)
        {
            tracing::info!("Target {:.1}{} reached", self.config.target_temp, self.config.units);
            self.state.time_target_reached = Some(now);
        }

        if let Some(command) = command {
            self.set_state(command, now);
        }
        command
    }

    fn within_buffer(&self, now: Instant) -> bool {
        self.state
            .last_state_change
            .is_some_and(|last| now.saturating_duration_since(last) < self.config.buffer())
    }

    // Off-condition first, then on-condition. For cooling the two are
    // disjoint, so the order does not change the outcome.
    fn decide(&mut self, reading: f64) -> Option<ActuatorCommand> {
        let target = self.config.target_temp;
        let tolerance = self.config.tolerance;
        let band = self.state.allow_tolerance;

        let command = match self.config.mode {
            Mode::Heating => {
                if reading >= target {
                    Some((ActuatorCommand::Off, true))
                } else if (!band && reading < target) || (band && reading < target - tolerance) {
                    Some((ActuatorCommand::On, false))
                } else {
                    None
                }
            }
            Mode::Cooling => {
                if reading < target {
                    Some((ActuatorCommand::Off, true))
                } else if (!band && reading > target) || (band && reading > target + tolerance) {
                    Some((ActuatorCommand::On, false))
                } else {
                    None
                }
            }
        };

        command.map(|(command, allow_tolerance)| {
            self.state.allow_tolerance = allow_tolerance;
            tracing::debug!(
                "Reading {:.2} vs target {:.2} (band {}): {:?}",
                reading,
                target,
                if band { "active" } else { "inactive" },
                command
            );
            command
        })
    }

    fn target_satisfied(&self, reading: f64) -> bool {
        match self.config.mode {
            Mode::Heating => reading >= self.config.target_temp,
            Mode::Cooling => reading <= self.config.target_temp,
        }
    }

    /// Drive the relay, touching it only on a real edge.
    fn set_state(&mut self, command: ActuatorCommand, now: Instant) {
        let Some(switch) = self.switch.as_mut() else {
            return;
        };
        let is_on = switch.is_on();
        let result = match command {
            ActuatorCommand::On if !is_on => switch.set_on(),
            ActuatorCommand::Off if is_on => switch.set_off(),
            _ => {
                self.state.actuator_on = is_on;
                return;
            }
        };
        match result {
            Ok(()) => {
                self.state.actuator_on = command == ActuatorCommand::On;
                self.state.last_state_change = Some(now);
                tracing::info!(
                    "{} {}",
                    self.config.mode.actuator_name(),
                    if self.state.actuator_on { "ON" } else { "OFF" }
                );
            }
            Err(e) => {
                tracing::error!("Failed to switch {}: {}", self.config.mode.actuator_name(), e);
            }
        }
    }

    /// Command the relay off regardless of the decision state.
    pub fn force_off(&mut self, now: Instant) {
        let Some(switch) = self.switch.as_mut() else {
            return;
        };
        let was_on = switch.is_on();
        match switch.set_off() {
            Ok(()) => {
                if was_on {
                    self.state.last_state_change = Some(now);
                }
                self.state.actuator_on = false;
                tracing::info!("{} forced OFF", self.config.mode.actuator_name());
            }
            Err(e) => {
                tracing::error!("Failed to force {} off: {}", self.config.mode.actuator_name(), e);
            }
        }
    }

    /// Time left at target, `None` when hold tracking is disabled.
    pub fn time_remaining(&self, now: Instant) -> Option<Duration> {
        let hold = self.config.hold_time()?;
        Some(match self.state.time_target_reached {
            Some(reached) => hold.saturating_sub(now.saturating_duration_since(reached)),
            None => hold,
        })
    }

    pub fn hold_expired(&self, now: Instant) -> bool {
        match (self.config.hold_time(), self.state.time_target_reached) {
            (Some(hold), Some(reached)) => now.saturating_duration_since(reached) >= hold,
            _ => false,
        }
    }

    /// Replace the configuration with `delta` applied. Control state is kept.
    pub fn apply_delta(&mut self, delta: &ConfigDelta) -> Result<(), ConfigError> {
        self.config = self.config.apply(delta)?;
        tracing::info!(
            "Configuration updated: {} to {:.1}{} ±{:.1}, buffer {}ms",
            self.config.mode,
            self.config.target_temp,
            self.config.units,
            self.config.tolerance,
            self.config.buffer_ms
        );
        Ok(())
    }

    pub fn status(&self, now: Instant) -> ThermostatStatus {
        ThermostatStatus {
            current_temp: self.state.current_temp,
            actuator_on: self.state.actuator_on,
            mode: self.config.mode,
            target_temp: self.config.target_temp,
            time_remaining: self.time_remaining(now),
            units: self.config.units,
        }
    }
}
