// src/status.rs - Status snapshots and their consumers
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::Mode;
use crate::units::Units;

/// What the thermostat looks like after a completed read.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermostatStatus {
    pub current_temp: Option<f64>,
    pub actuator_on: bool,
    pub mode: Mode,
    pub target_temp: f64,
    /// `None` when hold tracking is disabled.
    pub time_remaining: Option<Duration>,
    pub units: Units,
}

impl ThermostatStatus {
    pub fn units_label(&self) -> &'static str {
        self.units.label()
    }
}

/// Consumer of status snapshots. Receives one per completed read and never
/// feeds back into control.
pub trait StatusReporter: Send {
    fn report(&mut self, status: &ThermostatStatus);
}

/// Formats a duration as `mm:ss`, rounding partial seconds up so the display
/// only reads `00:00` once the hold has actually elapsed.
pub fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.as_millis().div_ceil(1000);
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Writes each snapshot as a log line.
#[derive(Debug, Default)]
pub struct LogReporter;

impl StatusReporter for LogReporter {
    fn report(&mut self, status: &ThermostatStatus) {
        let temp = status
            .current_temp
            .map(|t| format!("{:.1}{}", t, status.units_label()))
            .unwrap_or_else(|| "--".to_string());
        let remaining = status
            .time_remaining
            .map(format_remaining)
            .unwrap_or_else(|| "--:--".to_string());
        tracing::info!(
            "Temp {} (target {:.1}{}) | {} {} | remaining {}",
            temp,
            status.target_temp,
            status.units_label(),
            status.mode.actuator_name(),
            if status.actuator_on { "ON" } else { "OFF" },
            remaining
        );
    }
}

/// Forwards snapshots to a channel. Snapshots are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<ThermostatStatus>,
}

impl ChannelReporter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ThermostatStatus>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StatusReporter for ChannelReporter {
    fn report(&mut self, status: &ThermostatStatus) {
        let _ = self.tx.send(status.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> ThermostatStatus {
        ThermostatStatus {
            current_temp: Some(78.25),
            actuator_on: true,
            mode: Mode::Heating,
            target_temp: 80.0,
            time_remaining: Some(Duration::from_millis(65_500)),
            units: Units::Fahrenheit,
        }
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(Duration::ZERO), "00:00");
        assert_eq!(format_remaining(Duration::from_millis(1)), "00:01");
        assert_eq!(format_remaining(Duration::from_millis(65_500)), "01:06");
        assert_eq!(format_remaining(Duration::from_secs(600)), "10:00");
    }

    #[test]
    fn test_channel_reporter_forwards() {
        let (mut reporter, mut rx) = ChannelReporter::new();
        reporter.report(&snapshot());
        assert_eq!(rx.try_recv().unwrap(), snapshot());
        drop(rx);
        // Receiver gone: reporting must not panic.
        reporter.report(&snapshot());
    }

    #[test]
    fn test_log_reporter_handles_unset_values() {
        let mut reporter = LogReporter;
        let status = ThermostatStatus { current_temp: None, time_remaining: None, ..snapshot() };
        reporter.report(&status);
        assert_eq!(status.units_label(), "°F");
    }
}
