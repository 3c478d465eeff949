// src/main.rs - Command-line entry point
use clap::Parser;
use std::path::Path;

use relaystat::config::{self, Config, ConfigDelta, Mode, SensorKind};
use relaystat::{Thermostat, ThermostatError, Units};

/// Hold a temperature by switching a heater or chiller relay.
#[derive(Debug, Parser)]
#[command(name = "relaystat", version, about)]
struct Args {
    /// TOML configuration file. Missing file means built-in defaults.
    #[arg(short, long, default_value = "thermostat.toml")]
    config: String,

    /// heat or cool
    #[arg(short, long)]
    mode: Option<Mode>,

    /// f, c or k
    #[arg(short, long)]
    units: Option<Units>,

    /// Target temperature
    #[arg(short, long)]
    target: Option<f64>,

    /// Width of the band that must be crossed before the relay re-engages
    #[arg(long)]
    tolerance: Option<f64>,

    /// Milliseconds to hold at target before stopping, -1 to run forever
    #[arg(long, allow_negative_numbers = true)]
    hold_time: Option<i64>,

    /// Milliseconds between sensor reads
    #[arg(short, long)]
    frequency: Option<u64>,

    /// Minimum milliseconds between relay changes
    #[arg(short, long)]
    buffer: Option<u64>,

    /// Give up on a sensor read after this many milliseconds
    #[arg(long)]
    read_timeout: Option<u64>,

    /// sim or serial
    #[arg(long)]
    sensor: Option<SensorKind>,

    /// Serial port of the probe and relay
    #[arg(long)]
    serial: Option<String>,

    #[arg(long)]
    baud: Option<u32>,

    /// Read temperatures without driving a relay
    #[arg(long)]
    no_switch: bool,

    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

impl Args {
    fn delta(&self) -> ConfigDelta {
        ConfigDelta {
            mode: self.mode,
            units: self.units,
            target_temp: self.target,
            tolerance: self.tolerance,
            hold_time_ms: self.hold_time,
            frequency_ms: self.frequency,
            buffer_ms: self.buffer,
            read_timeout_ms: self.read_timeout,
        }
    }

    fn load(&self) -> Result<Config, ThermostatError> {
        let mut config = if Path::new(&self.config).exists() {
            tracing::info!("Loading configuration from: {}", self.config);
            config::load_config(&self.config)?
        } else {
            tracing::info!("No configuration at '{}', using defaults", self.config);
            Config::default()
        };

        config.thermostat = config.thermostat.apply(&self.delta())?;
        if let Some(sensor) = self.sensor {
            config.hardware.sensor = sensor;
        }
        if let Some(serial) = &self.serial {
            config.hardware.serial = serial.clone();
        }
        if let Some(baud) = self.baud {
            config.hardware.baud = baud;
        }
        if self.no_switch {
            config.hardware.switch_enabled = false;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    tracing::info!("Starting relaystat {}", env!("CARGO_PKG_VERSION"));

    let config = args.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;

    let mut thermostat = Thermostat::new(config)?;
    thermostat.start()?;

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
            } else {
                tracing::info!("Interrupted");
            }
        }
        report = thermostat.wait() => {
            match report {
                Ok(Some(report)) => tracing::info!("Finished: {:?}, {} readings", report.reason, report.stats.readings),
                Ok(None) => {}
                Err(e) => tracing::error!("Thermostat failed: {}", e),
            }
        }
    }

    // Relay is forced off here on every exit path.
    thermostat.shutdown().await?;
    Ok(())
}
