// src/hardware/serial.rs - Line-oriented serial probe and relay
//
// Wire protocol, one command per line:
//   host -> device  `get_temp`       device -> host  `temp: <celsius>`
//   host -> device  `relay on`       (no response)
//   host -> device  `relay off`      (no response)
use async_trait::async_trait;
use serial2_tokio::SerialPort;
use std::io;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

use super::{HardwareError, PowerSwitch, SensorError, TemperatureSensor};
use crate::units::Units;

const MAX_LINE: usize = 256;

/// Byte transport underneath a [`SerialLink`].
#[async_trait]
pub trait LinePort: Send + Sync {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize>;
    async fn write_all(&self, buf: &[u8]) -> io::Result<()>;
    /// Drop whatever the device sent that has not been read yet.
    fn discard_input(&self) -> io::Result<()>;
}

#[async_trait]
impl LinePort for SerialPort {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        SerialPort::read(self, buf).await
    }

    async fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        SerialPort::write_all(self, buf).await
    }

    fn discard_input(&self) -> io::Result<()> {
        self.discard_input_buffer()
    }
}

/// Serial port shared by the probe and the relay.
pub struct SerialLink {
    port: Box<dyn LinePort>,
    write_lock: Mutex<()>,
}

impl SerialLink {
    pub fn open(path: &str, baud: u32) -> Result<Arc<Self>, HardwareError> {
        tracing::info!("Opening serial link on {} at {} baud", path, baud);
        let port = SerialPort::open(path, baud)?;
        Ok(Self::with_port(Box::new(port)))
    }

    pub fn with_port(port: Box<dyn LinePort>) -> Arc<Self> {
        Arc::new(Self { port, write_lock: Mutex::new(()) })
    }

    async fn send_line(&self, line: &str) -> std::io::Result<()> {
        let _guard = self.write_lock.lock().await;
        tracing::debug!("Serial TX: {}", line);
        self.port.write_all(format!("{}\n", line).as_bytes()).await
    }

    async fn read_line(&self, line: &mut Vec<u8>) -> Result<String, SensorError> {
        line.clear();
        let mut byte = [0u8; 1];
        loop {
            let n = self.port.read(&mut byte).await?;
            if n == 0 {
                return Err(SensorError::Io("serial port closed".to_string()));
            }
            match byte[0] {
                b'\n' => break,
                b'\r' => {}
                b => line.push(b),
            }
            if line.len() > MAX_LINE {
                return Err(SensorError::Protocol("response line too long".to_string()));
            }
        }
        String::from_utf8(line.clone()).map_err(|_| SensorError::Protocol("response is not UTF-8".to_string()))
    }
}

/// Probe answering `get_temp` in Celsius. Readings are converted to the
/// thermostat's units before they leave the adapter.
pub struct SerialSensor {
    link: Arc<SerialLink>,
    units: Units,
    // Serialises request/response pairs on the wire.
    line: Mutex<Vec<u8>>,
}

impl SerialSensor {
    pub fn new(link: Arc<SerialLink>, units: Units) -> Self {
        Self { link, units, line: Mutex::new(Vec::with_capacity(MAX_LINE)) }
    }
}

#[async_trait]
impl TemperatureSensor for SerialSensor {
    async fn read_temperature(&self) -> Result<f64, SensorError> {
        let mut line = self.line.lock().await;
        // A reply to an abandoned request (timed out, or cut short by an
        // overlong line) may still be buffered and would be read as ours.
        self.link.port.discard_input()?;
        self.link.send_line("get_temp").await?;
        let response = self.link.read_line(&mut line).await?;
        tracing::trace!("Serial RX: {}", response);
        let celsius = parse_temperature(&response)?;
        Ok(self.units.from_celsius(celsius))
    }
}

/// Relay on the far end of the serial link.
///
/// Commands are queued to a writer task, so switching never blocks the
/// control loop. A write failure is logged by the writer and closes the
/// queue, after which every command fails.
pub struct SerialRelay {
    tx: mpsc::UnboundedSender<&'static str>,
    on: bool,
}

impl SerialRelay {
    /// Must be called from within a tokio runtime.
    pub fn new(link: Arc<SerialLink>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<&'static str>();
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                if let Err(e) = link.send_line(command).await {
                    tracing::error!("Serial relay write error: {}", e);
                    break;
                }
            }
            tracing::info!("Serial relay writer task terminated");
        });
        Self { tx, on: false }
    }

    fn command(&mut self, command: &'static str, on: bool) -> Result<(), HardwareError> {
        self.tx.send(command).map_err(|_| HardwareError::Switch {
            command,
            reason: "serial writer is closed".to_string(),
        })?;
        self.on = on;
        Ok(())
    }
}

impl PowerSwitch for SerialRelay {
    fn is_on(&self) -> bool {
        self.on
    }

    fn set_on(&mut self) -> Result<(), HardwareError> {
        self.command("relay on", true)
    }

    fn set_off(&mut self) -> Result<(), HardwareError> {
        self.command("relay off", false)
    }
}

/// Parses a `temp: <celsius>` response line.
pub fn parse_temperature(response: &str) -> Result<f64, SensorError> {
    let value = response
        .trim()
        .strip_prefix("temp:")
        .ok_or_else(|| SensorError::Protocol(format!("unexpected temperature response: {}", response)))?;
    let celsius: f64 = value
        .trim()
        .parse()
        .map_err(|_| SensorError::Protocol(format!("invalid temperature response: {}", response)))?;
    if !celsius.is_finite() {
        return Err(SensorError::NonFinite);
    }
    Ok(celsius)
}
