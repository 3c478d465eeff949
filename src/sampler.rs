// src/sampler.rs - Periodic sensor sampling driving the controller
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, Interval, MissedTickBehavior};

use crate::config::{ConfigDelta, ConfigError};
use crate::controller::Controller;
use crate::hardware::{SensorError, TemperatureSensor};
use crate::status::{StatusReporter, ThermostatStatus};

type ReadResult = Result<f64, SensorError>;

#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("No temperature sensor configured")]
    NoSensor,
    #[error("Sampler is not running")]
    NotRunning,
    #[error("Configuration rejected: {0}")]
    Config(#[from] ConfigError),
    #[error("Sampler task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Counters kept by the control task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SamplerStats {
    pub ticks: u64,
    pub reads_started: u64,
    pub readings: u64,
    pub overruns: u64,
    pub read_failures: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `stop()` was called or the handle was dropped.
    Requested,
    /// The hold timer ran out.
    HoldElapsed,
}

/// Final state of a sampler run, returned once the control task has ended
/// and the relay has been forced off.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerReport {
    pub reason: StopReason,
    pub status: ThermostatStatus,
    pub stats: SamplerStats,
}

enum SamplerRequest {
    Status {
        respond_to: oneshot::Sender<(ThermostatStatus, SamplerStats)>,
    },
    Update {
        delta: ConfigDelta,
        respond_to: oneshot::Sender<Result<(), ConfigError>>,
    },
}

/// Owns a [`Controller`] and feeds it one sensor reading per tick.
///
/// While the control task runs, dropping the sampler by any path other than
/// a normal stop (a panic in a reporter, an aborted task) still forces the
/// relay off.
pub struct Sampler {
    controller: Controller,
    sensor: Option<Arc<dyn TemperatureSensor>>,
    reporter: Option<Box<dyn StatusReporter>>,
    running: Arc<AtomicBool>,
}

impl Sampler {
    pub fn new(controller: Controller) -> Self {
        Self {
            controller,
            sensor: None,
            reporter: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_sensor(mut self, sensor: Arc<dyn TemperatureSensor>) -> Self {
        self.sensor = Some(sensor);
        self
    }

    pub fn with_reporter(mut self, reporter: Box<dyn StatusReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Spawn the control task on the current tokio runtime.
    ///
    /// Fails without a sensor or with an invalid configuration. Without a
    /// switch the sampler still runs and reports readings.
    pub fn start(self) -> Result<SamplerHandle, SamplerError> {
        let Some(sensor) = self.sensor.clone() else {
            tracing::error!("No sensor provided, refusing to start");
            return Err(SamplerError::NoSensor);
        };
        self.controller.config().validate()?;
        if !self.controller.has_switch() {
            tracing::warn!("No switch provided, running as a thermometer only");
        }

        let (request_tx, request_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let running = self.running.clone();
        running.store(true, Ordering::SeqCst);

        tracing::info!(
            "Sampling every {}ms, switch buffer {}ms",
            self.controller.config().frequency_ms,
            self.controller.config().buffer_ms
        );
        let task = tokio::spawn(self.run(sensor, request_rx, shutdown_rx));

        Ok(SamplerHandle {
            requests: request_tx,
            shutdown_tx,
            running,
            task: Some(task),
        })
    }

    fn ticker(period: Duration) -> Interval {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    }

    async fn run(
        mut self,
        sensor: Arc<dyn TemperatureSensor>,
        mut requests: mpsc::Receiver<SamplerRequest>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> SamplerReport {
        let mut ticker = Self::ticker(self.controller.config().frequency());
        let mut pending: Option<oneshot::Receiver<ReadResult>> = None;
        let mut stats = SamplerStats::default();

        let reason = loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    break StopReason::Requested;
                }
                result = completion(&mut pending) => {
                    pending = None;
                    self.complete_read(result, &mut stats);
                }
                _ = ticker.tick() => {
                    stats.ticks += 1;
                    let now = Instant::now();
                    if self.controller.hold_expired(now) {
                        tracing::info!("Hold time elapsed, stopping");
                        break StopReason::HoldElapsed;
                    }
                    if pending.is_some() {
                        stats.overruns += 1;
                        tracing::warn!(
                            "Still waiting for the previous reading; the read frequency may be too high or the sensor may be disconnected"
                        );
                        continue;
                    }
                    stats.reads_started += 1;
                    pending = Some(dispatch_read(sensor.clone(), self.controller.config().read_timeout()));
                }
                request = requests.recv() => {
                    let Some(request) = request else {
                        break StopReason::Requested;
                    };
                    match request {
                        SamplerRequest::Status { respond_to } => {
                            let _ = respond_to.send((self.controller.status(Instant::now()), stats.clone()));
                        }
                        SamplerRequest::Update { delta, respond_to } => {
                            let frequency = self.controller.config().frequency();
                            let result = self.controller.apply_delta(&delta);
                            if result.is_ok() && self.controller.config().frequency() != frequency {
                                ticker = Self::ticker(self.controller.config().frequency());
                            }
                            let _ = respond_to.send(result);
                        }
                    }
                }
            }
        };

        // A read still in flight is abandoned; its result goes nowhere.
        drop(pending);
        let now = Instant::now();
        self.controller.force_off(now);
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("Sampler stopped ({:?}) after {} readings", reason, stats.readings);

        SamplerReport {
            reason,
            status: self.controller.status(now),
            stats,
        }
    }

    fn complete_read(&mut self, result: ReadResult, stats: &mut SamplerStats) {
        let reading = result.and_then(|t| if t.is_finite() { Ok(t) } else { Err(SensorError::NonFinite) });
        match reading {
            Ok(reading) => {
                stats.readings += 1;
                let now = Instant::now();
                self.controller.evaluate(reading, now);
                if let Some(reporter) = self.reporter.as_mut() {
                    reporter.report(&self.controller.status(now));
                }
            }
            Err(e) => {
                stats.read_failures += 1;
                tracing::warn!("Skipping cycle, sensor read failed: {}", e);
            }
        }
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        if self.running.swap(false, Ordering::SeqCst) {
            tracing::error!("Control task ended abnormally, forcing relay off");
            self.controller.force_off(Instant::now());
        }
    }
}

fn dispatch_read(sensor: Arc<dyn TemperatureSensor>, limit: Option<Duration>) -> oneshot::Receiver<ReadResult> {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let result = match limit {
            Some(limit) => tokio::time::timeout(limit, sensor.read_temperature())
                .await
                .unwrap_or(Err(SensorError::Timeout(limit))),
            None => sensor.read_temperature().await,
        };
        let _ = tx.send(result);
    });
    rx
}

async fn completion(pending: &mut Option<oneshot::Receiver<ReadResult>>) -> ReadResult {
    match pending.as_mut() {
        Some(rx) => rx.await.unwrap_or(Err(SensorError::Abandoned)),
        None => std::future::pending().await,
    }
}

/// Handle to a running sampler. Dropping it stops the sampler.
pub struct SamplerHandle {
    requests: mpsc::Sender<SamplerRequest>,
    shutdown_tx: broadcast::Sender<()>,
    running: Arc<AtomicBool>,
    task: Option<JoinHandle<SamplerReport>>,
}

impl SamplerHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop ticking and force the relay off.
    ///
    /// Returns `None` if the sampler was already stopped through this handle.
    pub async fn stop(&mut self) -> Result<Option<SamplerReport>, SamplerError> {
        let Some(task) = self.task.take() else {
            return Ok(None);
        };
        let _ = self.shutdown_tx.send(());
        let report = task.await?;
        Ok(Some(report))
    }

    /// Wait for the sampler to end on its own, i.e. when the hold time elapses.
    pub async fn wait(&mut self) -> Result<Option<SamplerReport>, SamplerError> {
        let Some(task) = self.task.as_mut() else {
            return Ok(None);
        };
        let result = task.await;
        self.task = None;
        Ok(Some(result?))
    }

    pub async fn status(&self) -> Result<(ThermostatStatus, SamplerStats), SamplerError> {
        let (respond_to, rx) = oneshot::channel();
        self.requests
            .send(SamplerRequest::Status { respond_to })
            .await
            .map_err(|_| SamplerError::NotRunning)?;
        rx.await.map_err(|_| SamplerError::NotRunning)
    }

    /// Apply a partial configuration change to the running controller.
    pub async fn update(&self, delta: ConfigDelta) -> Result<(), SamplerError> {
        let (respond_to, rx) = oneshot::channel();
        self.requests
            .send(SamplerRequest::Update { delta, respond_to })
            .await
            .map_err(|_| SamplerError::NotRunning)?;
        rx.await.map_err(|_| SamplerError::NotRunning)??;
        Ok(())
    }
}
