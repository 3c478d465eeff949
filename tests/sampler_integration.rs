// Integration tests for the sampling loop, run on tokio's paused clock so
// tick and sensor timings are exact.

use async_trait::async_trait;
use relaystat::hardware::sim::SimulatedSwitch;
use relaystat::status::ChannelReporter;
use relaystat::{
    ConfigDelta, Controller, PowerSwitch, Sampler, SensorError, StopReason, TemperatureSensor, ThermostatConfig,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant, sleep};
use tokio_test::{assert_err, assert_ok};

/// Sensor answering from a script, then repeating `fallback`.
struct ScriptedSensor {
    script: Mutex<VecDeque<Result<f64, SensorError>>>,
    fallback: f64,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

impl ScriptedSensor {
    fn new(fallback: f64, latency: Duration) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            latency,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    fn with_script(self, script: Vec<Result<f64, SensorError>>) -> Self {
        Self { script: Mutex::new(script.into()), ..self }
    }
}

#[async_trait]
impl TemperatureSensor for ScriptedSensor {
    async fn read_temperature(&self) -> Result<f64, SensorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        sleep(self.latency).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.script.lock().await.pop_front().unwrap_or(Ok(self.fallback))
    }
}

fn config() -> ThermostatConfig {
    ThermostatConfig {
        target_temp: 80.0,
        tolerance: 2.0,
        frequency_ms: 1000,
        buffer_ms: 2000,
        hold_time_ms: -1,
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_read_causes_overrun_not_second_evaluate() {
    let sensor = Arc::new(ScriptedSensor::new(70.0, Duration::from_millis(1500)));
    let switch = SimulatedSwitch::new();
    let (reporter, mut reports) = ChannelReporter::new();
    let mut handle = Sampler::new(Controller::new(config(), Some(Box::new(switch.clone()))))
        .with_sensor(sensor.clone())
        .with_reporter(Box::new(reporter))
        .start()
        .unwrap();

    // Read dispatched at 1000, tick at 2000 finds it in flight, completes at 2500.
    sleep(Duration::from_millis(2600)).await;
    let (status, stats) = handle.status().await.unwrap();
    assert_eq!(stats.ticks, 2);
    assert_eq!(stats.reads_started, 1);
    assert_eq!(stats.overruns, 1);
    assert_eq!(stats.readings, 1);
    assert_eq!(status.current_temp, Some(70.0));
    assert!(reports.try_recv().is_ok());
    assert!(reports.try_recv().is_err());

    sleep(Duration::from_millis(10_000)).await;
    assert_eq!(sensor.max_in_flight.load(Ordering::SeqCst), 1);
    let (_, stats) = handle.status().await.unwrap();
    assert_eq!(stats.reads_started + stats.overruns, stats.ticks);
    assert_eq!(stats.readings as usize, sensor.calls.load(Ordering::SeqCst));

    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_sensor_failure_skips_cycle_and_keeps_last_reading() {
    let sensor = ScriptedSensor::new(90.0, Duration::ZERO)
        .with_script(vec![Ok(70.0), Err(SensorError::Io("probe unplugged".to_string()))]);
    let (reporter, mut reports) = ChannelReporter::new();
    let mut handle = Sampler::new(Controller::new(config(), Some(Box::new(SimulatedSwitch::new()))))
        .with_sensor(Arc::new(sensor))
        .with_reporter(Box::new(reporter))
        .start()
        .unwrap();

    sleep(Duration::from_millis(2100)).await;
    let (status, stats) = handle.status().await.unwrap();
    assert_eq!(status.current_temp, Some(70.0));
    assert_eq!(stats.read_failures, 1);
    assert_eq!(stats.readings, 1);

    sleep(Duration::from_millis(1000)).await;
    let (status, _) = handle.status().await.unwrap();
    assert_eq!(status.current_temp, Some(90.0));

    let first = reports.recv().await.unwrap();
    let second = reports.recv().await.unwrap();
    assert_eq!(first.current_temp, Some(70.0));
    assert_eq!(second.current_temp, Some(90.0));
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_read_timeout_frees_the_slot() {
    let sensor = Arc::new(ScriptedSensor::new(70.0, Duration::from_secs(60)));
    let config = ThermostatConfig { read_timeout_ms: Some(300), ..config() };
    let mut handle = Sampler::new(Controller::new(config, Some(Box::new(SimulatedSwitch::new()))))
        .with_sensor(sensor)
        .start()
        .unwrap();

    sleep(Duration::from_millis(3500)).await;
    let (status, stats) = handle.status().await.unwrap();
    assert_eq!(stats.reads_started, 3);
    assert_eq!(stats.read_failures, 3);
    assert_eq!(stats.overruns, 0);
    assert_eq!(status.current_temp, None);
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_hold_elapsed_stops_and_forces_off() {
    let sensor = Arc::new(ScriptedSensor::new(80.0, Duration::ZERO));
    let mut switch = SimulatedSwitch::new();
    switch.set_on().unwrap();
    let config = ThermostatConfig { hold_time_ms: 5000, ..config() };
    let start = Instant::now();
    let mut handle = Sampler::new(Controller::new(config, Some(Box::new(switch.clone()))))
        .with_sensor(sensor)
        .start()
        .unwrap();

    let report = handle.wait().await.unwrap().unwrap();
    assert_eq!(report.reason, StopReason::HoldElapsed);
    assert!(start.elapsed() >= Duration::from_millis(6000));
    assert_eq!(report.stats.ticks, 6);
    assert_eq!(report.status.time_remaining, Some(Duration::ZERO));
    assert!(!switch.is_on());
    assert!(!handle.is_running());
    assert!(handle.stop().await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_result_arriving_after_stop_is_ignored() {
    let sensor = Arc::new(ScriptedSensor::new(60.0, Duration::from_millis(5000)));
    let switch = SimulatedSwitch::new();
    let (reporter, mut reports) = ChannelReporter::new();
    let mut handle = Sampler::new(Controller::new(config(), Some(Box::new(switch.clone()))))
        .with_sensor(sensor.clone())
        .with_reporter(Box::new(reporter))
        .start()
        .unwrap();

    sleep(Duration::from_millis(1500)).await;
    let report = handle.stop().await.unwrap().unwrap();
    assert_eq!(report.stats.reads_started, 1);
    assert_eq!(report.stats.readings, 0);

    sleep(Duration::from_millis(10_000)).await;
    assert_eq!(sensor.calls.load(Ordering::SeqCst), 1);
    assert!(reports.recv().await.is_none());
    assert!(!switch.is_on());
    // Forced off even though the relay never came on.
    assert_eq!(switch.command_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_forces_relay_off() {
    let sensor = Arc::new(ScriptedSensor::new(70.0, Duration::ZERO));
    let switch = SimulatedSwitch::new();
    let mut handle = Sampler::new(Controller::new(config(), Some(Box::new(switch.clone()))))
        .with_sensor(sensor)
        .start()
        .unwrap();

    sleep(Duration::from_millis(1100)).await;
    assert!(switch.is_on());
    let report = handle.stop().await.unwrap().unwrap();
    assert_eq!(report.reason, StopReason::Requested);
    assert!(!switch.is_on());
    assert!(!report.status.actuator_on);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handle_stops_sampler() {
    let sensor = Arc::new(ScriptedSensor::new(70.0, Duration::ZERO));
    let switch = SimulatedSwitch::new();
    let handle = Sampler::new(Controller::new(config(), Some(Box::new(switch.clone()))))
        .with_sensor(sensor.clone())
        .start()
        .unwrap();

    sleep(Duration::from_millis(1100)).await;
    assert!(switch.is_on());
    drop(handle);
    sleep(Duration::from_millis(5000)).await;
    assert!(!switch.is_on());
    assert_eq!(sensor.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_thermometer_mode_reports_without_switching() {
    let sensor = Arc::new(ScriptedSensor::new(70.0, Duration::ZERO));
    let (reporter, mut reports) = ChannelReporter::new();
    let mut handle = Sampler::new(Controller::new(config(), None))
        .with_sensor(sensor)
        .with_reporter(Box::new(reporter))
        .start()
        .unwrap();

    sleep(Duration::from_millis(3100)).await;
    for _ in 0..3 {
        let status = reports.recv().await.unwrap();
        assert_eq!(status.current_temp, Some(70.0));
        assert!(!status.actuator_on);
    }
    assert_ok!(handle.stop().await);
}

#[tokio::test(start_paused = true)]
async fn test_frequency_update_reschedules_ticks() {
    let sensor = Arc::new(ScriptedSensor::new(70.0, Duration::ZERO));
    let mut handle = Sampler::new(Controller::new(config(), Some(Box::new(SimulatedSwitch::new()))))
        .with_sensor(sensor.clone())
        .start()
        .unwrap();

    assert_err!(handle.update(ConfigDelta { frequency_ms: Some(0), ..Default::default() }).await);
    assert_ok!(handle.update(ConfigDelta { frequency_ms: Some(250), ..Default::default() }).await);
    sleep(Duration::from_millis(1100)).await;
    let (_, stats) = handle.status().await.unwrap();
    assert_eq!(stats.ticks, 4);
    assert_eq!(sensor.calls.load(Ordering::SeqCst), 4);
    handle.stop().await.unwrap();
}
