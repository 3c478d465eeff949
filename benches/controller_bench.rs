// Benchmark for the hysteresis decision path
// Run with: cargo bench

use criterion::{Criterion, criterion_group, criterion_main};
use relaystat::hardware::sim::SimulatedSwitch;
use relaystat::{Controller, Mode, ThermostatConfig};
use std::hint::black_box;
use tokio::time::{Duration, Instant};

fn readings() -> Vec<f64> {
    // Sawtooth sweeping through the band so every row of the table fires.
    (0..10_000).map(|i| 74.0 + (i % 120) as f64 * 0.1).collect()
}

fn bench_evaluate(c: &mut Criterion) {
    let readings = readings();
    for mode in [Mode::Heating, Mode::Cooling] {
        c.bench_function(&format!("evaluate 10k readings ({})", mode), |b| {
            b.iter(|| {
                let config = ThermostatConfig { mode, buffer_ms: 100, hold_time_ms: 60_000, ..Default::default() };
                let mut controller = Controller::new(config, Some(Box::new(SimulatedSwitch::new())));
                let mut now = Instant::now();
                for &reading in &readings {
                    now += Duration::from_millis(50);
                    black_box(controller.evaluate(black_box(reading), now));
                }
            });
        });
    }
}

criterion_group!(benches, bench_evaluate);
criterion_main!(benches);
