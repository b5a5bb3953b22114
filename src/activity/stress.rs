// src/activity/stress.rs

use std::time::{Duration, Instant};

use rand::Rng;
use tracing::debug;

/// Burn CPU for `iterations` rounds of sin/cos/tan on a random seed and
/// return the elapsed time.
///
/// Blocking; run it on a blocking thread.
pub fn stress_cpu(iterations: u32) -> Duration {
    let start = Instant::now();

    let mut value: f64 = rand::thread_rng().r#gen();
    for _ in 0..iterations {
        value = value.sin();
        value = value.cos();
        value = value.tan();
    }
    std::hint::black_box(value);

    let elapsed = start.elapsed();
    debug!(iterations, elapsed_ms = elapsed.as_millis() as u64, "stress CPU finished");
    elapsed
}
