//! Wall-clock bracketing of kernel execution.

use std::time::{Duration, Instant};

/// Starts checkpoints around the enqueue-to-completion window.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionTimer;

impl ExecutionTimer {
    pub fn start() -> Checkpoint {
        Checkpoint {
            started: Instant::now(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Checkpoint {
    started: Instant,
}

impl Checkpoint {
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Fractional milliseconds, the unit kernel times are reported in.
pub fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1_000.0
}
