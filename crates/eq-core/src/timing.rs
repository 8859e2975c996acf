//! Lightweight timing utilities.
//!
//! Unlike a process-wide timer table, every accumulator here is an owned
//! value so that independent analyses keep independent statistics.

use std::time::{Duration, Instant};

/// A started wall-clock measurement.
#[derive(Debug)]
pub struct Stopwatch {
    start: Instant,
}

impl Stopwatch {
    /// Start measuring now.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed time since `start`.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Accumulating timer for tracking total time across multiple calls.
#[derive(Clone, Debug, Default)]
pub struct TimeAccumulator {
    total: Duration,
    count: u64,
}

impl TimeAccumulator {
    pub const fn new() -> Self {
        Self {
            total: Duration::ZERO,
            count: 0,
        }
    }

    /// Record a finished measurement.
    pub fn record(&mut self, stopwatch: Stopwatch) {
        self.record_duration(stopwatch.elapsed());
    }

    pub fn record_duration(&mut self, duration: Duration) {
        self.total += duration;
        self.count += 1;
    }

    /// Total time spent (in seconds).
    pub fn total_seconds(&self) -> f64 {
        self.total.as_secs_f64()
    }

    /// Number of recorded measurements.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Average time per measurement (in seconds).
    pub fn average_seconds(&self) -> f64 {
        if self.count > 0 {
            self.total_seconds() / self.count as f64
        } else {
            0.0
        }
    }
}
