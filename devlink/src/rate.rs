//! Loop rate measurement.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

/// Default number of intervals averaged.
pub const DEFAULT_AVG_COUNT: usize = 30;

/// Rolling frames-per-second counter.
///
/// Each [`tick`](FrameRate::tick) records the time since the previous tick.
/// The reported rate is the inverse of the mean of the last `avg_count`
/// intervals, which smooths out single slow or fast frames.
#[derive(Debug, Clone)]
pub struct FrameRate {
    last: Instant,
    intervals: VecDeque<Duration>,
    avg_count: usize,
}

impl FrameRate {
    /// Create a counter averaging over `avg_count` intervals, starting now.
    ///
    /// # Panics
    /// Panics if `avg_count` is zero.
    pub fn new(avg_count: usize) -> Self {
        Self::starting_at(avg_count, Instant::now())
    }

    /// Create a counter whose first interval starts at `start`.
    ///
    /// # Panics
    /// Panics if `avg_count` is zero.
    pub fn starting_at(avg_count: usize, start: Instant) -> Self {
        assert!(avg_count > 0, "avg_count must be positive");
        Self {
            last: start,
            intervals: VecDeque::with_capacity(avg_count + 1),
            avg_count,
        }
    }

    /// Record a frame now and return the averaged rate.
    pub fn tick(&mut self) -> f64 {
        self.tick_at(Instant::now())
    }

    /// Record a frame at `now` and return the averaged rate.
    pub fn tick_at(&mut self, now: Instant) -> f64 {
        let interval = now.saturating_duration_since(self.last);
        self.last = now;
        self.intervals.push_back(interval);
        if self.intervals.len() > self.avg_count {
            self.intervals.pop_front();
        }
        self.fps()
    }

    /// Averaged rate in frames per second.
    ///
    /// Zero until at least one non-zero interval has been recorded.
    pub fn fps(&self) -> f64 {
        let total: Duration = self.intervals.iter().sum();
        if total.is_zero() {
            return 0.0;
        }
        self.intervals.len() as f64 / total.as_secs_f64()
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::new(DEFAULT_AVG_COUNT)
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FPS: {}", self.fps() as u64)
    }
}
