use std::time::Duration;

use crate::constants::{MAX_CATCHUP_TICKS, TICK_DURATION};

/// Converts variable frame time into a whole number of fixed ticks.
///
/// Each `accumulate` call is capped at `MAX_CATCHUP_TICKS` quanta so a long
/// stall cannot trigger an unbounded burst of catch-up ticks.
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    dt: Duration,
    accumulator: Duration,
    max_step: Duration,
}

impl Default for FixedTimestep {
    fn default() -> Self {
        Self::new(TICK_DURATION)
    }
}

impl FixedTimestep {
    pub fn new(dt: Duration) -> Self {
        Self {
            dt,
            accumulator: Duration::ZERO,
            max_step: dt * MAX_CATCHUP_TICKS,
        }
    }

    pub fn dt(&self) -> Duration {
        self.dt
    }

    pub fn accumulate(&mut self, elapsed: Duration) {
        self.accumulator += elapsed.min(self.max_step);
    }

    /// Takes one tick out of the accumulator if a full quantum is available.
    pub fn consume_tick(&mut self) -> bool {
        if self.accumulator >= self.dt {
            self.accumulator -= self.dt;
            true
        } else {
            false
        }
    }

    /// Fraction of the next tick already elapsed, in `[0, 1)`.
    pub fn alpha(&self) -> f32 {
        self.accumulator.as_secs_f32() / self.dt.as_secs_f32()
    }

    pub fn reset(&mut self) {
        self.accumulator = Duration::ZERO;
    }
}
