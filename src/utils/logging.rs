use log::{log_enabled, warn, Level};
use std::time::{Duration, Instant};

/// Scoped timer emitting trace-level timings around a step phase.
pub struct ScopedTimer<'a> {
    phase: &'a str,
    start: Instant,
}

impl<'a> ScopedTimer<'a> {
    pub fn new(phase: &'a str) -> Self {
        Self {
            phase,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl<'a> Drop for ScopedTimer<'a> {
    fn drop(&mut self) {
        if log_enabled!(Level::Trace) {
            log::trace!("{}: {} µs", self.phase, self.start.elapsed().as_micros());
        }
    }
}

/// Warns when a step's wall time exceeds the simulated timestep, i.e. the
/// simulation can no longer keep up in real time.
pub fn warn_if_step_budget_exceeded(elapsed: Duration, delta_time: f32) {
    if delta_time <= 0.0 {
        return;
    }
    let budget = Duration::from_secs_f32(delta_time);
    if elapsed > budget {
        warn!(
            "step took {:.2} ms against a {:.2} ms budget",
            elapsed.as_secs_f32() * 1000.0,
            budget.as_secs_f32() * 1000.0
        );
    }
}
