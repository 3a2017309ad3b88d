use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::signal::QuitSignal;

/// Linear ramp from `start` to `target` concurrent slots, one extra slot every `step_time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencySchedule {
    start: u64,
    target: u64,
    step_time: Duration,
}

impl ConcurrencySchedule {
    pub fn new(start: u64, target: u64, step_time: Duration) -> Self {
        Self {
            start,
            target,
            step_time,
        }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn target(&self) -> u64 {
        self.target.max(self.start)
    }

    pub fn step_time(&self) -> Duration {
        self.step_time
    }

    pub fn ramps(&self) -> bool {
        !self.step_time.is_zero() && self.target > self.start
    }

    pub fn total_ramp_time(&self) -> Duration {
        if !self.ramps() {
            return Duration::ZERO;
        }
        let steps = u32::try_from(self.target - self.start).unwrap_or(u32::MAX);
        self.step_time.saturating_mul(steps)
    }

    /// Slots released by the ramp `elapsed` after it started.
    pub fn target_at(&self, elapsed: Duration) -> u64 {
        if !self.ramps() {
            return self.start;
        }

        let steps = elapsed.as_nanos() / self.step_time.as_nanos();
        let steps = u64::try_from(steps).unwrap_or(u64::MAX);
        self.start + steps.min(self.target - self.start)
    }

    /// Emits one tick per slot to add: `start` right away, then one every `step_time` until
    /// `target` is reached. The stream ends early once `quit` fires or the receiver is dropped.
    pub fn ticks(&self, quit: Arc<QuitSignal>) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel(64);
        let schedule = *self;

        tokio::spawn(async move {
            for _ in 0..schedule.start {
                if quit.is_quit() || tx.send(()).await.is_err() {
                    return;
                }
            }

            if !schedule.ramps() {
                return;
            }

            let mut ticker =
                tokio::time::interval_at(Instant::now() + schedule.step_time, schedule.step_time);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let mut released = schedule.start;
            while released < schedule.target {
                tokio::select! {
                    _ = quit.wait() => return,
                    _ = ticker.tick() => {}
                }

                if tx.send(()).await.is_err() {
                    return;
                }
                released += 1;
            }

            tracing::debug!(workers = released, "concurrency ramp complete");
        });

        rx
    }
}
