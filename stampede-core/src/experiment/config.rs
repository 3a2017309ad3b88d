use std::time::Duration;

use crate::error::{Error, Result};
use crate::schedule::ConcurrencySchedule;
use crate::worker::Worker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Concurrency {
    pub start: u64,
    pub target: u64,
}

impl Concurrency {
    pub fn fixed(n: u64) -> Self {
        Self {
            start: n,
            target: n,
        }
    }

    pub fn ramp(start: u64, target: u64) -> Self {
        Self { start, target }
    }
}

impl Default for Concurrency {
    fn default() -> Self {
        Self::fixed(1)
    }
}

/// Shape of one run. Frozen once the run starts.
#[derive(Debug, Clone)]
pub struct ExperimentConfiguration {
    /// Iterations per batch.
    pub iterations: u64,
    pub concurrency: Concurrency,
    pub concurrency_step_time: Duration,
    /// Start a new batch this often...
    pub interval: Duration,
    /// ...until this much time has passed since the first one.
    pub stop: Duration,
    pub worker: Worker,
    pub workload: String,
}

impl ExperimentConfiguration {
    pub fn new(worker: impl Into<Worker>, workload: impl Into<String>) -> Self {
        Self {
            iterations: 1,
            concurrency: Concurrency::default(),
            concurrency_step_time: Duration::ZERO,
            interval: Duration::ZERO,
            stop: Duration::ZERO,
            worker: worker.into(),
            workload: workload.into(),
        }
    }

    #[must_use]
    pub fn with_iterations(mut self, iterations: u64) -> Self {
        self.iterations = iterations;
        self
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: Concurrency) -> Self {
        self.concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn with_concurrency_step_time(mut self, step_time: Duration) -> Self {
        self.concurrency_step_time = step_time;
        self
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn with_stop(mut self, stop: Duration) -> Self {
        self.stop = stop;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(Error::InvalidIterations);
        }
        if self.concurrency.start == 0 {
            return Err(Error::InvalidConcurrency);
        }
        if self.concurrency.target < self.concurrency.start {
            return Err(Error::InvalidConcurrencyTarget {
                start: self.concurrency.start,
                target: self.concurrency.target,
            });
        }
        Ok(())
    }

    pub fn repeats(&self) -> bool {
        !self.interval.is_zero() && !self.stop.is_zero() && self.interval < self.stop
    }

    /// Number of batches the run starts when nobody quits it.
    pub fn batches(&self) -> u64 {
        if !self.repeats() {
            return 1;
        }
        let extra = self.stop.as_nanos() / self.interval.as_nanos();
        1 + u64::try_from(extra).unwrap_or(u64::MAX - 1)
    }

    pub fn max_iterations(&self) -> u64 {
        self.iterations.saturating_mul(self.batches())
    }

    pub fn schedule(&self) -> ConcurrencySchedule {
        ConcurrencySchedule::new(
            self.concurrency.start,
            self.concurrency.target,
            self.concurrency_step_time,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::LocalWorker;
    use crate::workload::WorkloadRegistry;
    use std::sync::Arc;

    fn config() -> ExperimentConfiguration {
        ExperimentConfiguration::new(
            LocalWorker::new(Arc::new(WorkloadRegistry::new())),
            "dummy",
        )
    }

    #[test]
    fn max_iterations_counts_every_batch() {
        let c = config().with_iterations(10);
        assert_eq!(c.max_iterations(), 10);

        let c = c
            .with_interval(Duration::from_secs(10))
            .with_stop(Duration::from_secs(35));
        assert_eq!(c.batches(), 4);
        assert_eq!(c.max_iterations(), 40);

        let c = c.with_stop(Duration::from_secs(10));
        assert_eq!(c.max_iterations(), 10, "interval must be below stop");

        let c = c.with_stop(Duration::from_secs(30)).with_interval(Duration::ZERO);
        assert_eq!(c.max_iterations(), 10);
    }

    #[test]
    fn validate_rejects_impossible_shapes() {
        assert!(config().validate().is_ok());
        assert!(matches!(
            config().with_iterations(0).validate(),
            Err(Error::InvalidIterations)
        ));
        assert!(matches!(
            config().with_concurrency(Concurrency::fixed(0)).validate(),
            Err(Error::InvalidConcurrency)
        ));
        assert!(matches!(
            config().with_concurrency(Concurrency::ramp(5, 2)).validate(),
            Err(Error::InvalidConcurrencyTarget { start: 5, target: 2 })
        ));
    }
}
