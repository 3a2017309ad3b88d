use std::sync::Arc;

use stampede_value::Context;
use tokio::time::{Duration, Instant};

use super::{IterationResult, StepResult};
use crate::error::IterationError;
use crate::workload::WorkloadRegistry;

/// Runs steps in the calling task.
#[derive(Debug, Clone)]
pub struct LocalWorker {
    registry: Arc<WorkloadRegistry>,
}

impl LocalWorker {
    pub fn new(registry: Arc<WorkloadRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<WorkloadRegistry> {
        &self.registry
    }

    /// Runs every step of `command_list` in order. A failing step does not stop the ones after
    /// it; the first failure is the one reported.
    pub async fn time(&self, command_list: &str, ctx: &mut Context) -> IterationResult {
        let steps = match self.registry.resolve(command_list) {
            Ok(steps) => steps,
            Err(err) => {
                tracing::debug!(command_list, "cannot resolve workload: {err}");
                return IterationResult::failed(Duration::ZERO, err);
            }
        };

        let mut result = IterationResult {
            steps: Vec::with_capacity(steps.len()),
            ..IterationResult::default()
        };

        for step in steps {
            let started = Instant::now();
            let outcome = step.run(ctx).await;
            let elapsed = started.elapsed();

            result.duration = result.duration.saturating_add(elapsed);
            result.steps.push(StepResult {
                command: step.name().to_string(),
                duration: elapsed,
            });

            if let Err(err) = outcome {
                tracing::debug!(step = step.name(), "step failed: {err:#}");
                if result.error.is_none() {
                    result.error = Some(IterationError::Step {
                        command: step.name().to_string(),
                        message: format!("{err:#}"),
                    });
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::WorkloadStep;

    fn worker() -> LocalWorker {
        let registry = WorkloadRegistry::new()
            .with_step(WorkloadStep::new("foo", "", || async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            }))
            .with_step(WorkloadStep::new("bar", "", || async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok(())
            }))
            .with_step(WorkloadStep::new("first", "", || async {
                anyhow::bail!("first failure")
            }))
            .with_step(WorkloadStep::new("second", "", || async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                anyhow::bail!("second failure")
            }));
        LocalWorker::new(Arc::new(registry))
    }

    #[tokio::test(start_paused = true)]
    async fn times_each_step_and_sums_them() {
        let result = worker().time("foo,bar", &mut Context::new()).await;

        assert!(result.error.is_none());
        assert_eq!(
            result.steps,
            vec![
                StepResult {
                    command: "foo".to_string(),
                    duration: Duration::from_secs(1),
                },
                StepResult {
                    command: "bar".to_string(),
                    duration: Duration::from_secs(2),
                },
            ]
        );
        assert_eq!(result.duration, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn first_error_wins_and_later_steps_still_run() {
        let result = worker().time("first,second,foo", &mut Context::new()).await;

        match &result.error {
            Some(IterationError::Step { command, message }) => {
                assert_eq!(command, "first");
                assert_eq!(message, "first failure");
            }
            other => panic!("expected step error, got {other:?}"),
        }
        assert_eq!(result.steps.len(), 3);
        assert_eq!(
            result.duration,
            Duration::from_secs(1) + Duration::from_millis(5)
        );
    }

    #[tokio::test]
    async fn unknown_step_runs_nothing() {
        let result = worker().time("foo,missing", &mut Context::new()).await;

        assert_eq!(
            result.error,
            Some(IterationError::UnknownStep {
                name: "missing".to_string()
            })
        );
        assert!(result.steps.is_empty());
        assert_eq!(result.duration, Duration::ZERO);
    }
}
