use std::time::Duration;

use stampede_core::{WorkloadRegistry, WorkloadStep};

/// Context key read by the `sleep` step.
pub(crate) const SLEEP_MILLIS_KEY: &str = "sleepMillis";

const DUMMY_TIME: Duration = Duration::from_millis(1);
const DEFAULT_SLEEP: Duration = Duration::from_millis(100);

/// Steps shipped with the binary. `run` and `slave` share the same set, so a slave can serve
/// anything `run` accepts.
pub(crate) fn builtin() -> WorkloadRegistry {
    WorkloadRegistry::new()
        .with_step(WorkloadStep::new(
            "dummy",
            "An empty workload that can be used when no target environment is available",
            || async {
                tokio::time::sleep(DUMMY_TIME).await;
                Ok(())
            },
        ))
        .with_step(WorkloadStep::new(
            "dummyWithErrors",
            "An empty workload that always fails",
            || async {
                tokio::time::sleep(DUMMY_TIME).await;
                anyhow::bail!("dummy error")
            },
        ))
        .with_step(WorkloadStep::with_context(
            "sleep",
            "Sleeps for `sleepMillis` milliseconds from the context (default 100)",
            |ctx| {
                let millis = ctx.get_int64(SLEEP_MILLIS_KEY);
                let wait = u64::try_from(millis)
                    .ok()
                    .filter(|ms| *ms > 0)
                    .map_or(DEFAULT_SLEEP, Duration::from_millis);
                Box::pin(async move {
                    tokio::time::sleep(wait).await;
                    Ok(())
                })
            },
        ))
        .with_step(WorkloadStep::with_context_sync(
            "recordContext",
            "Logs the context the iteration runs with",
            |ctx| {
                let entries: Vec<String> = ctx
                    .iter()
                    .map(|(key, value)| format!("{key}={}", value.to_literal()))
                    .collect();
                tracing::info!(context = %entries.join(" "), "recordContext");
                Ok(())
            },
        ))
}
