use std::sync::Arc;

use stampede_bus::Transport;
use stampede_value::Context;
use tokio::time::{Duration, Instant};

use super::IterationResult;
use super::protocol::{JobEnvelope, ReplyEnvelope, reply_queue};
use crate::error::IterationError;

pub const DEFAULT_QUEUE: &str = "stampede:jobs";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Hands iterations to whichever slave pops them off the dispatch queue, then waits for the reply.
#[derive(Debug, Clone)]
pub struct DistributedWorker {
    transport: Arc<dyn Transport>,
    queue: String,
    timeout: Duration,
}

impl DistributedWorker {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            queue: DEFAULT_QUEUE.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The remote side works on its own copy of `ctx`; changes it makes are not sent back.
    pub async fn time(&self, command_list: &str, ctx: &Context) -> IterationResult {
        let id = uuid::Uuid::new_v4().to_string();
        let reply_to = reply_queue(&self.queue, &id);
        let job = JobEnvelope {
            id,
            reply_to,
            command_list: command_list.to_string(),
            context: ctx.clone(),
            expires_at_ms: None,
        }
        .expires_after(self.timeout);

        let payload = match serde_json::to_string(&job) {
            Ok(v) => v,
            Err(err) => {
                return IterationResult::failed(
                    Duration::ZERO,
                    IterationError::Protocol {
                        message: format!("encode job: {err}"),
                    },
                );
            }
        };

        let started = Instant::now();
        if let Err(err) = self.transport.push(&self.queue, payload).await {
            tracing::warn!(job = %job.id, "dispatch failed: {err}");
            return IterationResult::failed(
                started.elapsed(),
                IterationError::Transport {
                    message: err.to_string(),
                },
            );
        }
        tracing::debug!(job = %job.id, command_list, "job dispatched");

        let reply = match self.transport.pop(&job.reply_to, self.timeout).await {
            Ok(Some(reply)) => reply,
            Ok(None) => {
                let waited = started.elapsed();
                tracing::warn!(job = %job.id, command_list, ?waited, "no reply before timeout");
                // A slave may still answer. The broker drops that reply once the queue is discarded.
                if let Err(err) = self.transport.discard(&job.reply_to).await {
                    tracing::debug!(job = %job.id, "discard reply queue failed: {err}");
                }
                return IterationResult::failed(
                    waited,
                    IterationError::Timeout {
                        waited,
                        command_list: command_list.to_string(),
                    },
                );
            }
            Err(err) => {
                tracing::warn!(job = %job.id, "waiting for reply failed: {err}");
                return IterationResult::failed(
                    started.elapsed(),
                    IterationError::Transport {
                        message: err.to_string(),
                    },
                );
            }
        };

        match serde_json::from_str::<ReplyEnvelope>(&reply) {
            Ok(reply) => reply.into(),
            Err(err) => IterationResult::failed(
                started.elapsed(),
                IterationError::Protocol {
                    message: err.to_string(),
                },
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::{LocalWorker, Slave, SlaveConfig};
    use crate::workload::{WorkloadRegistry, WorkloadStep};
    use stampede_bus::MemoryBus;

    #[tokio::test(start_paused = true)]
    async fn times_out_without_a_slave() {
        let bus = Arc::new(MemoryBus::new());
        let worker = DistributedWorker::new(bus.clone()).with_timeout(Duration::from_secs(1));

        let result = worker.time("timesout", &Context::new()).await;

        match &result.error {
            Some(IterationError::Timeout {
                waited,
                command_list,
            }) => {
                assert_eq!(*waited, Duration::from_secs(1));
                assert_eq!(command_list, "timesout");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(result.duration, Duration::from_secs(1));
        // The unclaimed job stays queued; a slave drops it as expired.
        assert_eq!(bus.len(DEFAULT_QUEUE), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_reply_is_a_protocol_error() {
        let bus = Arc::new(MemoryBus::new());
        let worker = DistributedWorker::new(bus.clone()).with_queue("jobs");

        let responder = {
            let bus = bus.clone();
            tokio::spawn(async move {
                let payload = match bus.pop_wait("jobs", Duration::from_secs(1)).await {
                    Some(v) => v,
                    None => panic!("no job dispatched"),
                };
                let job: JobEnvelope = match serde_json::from_str(&payload) {
                    Ok(v) => v,
                    Err(err) => panic!("bad job {payload}: {err}"),
                };
                bus.push_now(&job.reply_to, "not json".to_string());
            })
        };

        let result = worker.time("foo", &Context::new()).await;
        if let Err(err) = responder.await {
            panic!("responder panicked: {err}");
        }

        assert!(
            matches!(result.error, Some(IterationError::Protocol { .. })),
            "{result:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn late_replies_leave_no_queues_behind() {
        let bus = Arc::new(MemoryBus::new());
        let registry = WorkloadRegistry::new().with_step(WorkloadStep::new("slow", "", || async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(())
        }));

        let slave = match Slave::new(bus.clone(), LocalWorker::new(Arc::new(registry)))
            .with_config(
                SlaveConfig::default()
                    .with_queue("jobs")
                    .with_poll_interval(Duration::from_millis(100)),
            )
            .start()
        {
            Ok(h) => h,
            Err(err) => panic!("start slave: {err}"),
        };

        let worker = DistributedWorker::new(bus.clone())
            .with_queue("jobs")
            .with_timeout(Duration::from_secs(1));
        for _ in 0..5 {
            let result = worker.time("slow", &Context::new()).await;
            assert!(
                matches!(result.error, Some(IterationError::Timeout { .. })),
                "{result:?}"
            );
        }

        tokio::time::sleep(Duration::from_secs(30)).await;
        if let Err(err) = slave.close().await {
            panic!("close slave: {err}");
        }

        assert_eq!(bus.queue_count(), 0);
    }
}
