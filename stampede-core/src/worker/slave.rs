use std::sync::Arc;
use std::time::{Duration, SystemTime};

use stampede_bus::Transport;
use tokio::task::JoinSet;

use super::DEFAULT_QUEUE;
use super::LocalWorker;
use super::protocol::{JobEnvelope, ReplyEnvelope};
use crate::error::{Error, Result};
use crate::signal::QuitSignal;

#[derive(Debug, Clone)]
pub struct SlaveConfig {
    pub queue: String,
    /// How long one pop blocks; also bounds how long `close()` waits for a consumer.
    pub poll_interval: Duration,
    pub consumers: usize,
}

impl Default for SlaveConfig {
    fn default() -> Self {
        Self {
            queue: DEFAULT_QUEUE.to_string(),
            poll_interval: Duration::from_secs(1),
            consumers: 1,
        }
    }
}

impl SlaveConfig {
    #[must_use]
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    #[must_use]
    pub fn with_consumers(mut self, consumers: usize) -> Self {
        self.consumers = consumers;
        self
    }
}

/// Serves jobs from the dispatch queue with a [`LocalWorker`].
#[derive(Debug)]
pub struct Slave {
    transport: Arc<dyn Transport>,
    worker: LocalWorker,
    config: SlaveConfig,
}

impl Slave {
    pub fn new(transport: Arc<dyn Transport>, worker: LocalWorker) -> Self {
        Self {
            transport,
            worker,
            config: SlaveConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: SlaveConfig) -> Self {
        self.config = config;
        self
    }

    pub fn start(self) -> Result<SlaveHandle> {
        if self.config.consumers == 0 {
            return Err(Error::InvalidConsumers);
        }

        let quit = Arc::new(QuitSignal::new());
        let config = Arc::new(self.config);
        let mut tasks = JoinSet::new();

        for consumer in 0..config.consumers {
            tasks.spawn(consume(
                consumer,
                self.transport.clone(),
                self.worker.clone(),
                config.clone(),
                quit.clone(),
            ));
        }

        tracing::info!(
            queue = %config.queue,
            consumers = config.consumers,
            "slave started"
        );

        Ok(SlaveHandle { quit, tasks })
    }
}

/// Running slave. Dropping it aborts the consumers; `close()` lets them finish their current job.
#[derive(Debug)]
pub struct SlaveHandle {
    quit: Arc<QuitSignal>,
    tasks: JoinSet<()>,
}

impl SlaveHandle {
    pub async fn close(mut self) -> Result<()> {
        self.quit.quit();

        while let Some(res) = self.tasks.join_next().await {
            res?;
        }

        tracing::info!("slave stopped");
        Ok(())
    }
}

async fn consume(
    consumer: usize,
    transport: Arc<dyn Transport>,
    worker: LocalWorker,
    config: Arc<SlaveConfig>,
    quit: Arc<QuitSignal>,
) {
    // A pop is never cancelled halfway: over TCP that could lose a job the broker already handed
    // out. Quit is only checked between polls.
    while !quit.is_quit() {
        match transport.pop(&config.queue, config.poll_interval).await {
            Ok(Some(payload)) => serve(consumer, transport.as_ref(), &worker, &payload).await,
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(consumer, "polling for jobs failed: {err}");
                tokio::select! {
                    _ = quit.wait() => {}
                    _ = tokio::time::sleep(config.poll_interval) => {}
                }
            }
        }
    }
}

async fn serve(consumer: usize, transport: &dyn Transport, worker: &LocalWorker, payload: &str) {
    let job: JobEnvelope = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(err) => {
            tracing::warn!(consumer, "dropping malformed job: {err}");
            return;
        }
    };

    if job.is_expired(SystemTime::now()) {
        tracing::debug!(consumer, job = %job.id, "skipping expired job");
        return;
    }

    tracing::debug!(consumer, job = %job.id, command_list = %job.command_list, "job claimed");

    let mut ctx = job.context.clone();
    let result = worker.time(&job.command_list, &mut ctx).await;

    if job.is_expired(SystemTime::now()) {
        tracing::debug!(consumer, job = %job.id, "dispatcher gave up, reply not sent");
        return;
    }

    let reply = match serde_json::to_string(&ReplyEnvelope::from(&result)) {
        Ok(v) => v,
        Err(err) => {
            tracing::warn!(consumer, job = %job.id, "cannot encode reply: {err}");
            return;
        }
    };

    if let Err(err) = transport.push(&job.reply_to, reply).await {
        tracing::warn!(consumer, job = %job.id, "sending reply failed: {err}");
    }
}
