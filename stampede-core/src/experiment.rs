mod config;

use std::sync::Arc;

use stampede_value::Context;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;

use crate::error::{Error, IterationError, Result};
use crate::gate::IterationGate;
use crate::sampler::{Sample, Sampler};
use crate::signal::QuitSignal;
use crate::worker::IterationResult;

pub use config::{Concurrency, ExperimentConfiguration};

/// Context key holding the index of the slot running an iteration.
pub const WORKER_INDEX_KEY: &str = "workerIndex";

const RESULT_BUFFER: usize = 1024;
const WORKER_BUFFER: usize = 1024;
const SAMPLE_BUFFER: usize = 256;

/// An experiment that has not started yet.
#[derive(Debug)]
pub struct RunnableExperiment {
    config: ExperimentConfiguration,
    subscribers: Vec<mpsc::Sender<Sample>>,
}

impl RunnableExperiment {
    pub fn new(config: ExperimentConfiguration) -> Self {
        Self {
            config,
            subscribers: Vec::new(),
        }
    }

    pub fn config(&self) -> &ExperimentConfiguration {
        &self.config
    }

    /// Stream of samples for the whole run; it closes after the final sample.
    ///
    /// The sampler waits on slow subscribers, so keep reading or drop the receiver.
    pub fn subscribe(&mut self) -> mpsc::Receiver<Sample> {
        let (tx, rx) = mpsc::channel(SAMPLE_BUFFER);
        self.subscribers.push(tx);
        rx
    }

    pub fn start(self, ctx: Context) -> Result<RunningExperiment> {
        self.config.validate()?;
        self.config
            .worker
            .check_workload(&self.config.workload)
            .map_err(|err| match err {
                IterationError::UnknownStep { name } => Error::UnknownStep(name),
                other => Error::UnknownStep(other.to_string()),
            })?;

        let guid = uuid::Uuid::new_v4().to_string();
        let config = Arc::new(self.config);
        let quit = Arc::new(QuitSignal::new());

        let (results_tx, results_rx) = mpsc::channel(RESULT_BUFFER);
        let (workers_tx, workers_rx) = mpsc::channel(WORKER_BUFFER);

        let sampler = tokio::spawn(
            Sampler::new(
                config.max_iterations(),
                results_rx,
                workers_rx,
                self.subscribers,
            )
            .run(),
        );

        tracing::info!(
            %guid,
            workload = %config.workload,
            iterations = config.iterations,
            max_iterations = config.max_iterations(),
            "experiment started"
        );

        let orchestrator = tokio::spawn(execute(
            config,
            ctx,
            Stages {
                results: results_tx,
                workers: workers_tx,
                quit: quit.clone(),
            },
        ));

        Ok(RunningExperiment {
            guid,
            quit,
            orchestrator,
            sampler,
        })
    }

    pub async fn run(self, ctx: Context) -> Result<()> {
        self.start(ctx)?.wait().await
    }
}

#[derive(Debug)]
pub struct RunningExperiment {
    guid: String,
    quit: Arc<QuitSignal>,
    orchestrator: JoinHandle<()>,
    sampler: JoinHandle<()>,
}

impl RunningExperiment {
    pub fn guid(&self) -> &str {
        &self.guid
    }

    /// Stops the ramp and keeps new iterations and batches from starting. Iterations already in
    /// flight still finish and are reported.
    pub fn quit(&self) {
        self.quit.quit();
    }

    pub fn quit_signal(&self) -> Arc<QuitSignal> {
        self.quit.clone()
    }

    /// Waits until every batch finished and the sampler sent its last sample.
    pub async fn wait(self) -> Result<()> {
        self.orchestrator.await?;
        self.sampler.await?;
        tracing::info!(guid = %self.guid, "experiment finished");
        Ok(())
    }
}

/// Outgoing streams shared by every slot. Dropping the last clone closes them.
#[derive(Debug, Clone)]
struct Stages {
    results: mpsc::Sender<IterationResult>,
    workers: mpsc::Sender<i64>,
    quit: Arc<QuitSignal>,
}

async fn execute(config: Arc<ExperimentConfiguration>, ctx: Context, stages: Stages) {
    let started = Instant::now();
    let mut batches = JoinSet::new();

    for batch in 0..config.batches() {
        if batch > 0 {
            let k = u32::try_from(batch).unwrap_or(u32::MAX);
            let at = started + config.interval.saturating_mul(k);
            tokio::select! {
                _ = stages.quit.wait() => break,
                _ = tokio::time::sleep_until(at) => {}
            }
        }

        if stages.quit.is_quit() {
            break;
        }

        batches.spawn(run_batch(batch, config.clone(), ctx.clone(), stages.clone()));
    }
    drop(stages);

    while let Some(res) = batches.join_next().await {
        if let Err(err) = res {
            tracing::error!("batch task failed: {err}");
        }
    }
}

/// One batch: `iterations` iterations shared by slots the ramp adds over time.
async fn run_batch(batch: u64, config: Arc<ExperimentConfiguration>, ctx: Context, stages: Stages) {
    tracing::debug!(batch, "batch started");

    let gate = Arc::new(IterationGate::new(config.iterations));
    let mut ticks = config.schedule().ticks(stages.quit.clone());
    let mut slots = JoinSet::new();
    let mut next_slot: u64 = 0;

    loop {
        tokio::select! {
            tick = ticks.recv() => match tick {
                Some(()) if !gate.is_exhausted() => {
                    slots.spawn(run_slot(
                        next_slot,
                        config.clone(),
                        ctx.clone(),
                        gate.clone(),
                        stages.clone(),
                    ));
                    next_slot += 1;
                }
                Some(()) if slots.is_empty() => break,
                Some(()) => {}
                None => break,
            },
            Some(res) = slots.join_next(), if !slots.is_empty() => {
                if let Err(err) = res {
                    tracing::error!(batch, "slot task failed: {err}");
                }
                // Everything claimed and nothing left running: no point waiting for the ramp.
                if slots.is_empty() && gate.is_exhausted() {
                    break;
                }
            }
        }
    }
    drop(ticks);

    while let Some(res) = slots.join_next().await {
        if let Err(err) = res {
            tracing::error!(batch, "slot task failed: {err}");
        }
    }

    tracing::debug!(batch, slots = next_slot, "batch finished");
}

async fn run_slot(
    slot: u64,
    config: Arc<ExperimentConfiguration>,
    mut ctx: Context,
    gate: Arc<IterationGate>,
    stages: Stages,
) {
    ctx.put_int(WORKER_INDEX_KEY, i32::try_from(slot).unwrap_or(i32::MAX));

    while !stages.quit.is_quit() {
        let Some(iteration) = gate.next() else {
            break;
        };

        let _ = stages.workers.send(1).await;
        let result = config.worker.time(&config.workload, &mut ctx).await;
        if let Some(err) = &result.error {
            tracing::debug!(slot, iteration, "iteration failed: {err}");
        }
        if stages.results.send(result).await.is_err() {
            break;
        }
        let _ = stages.workers.send(-1).await;
    }
}
