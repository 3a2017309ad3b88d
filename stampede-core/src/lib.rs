//! Distributed load-generation engine.
//!
//! A [`RunnableExperiment`] ramps up execution slots that pull iterations of a workload from a
//! shared gate and time them with a [`Worker`], either in-process ([`LocalWorker`]) or on a
//! [`Slave`] reached over a [`stampede_bus::Transport`] ([`DistributedWorker`]). Every result is
//! folded into running aggregates by a single sampler task that streams [`Sample`] snapshots to
//! subscribers.

mod error;
mod experiment;
mod gate;
mod sampler;
mod schedule;
mod signal;
mod worker;
mod workload;

pub use error::{Error, IterationError, Result};
pub use experiment::{
    Concurrency, ExperimentConfiguration, RunnableExperiment, RunningExperiment, WORKER_INDEX_KEY,
};
pub use gate::IterationGate;
pub use sampler::{Command, PercentileWindow, Sample, SampleType};
pub use schedule::ConcurrencySchedule;
pub use signal::QuitSignal;
pub use worker::{
    DEFAULT_QUEUE, DEFAULT_TIMEOUT, DistributedWorker, IterationResult, JobEnvelope, LocalWorker,
    ReplyEnvelope, Slave, SlaveConfig, SlaveHandle, StepReply, StepResult, Worker,
};
pub use workload::{StepAction, StepFuture, WorkloadRegistry, WorkloadStep};

pub use stampede_value::{Context, Value, ValueKind};
