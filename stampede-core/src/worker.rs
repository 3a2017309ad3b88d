mod distributed;
mod local;
mod protocol;
mod slave;

use std::time::Duration;

use stampede_value::Context;

use crate::error::IterationError;

pub use distributed::{DEFAULT_QUEUE, DEFAULT_TIMEOUT, DistributedWorker};
pub use local::LocalWorker;
pub use protocol::{JobEnvelope, ReplyEnvelope, StepReply};
pub use slave::{Slave, SlaveConfig, SlaveHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub command: String,
    pub duration: Duration,
}

/// Outcome of one iteration: the steps that ran, in order, and the first error any of them hit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterationResult {
    pub duration: Duration,
    pub error: Option<IterationError>,
    pub steps: Vec<StepResult>,
}

impl IterationResult {
    pub fn failed(duration: Duration, error: IterationError) -> Self {
        Self {
            duration,
            error: Some(error),
            steps: Vec::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Runs a workload either in-process or on a slave behind the bus.
#[derive(Debug, Clone)]
pub enum Worker {
    Local(LocalWorker),
    Distributed(DistributedWorker),
}

impl Worker {
    pub async fn time(&self, command_list: &str, ctx: &mut Context) -> IterationResult {
        match self {
            Self::Local(w) => w.time(command_list, ctx).await,
            Self::Distributed(w) => w.time(command_list, ctx).await,
        }
    }

    /// Checks `command_list` against the steps this worker can see. Remote registries are not
    /// visible from here, so a distributed worker accepts any list.
    pub fn check_workload(&self, command_list: &str) -> Result<(), IterationError> {
        match self {
            Self::Local(w) => w.registry().resolve(command_list).map(|_| ()),
            Self::Distributed(_) => Ok(()),
        }
    }
}

impl From<LocalWorker> for Worker {
    fn from(w: LocalWorker) -> Self {
        Self::Local(w)
    }
}

impl From<DistributedWorker> for Worker {
    fn from(w: DistributedWorker) -> Self {
        Self::Distributed(w)
    }
}
