use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// Run-level failures. Anything that goes wrong inside a single iteration is an
/// [`IterationError`] instead and never ends the run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("context error: {0}")]
    Value(#[from] stampede_value::ValueError),

    #[error("bus error: {0}")]
    Bus(#[from] stampede_bus::BusError),

    #[error("unknown workload step `{0}`")]
    UnknownStep(String),

    #[error("`iterations` must be a positive integer")]
    InvalidIterations,

    #[error("starting concurrency must be a positive integer")]
    InvalidConcurrency,

    #[error("target concurrency ({target}) must be >= starting concurrency ({start})")]
    InvalidConcurrencyTarget { start: u64, target: u64 },

    #[error("`consumers` must be a positive integer")]
    InvalidConsumers,
}

/// Why a single iteration failed.
///
/// Serializable so a slave can hand it back to the dispatcher unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IterationError {
    #[error("step `{command}` failed: {message}")]
    Step { command: String, message: String },

    #[error("unknown workload step `{name}`")]
    UnknownStep { name: String },

    #[error("no reply for `{command_list}` after {waited:?}")]
    Timeout {
        waited: Duration,
        command_list: String,
    },

    #[error("malformed reply: {message}")]
    Protocol { message: String },

    #[error("transport failure: {message}")]
    Transport { message: String },
}
