//! Work-queue transport used to hand jobs to slaves and collect their replies.
//!
//! A queue is named by a plain string. `push` appends a payload, `pop` removes the oldest one
//! (blocking up to a timeout), so every payload is consumed by at most one caller.

mod memory;
mod tcp;

use std::time::Duration;

pub use memory::MemoryBus;
pub use tcp::{BusServer, TcpBus};

#[async_trait::async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn push(&self, queue: &str, payload: String) -> Result<(), BusError>;

    /// Removes and returns the oldest payload of `queue`, waiting up to `timeout` for one to
    /// arrive. `Ok(None)` means the wait timed out.
    async fn pop(&self, queue: &str, timeout: Duration) -> Result<Option<String>, BusError>;

    /// Drops every payload still queued under `queue`, and the next one pushed to it for a while.
    /// Meant for single-use reply queues whose reader stopped waiting.
    async fn discard(&self, queue: &str) -> Result<(), BusError>;
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed bus frame: {0}")]
    Frame(#[from] serde_json::Error),

    #[error("bus connection closed")]
    Closed,

    #[error("bus rejected request: {0}")]
    Rejected(String),

    #[error("unexpected bus response to `{0}`")]
    UnexpectedResponse(&'static str),
}
