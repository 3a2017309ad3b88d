use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use stampede_value::Context;

use super::{IterationResult, StepResult};
use crate::error::IterationError;

/// Job pushed onto the dispatch queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub id: String,
    pub reply_to: String,
    pub command_list: String,
    pub context: Context,
    /// Wall-clock deadline in unix milliseconds; the dispatcher stops listening after it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<u64>,
}

impl JobEnvelope {
    #[must_use]
    pub fn expires_after(mut self, timeout: Duration) -> Self {
        self.expires_at_ms = Some(unix_millis(SystemTime::now()).saturating_add(millis(timeout)));
        self
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.expires_at_ms
            .is_some_and(|deadline| unix_millis(now) >= deadline)
    }
}

fn unix_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH).map_or(0, millis)
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// What a slave pushes back on `reply_to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    pub duration_ns: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<IterationError>,
    pub steps: Vec<StepReply>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReply {
    pub command: String,
    pub duration_ns: u64,
}

fn nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

impl From<&IterationResult> for ReplyEnvelope {
    fn from(result: &IterationResult) -> Self {
        Self {
            duration_ns: nanos(result.duration),
            error: result.error.clone(),
            steps: result
                .steps
                .iter()
                .map(|s| StepReply {
                    command: s.command.clone(),
                    duration_ns: nanos(s.duration),
                })
                .collect(),
        }
    }
}

impl From<ReplyEnvelope> for IterationResult {
    fn from(reply: ReplyEnvelope) -> Self {
        Self {
            duration: Duration::from_nanos(reply.duration_ns),
            error: reply.error,
            steps: reply
                .steps
                .into_iter()
                .map(|s| StepResult {
                    command: s.command,
                    duration: Duration::from_nanos(s.duration_ns),
                })
                .collect(),
        }
    }
}

pub(crate) fn reply_queue(queue: &str, job_id: &str) -> String {
    format!("{queue}:reply:{job_id}")
}
