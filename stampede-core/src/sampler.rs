use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::worker::IterationResult;

const HEARTBEAT: Duration = Duration::from_secs(1);

/// What caused a [`Sample`] to be emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
pub enum SampleType {
    Result,
    Worker,
    Heartbeat,
}

/// Running totals for one step name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Command {
    pub count: u64,
    /// Completed calls per second of time spent in this step.
    pub throughput: f64,
    pub average: Duration,
    pub total_time: Duration,
    pub last_time: Duration,
    pub worst_time: Duration,
}

impl Command {
    fn record(&mut self, d: Duration) {
        self.count += 1;
        self.total_time = self.total_time.saturating_add(d);
        self.last_time = d;
        self.average = mean(self.total_time, self.count);
        self.throughput = if self.total_time.is_zero() {
            0.0
        } else {
            self.count as f64 / self.total_time.as_secs_f64()
        };
        self.worst_time = self.worst_time.max(d);
    }
}

/// Point-in-time copy of every aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub commands: BTreeMap<String, Command>,
    pub average: Duration,
    pub total_time: Duration,
    /// RFC 3339 wall-clock time the sample was taken.
    pub system_time: String,
    pub total: u64,
    pub total_errors: u64,
    pub total_workers: i64,
    pub last_result: Duration,
    pub last_error: Option<String>,
    pub worst_result: Duration,
    pub ninetyfifth_percentile: Duration,
    pub wall_time: Duration,
    pub kind: SampleType,
}

fn mean(total: Duration, n: u64) -> Duration {
    if n == 0 {
        return Duration::ZERO;
    }
    let ns = total.as_nanos() / u128::from(n);
    Duration::from_nanos(u64::try_from(ns).unwrap_or(u64::MAX))
}

fn top_share(n: u64) -> usize {
    (n as f64 * 0.05 + 0.95).floor() as usize
}

/// Approximate 95th percentile: keeps the largest `~5%` of the expected results in an ascending
/// array sized up front from the expected iteration count.
#[derive(Debug, Clone)]
pub struct PercentileWindow {
    window: Vec<Duration>,
}

impl PercentileWindow {
    pub fn new(max_iterations: u64) -> Self {
        Self {
            window: vec![Duration::ZERO; top_share(max_iterations).max(1)],
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn record(&mut self, d: Duration) {
        if d <= self.window[0] {
            return;
        }

        self.window[0] = d;
        let mut i = 0;
        while i + 1 < self.window.len() && d > self.window[i + 1] {
            self.window.swap(i, i + 1);
            i += 1;
        }
    }

    /// Value after `seen` results have been recorded.
    pub fn value(&self, seen: u64) -> Duration {
        let idx = self.window.len().saturating_sub(top_share(seen));
        self.window.get(idx).copied().unwrap_or_default()
    }
}

#[derive(Debug)]
struct Aggregate {
    commands: BTreeMap<String, Command>,
    total: u64,
    total_time: Duration,
    average: Duration,
    total_errors: u64,
    total_workers: i64,
    last_result: Duration,
    last_error: Option<String>,
    worst_result: Duration,
    percentile: PercentileWindow,
    ninetyfifth_percentile: Duration,
}

impl Aggregate {
    fn new(max_iterations: u64) -> Self {
        Self {
            commands: BTreeMap::new(),
            total: 0,
            total_time: Duration::ZERO,
            average: Duration::ZERO,
            total_errors: 0,
            total_workers: 0,
            last_result: Duration::ZERO,
            last_error: None,
            worst_result: Duration::ZERO,
            percentile: PercentileWindow::new(max_iterations),
            ninetyfifth_percentile: Duration::ZERO,
        }
    }

    fn record(&mut self, result: &IterationResult) {
        self.total += 1;
        self.total_time = self.total_time.saturating_add(result.duration);
        self.average = mean(self.total_time, self.total);
        self.last_result = result.duration;
        self.worst_result = self.worst_result.max(result.duration);

        self.percentile.record(result.duration);
        self.ninetyfifth_percentile = self.percentile.value(self.total);

        for step in &result.steps {
            self.commands
                .entry(step.command.clone())
                .or_default()
                .record(step.duration);
        }

        if let Some(err) = &result.error {
            self.last_error = Some(err.to_string());
            self.total_errors += 1;
        }
    }

    fn snapshot(&self, kind: SampleType, wall_time: Duration) -> Sample {
        Sample {
            commands: self.commands.clone(),
            average: self.average,
            total_time: self.total_time,
            system_time: humantime::format_rfc3339_nanos(SystemTime::now()).to_string(),
            total: self.total,
            total_errors: self.total_errors,
            total_workers: self.total_workers,
            last_result: self.last_result,
            last_error: self.last_error.clone(),
            worst_result: self.worst_result,
            ninetyfifth_percentile: self.ninetyfifth_percentile,
            wall_time,
            kind,
        }
    }
}

/// Owns the aggregates of one run. Fed by results, worker-count deltas and a heartbeat.
#[derive(Debug)]
pub(crate) struct Sampler {
    max_iterations: u64,
    results: mpsc::Receiver<IterationResult>,
    workers: mpsc::Receiver<i64>,
    subscribers: Vec<mpsc::Sender<Sample>>,
}

impl Sampler {
    pub(crate) fn new(
        max_iterations: u64,
        results: mpsc::Receiver<IterationResult>,
        workers: mpsc::Receiver<i64>,
        subscribers: Vec<mpsc::Sender<Sample>>,
    ) -> Self {
        Self {
            max_iterations,
            results,
            workers,
            subscribers,
        }
    }

    /// Runs until the results stream closes, then sends a closing sample and drops every
    /// subscriber.
    pub(crate) async fn run(mut self) {
        let started = Instant::now();
        let mut state = Aggregate::new(self.max_iterations);

        let mut heartbeat = tokio::time::interval_at(started + HEARTBEAT, HEARTBEAT);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut workers_open = true;

        loop {
            let kind = tokio::select! {
                result = self.results.recv() => match result {
                    Some(result) => {
                        state.record(&result);
                        SampleType::Result
                    }
                    None => break,
                },
                delta = self.workers.recv(), if workers_open => match delta {
                    Some(delta) => {
                        state.total_workers += delta;
                        SampleType::Worker
                    }
                    None => {
                        workers_open = false;
                        continue;
                    }
                },
                _ = heartbeat.tick() => SampleType::Heartbeat,
            };

            self.publish(state.snapshot(kind, started.elapsed())).await;
        }

        while let Ok(delta) = self.workers.try_recv() {
            state.total_workers += delta;
        }

        tracing::debug!(
            total = state.total,
            errors = state.total_errors,
            "sampler drained"
        );
        self.publish(state.snapshot(SampleType::Heartbeat, started.elapsed()))
            .await;
    }

    async fn publish(&mut self, sample: Sample) {
        let mut live = Vec::with_capacity(self.subscribers.len());
        for tx in self.subscribers.drain(..) {
            if tx.send(sample.clone()).await.is_ok() {
                live.push(tx);
            }
        }
        self.subscribers = live;
    }
}
