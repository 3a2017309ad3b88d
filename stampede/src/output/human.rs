pub(crate) mod format;
mod progress;
mod summary;

use std::time::{Duration, Instant};

use stampede_core::{ConcurrencySchedule, ExperimentConfiguration, Sample};

use format::format_duration;
use progress::HumanProgress;
use summary::render;

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput {
    progress: HumanProgress,
    ramp: Option<(ConcurrencySchedule, Instant)>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: HumanProgress::new(),
            ramp: None,
        }
    }
}

/// Where the concurrency ramp should be `elapsed` into the run, if it ramps at all.
fn ramp_note(schedule: &ConcurrencySchedule, elapsed: Duration) -> Option<String> {
    if !schedule.ramps() || elapsed >= schedule.total_ramp_time() {
        return None;
    }
    Some(format!(
        " ramp={}/{}",
        schedule.target_at(elapsed),
        schedule.target()
    ))
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&mut self, guid: &str, config: &ExperimentConfiguration) {
        println!("experiment: {guid}");
        println!(
            "workload: {} iterations={} concurrency={}..{} step={} interval={} stop={}",
            config.workload,
            config.iterations,
            config.concurrency.start,
            config.concurrency.target,
            format_duration(config.concurrency_step_time),
            format_duration(config.interval),
            format_duration(config.stop),
        );
        let schedule = config.schedule();
        if schedule.ramps() {
            println!(
                "ramping to {} workers over {}",
                schedule.target(),
                format_duration(schedule.total_ramp_time())
            );
            self.ramp = Some((schedule, Instant::now()));
        }
        println!();
        self.progress.start(guid, config.max_iterations());
    }

    fn on_sample(&mut self, s: &Sample) {
        let mut message = format!(
            "workers={} errors={} avg={} p95={}",
            s.total_workers,
            s.total_errors,
            format_duration(s.average),
            format_duration(s.ninetyfifth_percentile),
        );
        if let Some(note) = self
            .ramp
            .as_ref()
            .and_then(|(schedule, started)| ramp_note(schedule, started.elapsed()))
        {
            message.push_str(&note);
        }
        self.progress.update(s.total, message);
    }

    fn print_summary(&mut self, guid: &str, last: Option<&Sample>) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(guid, last));
        Ok(())
    }
}
