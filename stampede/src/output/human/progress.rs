use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Bar over the expected iteration count, drawn on stderr so stdout stays clean.
pub(crate) struct HumanProgress {
    pb: ProgressBar,
}

impl HumanProgress {
    pub(crate) fn new() -> Self {
        let pb = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr_with_hz(5));
        pb.set_style(bar_style());
        Self { pb }
    }

    pub(crate) fn start(&self, guid: &str, max_iterations: u64) {
        self.pb.set_length(max_iterations);
        self.pb.set_prefix(short_guid(guid).to_string());
        self.pb.enable_steady_tick(Duration::from_millis(200));
    }

    pub(crate) fn update(&self, done: u64, message: String) {
        self.pb.set_position(done);
        self.pb.set_message(message);
    }

    pub(crate) fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

fn short_guid(guid: &str) -> &str {
    guid.split('-').next().unwrap_or(guid)
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix} [ {bar:20.cyan/blue} ] {pos}/{len} {percent:>3}% {elapsed_precise} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█░")
}
