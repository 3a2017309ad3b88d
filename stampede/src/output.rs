use crate::cli::OutputFormat;
use stampede_core::{ExperimentConfiguration, Sample};

pub(crate) mod human;
mod json;

/// Renders the sample stream of one run. Called from a single task, in stream order.
pub(crate) trait OutputFormatter: Send {
    fn print_header(&mut self, guid: &str, config: &ExperimentConfiguration);
    fn on_sample(&mut self, sample: &Sample);
    /// `last` is the closing sample, `None` if the run emitted nothing.
    fn print_summary(&mut self, guid: &str, last: Option<&Sample>) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::new()),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}
