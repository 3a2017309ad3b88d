use anyhow::Context as _;

use crate::cli::RunsArgs;
use crate::exit_codes::ExitCode;
use crate::output::human::format::format_duration;
use crate::run_error::RunError;
use crate::store;

/// Prints one line per stored run with the totals of its last result sample.
pub fn runs(args: RunsArgs) -> Result<ExitCode, RunError> {
    let runs = store::list_runs(&args.csv_dir).map_err(RunError::InvalidInput)?;
    if runs.is_empty() {
        println!("no runs in {}", args.csv_dir.display());
        return Ok(ExitCode::Success);
    }

    for run in runs {
        let samples = store::load_samples(&run.path)
            .with_context(|| format!("failed to load {}", run.path.display()))
            .map_err(RunError::RuntimeError)?;

        match samples.last() {
            Some(last) => println!(
                "{} iterations={} errors={} average={} p95={} wall={}",
                run.guid,
                last.total,
                last.total_errors,
                format_duration(last.average),
                format_duration(last.ninetyfifth_percentile),
                format_duration(last.wall_time),
            ),
            None => println!("{} (no samples)", run.guid),
        }
    }
    Ok(ExitCode::Success)
}
