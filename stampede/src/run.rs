use anyhow::Context as _;
use std::sync::Arc;

use stampede_bus::TcpBus;
use stampede_core::{
    Context, DistributedWorker, ExperimentConfiguration, LocalWorker, RunnableExperiment, Sample,
    Worker, WorkloadRegistry,
};

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::output;
use crate::run_error::RunError;
use crate::shutdown;
use crate::store::CsvStore;
use crate::workloads;

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let registry = Arc::new(workloads::builtin());

    // Slaves serve the same built-in steps, so the list can be checked here in both modes.
    registry
        .resolve(&args.workload)
        .map_err(|err| RunError::InvalidInput(anyhow::Error::new(err)))?;

    let worker = build_worker(&args, &registry).await?;
    let config = ExperimentConfiguration::new(worker, args.workload.clone())
        .with_iterations(args.iterations)
        .with_concurrency(args.concurrency)
        .with_concurrency_step_time(args.concurrency_step_time)
        .with_interval(args.interval)
        .with_stop(args.stop);
    config.validate()?;

    let store = args
        .csv_dir
        .as_ref()
        .map(|dir| CsvStore::new(dir, &registry));

    let mut out = output::formatter(args.output);
    let mut experiment = RunnableExperiment::new(config.clone());
    let mut samples = experiment.subscribe();

    let running = experiment.start(Context::new())?;
    let guid = running.guid().to_string();
    let interrupt = shutdown::quit_on_ctrl_c(running.quit_signal());

    let mut csv = match store.map(|s| s.writer(&guid, &config)).transpose() {
        Ok(v) => v,
        Err(err) => {
            running.quit();
            interrupt.abort();
            return Err(RunError::RuntimeError(err.context("failed to open csv store")));
        }
    };

    out.print_header(&guid, &config);

    let mut last: Option<Sample> = None;
    let mut csv_error: Option<anyhow::Error> = None;
    while let Some(sample) = samples.recv().await {
        out.on_sample(&sample);
        if csv_error.is_none()
            && let Some(writer) = csv.as_mut()
            && let Err(err) = writer.write(&sample)
        {
            tracing::error!(path = %writer.path().display(), "csv write failed: {err:#}");
            csv_error = Some(err);
        }
        last = Some(sample);
    }

    let waited = running.wait().await;
    interrupt.abort();
    waited?;

    out.print_summary(&guid, last.as_ref())
        .map_err(RunError::RuntimeError)?;

    if let Some(err) = csv_error {
        return Err(RunError::RuntimeError(err.context("failed to write csv store")));
    }

    Ok(ExitCode::from_errors(
        last.map(|s| s.total_errors).unwrap_or_default(),
    ))
}

async fn build_worker(args: &RunArgs, registry: &Arc<WorkloadRegistry>) -> Result<Worker, RunError> {
    let Some(addr) = &args.bus else {
        return Ok(LocalWorker::new(registry.clone()).into());
    };

    let bus = TcpBus::connect(addr.as_str())
        .await
        .with_context(|| format!("failed to connect to bus {addr}"))
        .map_err(RunError::RuntimeError)?;
    tracing::info!(%addr, queue = %args.queue, "dispatching iterations over the bus");

    Ok(DistributedWorker::new(Arc::new(bus))
        .with_queue(args.queue.clone())
        .with_timeout(args.timeout)
        .into())
}
