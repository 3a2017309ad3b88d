use anyhow::Context as _;
use std::sync::Arc;

use stampede_bus::TcpBus;
use stampede_core::{LocalWorker, Slave, SlaveConfig};

use crate::cli::SlaveArgs;
use crate::exit_codes::ExitCode;
use crate::run_error::RunError;
use crate::shutdown;
use crate::workloads;

/// Serves jobs from the bus with the built-in steps until Ctrl-C.
pub async fn slave(args: SlaveArgs) -> Result<ExitCode, RunError> {
    let bus = TcpBus::connect(args.bus.as_str())
        .await
        .with_context(|| format!("failed to connect to bus {}", args.bus))
        .map_err(RunError::RuntimeError)?;

    let worker = LocalWorker::new(Arc::new(workloads::builtin()));
    let config = SlaveConfig::default()
        .with_queue(args.queue.clone())
        .with_consumers(args.consumers);

    let handle = Slave::new(Arc::new(bus), worker)
        .with_config(config)
        .start()?;
    eprintln!(
        "slave: serving queue={} bus={} consumers={}",
        args.queue, args.bus, args.consumers
    );

    shutdown::wait_for_ctrl_c().await;
    handle.close().await?;
    Ok(ExitCode::Success)
}
