use anyhow::Context as _;

use stampede_bus::BusServer;

use crate::cli::BusArgs;
use crate::exit_codes::ExitCode;
use crate::run_error::RunError;
use crate::shutdown;

/// Hosts the job broker until Ctrl-C.
pub async fn bus(args: BusArgs) -> Result<ExitCode, RunError> {
    let server = BusServer::bind(args.bind.as_str())
        .await
        .with_context(|| format!("failed to bind bus on {}", args.bind))
        .map_err(RunError::RuntimeError)?;
    eprintln!("bus={}", server.local_addr());

    shutdown::wait_for_ctrl_c().await;
    server.shutdown().await;
    Ok(ExitCode::Success)
}
