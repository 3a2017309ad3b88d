use std::sync::Arc;

use stampede_core::QuitSignal;
use tokio::task::JoinHandle;

/// Fires `quit` on the first Ctrl-C. Abort the returned handle once the work is done.
pub(crate) fn quit_on_ctrl_c(quit: Arc<QuitSignal>) -> JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                eprintln!("Received shutdown signal, finishing in-flight iterations...");
                quit.quit();
            }
            Err(err) => tracing::warn!("failed to listen for Ctrl-C: {err}"),
        }
    })
}

/// Blocks until Ctrl-C. A listener that cannot be installed counts as an immediate shutdown.
pub(crate) async fn wait_for_ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for Ctrl-C: {err}");
        return;
    }
    eprintln!("Received shutdown signal, shutting down...");
}
