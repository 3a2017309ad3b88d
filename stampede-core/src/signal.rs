use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// One-shot cooperative stop flag shared by the tasks of a run or a slave.
///
/// Tasks poll [`QuitSignal::is_quit`] at iteration boundaries and may `wait()` on it while idle.
#[derive(Debug, Default)]
pub struct QuitSignal {
    quit: AtomicBool,
    notify: Notify,
}

impl QuitSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quit(&self) {
        self.quit.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_quit(&self) -> bool {
        self.quit.load(Ordering::Acquire)
    }

    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent `quit()` cannot slip between.
            notified.as_mut().enable();

            if self.is_quit() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn wait_returns_after_quit() {
        let signal = Arc::new(QuitSignal::new());

        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        signal.quit();
        if let Err(err) = waiter.await {
            panic!("waiter panicked: {err}");
        }
        assert!(signal.is_quit());

        // Already quit: returns immediately.
        signal.wait().await;
    }
}
