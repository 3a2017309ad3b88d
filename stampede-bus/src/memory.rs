use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::{BusError, Transport};

/// How long a discarded queue keeps refusing pushes.
const DISCARD_TTL: Duration = Duration::from_secs(600);

/// In-process queues. Also the storage behind [`crate::BusServer`].
#[derive(Debug, Default)]
pub struct MemoryBus {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    queues: HashMap<String, VecDeque<String>>,
    notifies: HashMap<String, watch::Sender<u64>>,
    /// Discarded queues and when they were discarded. One late push per entry is dropped.
    discarded: HashMap<String, Instant>,
}

impl Inner {
    fn take(&mut self, queue: &str) -> Option<String> {
        let items = self.queues.get_mut(queue)?;
        let item = items.pop_front();
        if items.is_empty() {
            self.queues.remove(queue);
        }
        item
    }
}

impl MemoryBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_now(&self, queue: &str, payload: String) {
        let notify = {
            let mut inner = self
                .inner
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if inner.discarded.remove(queue).is_some() {
                tracing::debug!(queue, "dropping push to discarded queue");
                return;
            }
            inner
                .queues
                .entry(queue.to_string())
                .or_default()
                .push_back(payload);
            inner.notifies.get(queue).cloned()
        };

        if let Some(notify) = notify {
            notify.send_modify(|v| *v = v.wrapping_add(1));
        }
    }

    pub fn try_pop(&self, queue: &str) -> Option<String> {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.take(queue)
    }

    #[must_use]
    pub fn len(&self, queue: &str) -> usize {
        let inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.queues.get(queue).map_or(0, VecDeque::len)
    }

    #[must_use]
    pub fn is_empty(&self, queue: &str) -> bool {
        self.len(queue) == 0
    }

    /// Number of queues currently holding items.
    #[must_use]
    pub fn queue_count(&self) -> usize {
        let inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.queues.len()
    }

    /// Drops pending items. The next push to `queue` within [`DISCARD_TTL`] is dropped as well,
    /// so an answer that arrives after its asker gave up does not linger.
    pub fn discard_now(&self, queue: &str) {
        let now = Instant::now();
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.queues.remove(queue);
        inner
            .discarded
            .retain(|_, at| now.duration_since(*at) < DISCARD_TTL);
        inner.discarded.insert(queue.to_string(), now);
    }

    pub async fn pop_wait(&self, queue: &str, timeout: Duration) -> Option<String> {
        let deadline = Instant::now() + timeout;
        let item = self.pop_until(queue, deadline).await;
        self.release_notify(queue);
        item
    }

    async fn pop_until(&self, queue: &str, deadline: Instant) -> Option<String> {
        loop {
            let mut rx = {
                let mut inner = self
                    .inner
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());

                if let Some(item) = inner.take(queue) {
                    return Some(item);
                }

                // Subscribing under the lock means a push landing after this point always bumps
                // a version this receiver has not seen yet.
                inner
                    .notifies
                    .entry(queue.to_string())
                    .or_insert_with(|| watch::channel(0u64).0)
                    .subscribe()
            };

            loop {
                match tokio::time::timeout_at(deadline, rx.changed()).await {
                    Err(_) => return self.try_pop(queue),
                    Ok(Ok(())) => {
                        if let Some(item) = self.try_pop(queue) {
                            return Some(item);
                        }
                    }
                    // The notifier was released underneath us; subscribe again.
                    Ok(Err(_)) => break,
                }
            }
        }
    }

    fn release_notify(&self, queue: &str) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if inner
            .notifies
            .get(queue)
            .is_some_and(|tx| tx.receiver_count() == 0)
        {
            inner.notifies.remove(queue);
        }
    }
}

#[async_trait::async_trait]
impl Transport for MemoryBus {
    async fn push(&self, queue: &str, payload: String) -> Result<(), BusError> {
        self.push_now(queue, payload);
        Ok(())
    }

    async fn pop(&self, queue: &str, timeout: Duration) -> Result<Option<String>, BusError> {
        Ok(self.pop_wait(queue, timeout).await)
    }

    async fn discard(&self, queue: &str) -> Result<(), BusError> {
        self.discard_now(queue);
        Ok(())
    }
}
