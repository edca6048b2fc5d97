/// Queue handing category snapshots from the ingestion task to the publisher
use log::debug;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

use crate::lifecycle::Shutdown;
use crate::models::PendingBatch;

/// FIFO of pending batches plus the wake-up signal for the consumer
///
/// The queue is unbounded: a stalled publisher makes it grow, it never drops
/// or overwrites a batch.
#[derive(Debug, Default)]
pub struct Handoff {
    queue: Mutex<VecDeque<PendingBatch>>,
    notify: Notify,
}

impl Handoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch and wake the consumer. Never blocks.
    pub fn enqueue(&self, batch: PendingBatch) {
        let depth = {
            let mut queue = self.lock();
            queue.push_back(batch);
            queue.len()
        };
        debug!("{} added to handoff queue (depth {})", batch.category, depth);
        // Stores a permit when nobody waits yet, so the wake-up cannot be lost
        self.notify.notify_one();
    }

    /// Wait until a batch is available and take the oldest one
    ///
    /// Returns `None` once `shutdown` has fired and the queue is empty.
    /// Batches that are already queued are still handed out after shutdown.
    pub async fn wait_and_dequeue(&self, shutdown: &Shutdown) -> Option<PendingBatch> {
        loop {
            if let Some(batch) = self.lock().pop_front() {
                return Some(batch);
            }

            tokio::select! {
                _ = self.notify.notified() => {}
                _ = shutdown.cancelled() => return self.lock().pop_front(),
            }
        }
    }

    /// Wait for at least one batch, then take everything queued in arrival order
    pub async fn wait_and_drain(&self, shutdown: &Shutdown) -> Option<Vec<PendingBatch>> {
        let first = self.wait_and_dequeue(shutdown).await?;
        let mut batches = vec![first];
        batches.extend(self.lock().drain(..));
        Some(batches)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<PendingBatch>> {
        // Nothing can panic while the lock is held, a poisoned queue is still consistent
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
impl Handoff {
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
