//! In-process queues.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::{Instant, timeout_at};

use super::Queue;
use crate::error::QueueError;

/// Named in-memory FIFOs with blocking pop.
#[derive(Default)]
pub struct MemoryQueue {
    queues: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
    pushed: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, queue: &str) -> usize {
        self.queues.lock().await.get(queue).map_or(0, VecDeque::len)
    }

    pub async fn is_empty(&self, queue: &str) -> bool {
        self.len(queue).await == 0
    }

    /// Remove and return everything currently in `queue`.
    pub async fn drain(&self, queue: &str) -> Vec<Vec<u8>> {
        self.queues
            .lock()
            .await
            .get_mut(queue)
            .map(|items| items.drain(..).collect())
            .unwrap_or_default()
    }

    async fn take(&self, queue: &str) -> Option<Vec<u8>> {
        self.queues.lock().await.get_mut(queue).and_then(VecDeque::pop_front)
    }
}

#[async_trait::async_trait]
impl Queue for MemoryQueue {
    async fn ping(&self) -> Result<(), QueueError> {
        Ok(())
    }

    async fn pop(&self, queue: &str, wait: Duration) -> Result<Option<Vec<u8>>, QueueError> {
        let deadline = Instant::now() + wait;
        loop {
            // Register interest before looking so a concurrent push is not missed
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(payload) = self.take(queue).await {
                return Ok(Some(payload));
            }
            if timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn push(&self, queue: &str, payload: &[u8]) -> Result<(), QueueError> {
        self.queues.lock().await.entry(queue.to_string()).or_default().push_back(payload.to_vec());
        self.pushed.notify_waiters();
        Ok(())
    }
}
