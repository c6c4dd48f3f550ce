/// Queue module - the FIFOs jobs and results travel through
///
/// Workers and routers only see the [`Queue`] trait. `redis` is the
/// production backend; `memory` keeps everything in-process.
pub mod memory;
pub mod redis;

use std::time::Duration;

use crate::error::QueueError;

pub use self::memory::MemoryQueue;
pub use self::redis::{RedisOptions, RedisQueue};

/// Named FIFOs of opaque payloads.
#[async_trait::async_trait]
pub trait Queue: Send + Sync {
    /// Check the backend is reachable
    async fn ping(&self) -> Result<(), QueueError>;

    /// Remove the head of `queue`, waiting up to `wait` for one to arrive
    async fn pop(&self, queue: &str, wait: Duration) -> Result<Option<Vec<u8>>, QueueError>;

    /// Append `payload` to the tail of `queue`
    async fn push(&self, queue: &str, payload: &[u8]) -> Result<(), QueueError>;
}
