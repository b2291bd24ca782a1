//! Queue transport contract and the in-memory transport for tests/dev.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::types::QueueMessage;

/// Durable FIFO list used purely as a work-available signal.
///
/// At-least-once: a message may be delivered to a worker that crashes before
/// finalizing, or delivered twice. Both are safe because the claim protocol
/// derives the authoritative state from the job store, not from delivery.
/// No ordering is guaranteed across job types.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Push a message to the head of the list.
    async fn push(&self, message: &QueueMessage) -> Result<(), TransportError>;

    /// Pop from the tail, waiting at most `timeout`.
    ///
    /// Returns `Ok(None)` on expiry so the worker loop can run its liveness
    /// checks (shutdown, health) instead of blocking forever.
    async fn pop(&self, timeout: Duration) -> Result<Option<QueueMessage>, TransportError>;
}

/// Queue transport error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),
    #[error("message serialization failed: {0}")]
    Serialization(String),
}

/// In-memory transport for tests/dev.
///
/// - No IO
/// - Push-to-head / pop-from-tail, like the durable list
/// - Bounded pop via a notify + deadline loop
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    queue: Mutex<VecDeque<QueueMessage>>,
    notify: Notify,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages currently waiting. Test helper.
    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }
}

#[async_trait]
impl QueueTransport for InMemoryTransport {
    async fn push(&self, message: &QueueMessage) -> Result<(), TransportError> {
        self.queue.lock().await.push_front(message.clone());
        self.notify.notify_one();
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<QueueMessage>, TransportError> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(message) = self.queue.lock().await.pop_back() {
                return Ok(Some(message));
            }

            // Another consumer may steal the message between the wakeup and
            // our lock, so re-check until the deadline.
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return Ok(None);
            }
        }
    }
}
