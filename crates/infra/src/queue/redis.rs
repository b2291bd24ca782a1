//! Redis list-backed queue transport.
//!
//! One durable list, `LPUSH` to the head and `BRPOP` from the tail (FIFO).
//! `BRPOP` carries a bounded timeout so the worker loop can wake up for
//! shutdown checks; an expired timeout is `Ok(None)`, not an error.
//!
//! Delivery is at-least-once from the engine's point of view: a worker can
//! pop a message and die before finalizing. That is safe because the claim
//! protocol derives the authoritative state from the job store.

use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;
use tracing::debug;

use talentforge_jobs::transport::{QueueTransport, TransportError};
use talentforge_jobs::types::QueueMessage;

/// Default list key for job messages.
const DEFAULT_QUEUE_KEY: &str = "talentforge:ai_jobs";

/// Redis-backed queue transport.
///
/// Pushes share one cached multiplexed connection, re-established lazily
/// after an error. `BRPOP` blocks its connection for the whole timeout, so
/// every pop opens its own connection instead, so concurrent workers cannot
/// queue blocking commands behind each other.
pub struct RedisQueueTransport {
    client: Arc<redis::Client>,
    queue_key: String,
    push_conn: Mutex<Option<MultiplexedConnection>>,
}

impl RedisQueueTransport {
    /// Create a transport for the given Redis URL
    /// (e.g. `redis://localhost:6379`).
    pub fn new(
        redis_url: impl AsRef<str>,
        queue_key: Option<String>,
    ) -> Result<Self, TransportError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            queue_key: queue_key.unwrap_or_else(|| DEFAULT_QUEUE_KEY.to_string()),
            push_conn: Mutex::new(None),
        })
    }

    pub fn queue_key(&self) -> &str {
        &self.queue_key
    }

    async fn push_connection(&self) -> Result<MultiplexedConnection, TransportError> {
        let mut guard = self.push_conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self.connect().await?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    async fn connect(&self) -> Result<MultiplexedConnection, TransportError> {
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;
        debug!(queue_key = %self.queue_key, "redis connection established");
        Ok(conn)
    }

    async fn invalidate_push_connection(&self) {
        *self.push_conn.lock().await = None;
    }
}

#[async_trait]
impl QueueTransport for RedisQueueTransport {
    async fn push(&self, message: &QueueMessage) -> Result<(), TransportError> {
        let payload = serde_json::to_string(message)
            .map_err(|e| TransportError::Serialization(e.to_string()))?;

        let mut conn = self.push_connection().await?;
        let result: Result<i64, _> = redis::cmd("LPUSH")
            .arg(&self.queue_key)
            .arg(&payload)
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                self.invalidate_push_connection().await;
                Err(TransportError::Unavailable(format!("LPUSH failed: {e}")))
            }
        }
    }

    async fn pop(
        &self,
        timeout: std::time::Duration,
    ) -> Result<Option<QueueMessage>, TransportError> {
        let mut conn = self.connect().await?;

        // BRPOP returns (key, value) or nil on timeout.
        let result: Result<Option<(String, String)>, _> = redis::cmd("BRPOP")
            .arg(&self.queue_key)
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await;

        let popped = match result {
            Ok(popped) => popped,
            Err(e) => return Err(TransportError::Unavailable(format!("BRPOP failed: {e}"))),
        };

        match popped {
            None => Ok(None),
            Some((_, payload)) => serde_json::from_str(&payload)
                .map(Some)
                .map_err(|e| TransportError::Serialization(format!("bad queue message: {e}"))),
        }
    }
}
