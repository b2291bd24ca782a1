//! Object store boundary.

use async_trait::async_trait;
use thiserror::Error;

/// Metadata attached to a stored object.
#[derive(Debug, Clone, Default)]
pub struct ObjectMetadata {
    pub filename: String,
    pub content_type: String,
}

/// Opaque blob storage (the production deployment wraps a cloud bucket).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store bytes; returns the storage path for later retrieval.
    async fn put(&self, bytes: &[u8], metadata: ObjectMetadata)
    -> Result<String, ObjectStoreError>;

    /// Fetch the bytes at a storage path.
    async fn get(&self, path: &str) -> Result<Vec<u8>, ObjectStoreError>;

    /// Produce a time-limited download URL for a storage path.
    async fn sign(&self, path: &str) -> Result<String, ObjectStoreError>;
}

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("object store unavailable: {0}")]
    Unavailable(String),
}
