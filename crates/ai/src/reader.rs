//! Read-side snapshots of related domain records.
//!
//! Handlers only ever read these after a successful claim, so
//! eventually-consistent snapshots are fine; nothing here participates in the
//! finalize transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use talentforge_core::{ApplicationId, FileId, PostingId, ResumeId, UserId};

/// Catalog entry for an uploaded file.
#[derive(Debug, Clone)]
pub struct StoredFileSnapshot {
    pub id: FileId,
    pub owner: UserId,
    pub original_filename: String,
    pub content_type: String,
    /// Object-store path for [`crate::ObjectStore::get`].
    pub bucket_path: String,
    pub created_at: DateTime<Utc>,
}

/// An application linking a candidate's resume to a posting.
#[derive(Debug, Clone)]
pub struct ApplicationSnapshot {
    pub id: ApplicationId,
    pub resume_id: ResumeId,
    pub posting_id: PostingId,
}

/// A stored resume. `content` is the structured resume document; handlers
/// stringify it for prompts.
#[derive(Debug, Clone)]
pub struct ResumeSnapshot {
    pub id: ResumeId,
    pub content: JsonValue,
}

/// A published job posting.
#[derive(Debug, Clone)]
pub struct PostingSnapshot {
    pub id: PostingId,
    pub title: String,
    pub description: String,
    pub skills: Vec<String>,
}

/// Read access to the domain records handlers resolve `input_ref` against.
#[async_trait]
pub trait DomainReader: Send + Sync {
    async fn file(&self, id: FileId) -> Result<Option<StoredFileSnapshot>, ReaderError>;

    async fn application(
        &self,
        id: ApplicationId,
    ) -> Result<Option<ApplicationSnapshot>, ReaderError>;

    async fn resume(&self, id: ResumeId) -> Result<Option<ResumeSnapshot>, ReaderError>;

    async fn posting(&self, id: PostingId) -> Result<Option<PostingSnapshot>, ReaderError>;

    /// Most recent open postings, capped at `limit`.
    async fn open_postings(&self, limit: usize) -> Result<Vec<PostingSnapshot>, ReaderError>;
}

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("read store unavailable: {0}")]
    Unavailable(String),
}
