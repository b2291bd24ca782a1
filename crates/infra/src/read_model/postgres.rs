//! Postgres-backed read access to related domain records.
//!
//! These are snapshot reads taken after a claim succeeds; they never join the
//! finalize transaction and eventual consistency is acceptable.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use talentforge_ai::reader::{
    ApplicationSnapshot, DomainReader, PostingSnapshot, ReaderError, ResumeSnapshot,
    StoredFileSnapshot,
};
use talentforge_core::{ApplicationId, FileId, PostingId, ResumeId, UserId};

#[derive(Debug, Clone)]
pub struct PostgresDomainReader {
    pool: Arc<PgPool>,
}

impl PostgresDomainReader {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

fn read_error(operation: &str, err: sqlx::Error) -> ReaderError {
    ReaderError::Unavailable(format!("{operation}: {err}"))
}

#[async_trait]
impl DomainReader for PostgresDomainReader {
    async fn file(&self, id: FileId) -> Result<Option<StoredFileSnapshot>, ReaderError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, original_filename, content_type, bucket_path, created_at
            FROM uploaded_files
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| read_error("file", e))?;

        row.map(|r| {
            Ok(StoredFileSnapshot {
                id: FileId::from_uuid(r.try_get("id").map_err(|e| read_error("file", e))?),
                owner: UserId::from_uuid(r.try_get("user_id").map_err(|e| read_error("file", e))?),
                original_filename: r
                    .try_get("original_filename")
                    .map_err(|e| read_error("file", e))?,
                content_type: r
                    .try_get("content_type")
                    .map_err(|e| read_error("file", e))?,
                bucket_path: r.try_get("bucket_path").map_err(|e| read_error("file", e))?,
                created_at: r.try_get("created_at").map_err(|e| read_error("file", e))?,
            })
        })
        .transpose()
    }

    async fn application(
        &self,
        id: ApplicationId,
    ) -> Result<Option<ApplicationSnapshot>, ReaderError> {
        let row = sqlx::query(
            r#"
            SELECT id, resume_id, job_id
            FROM applications
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| read_error("application", e))?;

        row.map(|r| {
            Ok(ApplicationSnapshot {
                id: ApplicationId::from_uuid(
                    r.try_get("id").map_err(|e| read_error("application", e))?,
                ),
                resume_id: ResumeId::from_uuid(
                    r.try_get("resume_id")
                        .map_err(|e| read_error("application", e))?,
                ),
                posting_id: PostingId::from_uuid(
                    r.try_get("job_id")
                        .map_err(|e| read_error("application", e))?,
                ),
            })
        })
        .transpose()
    }

    async fn resume(&self, id: ResumeId) -> Result<Option<ResumeSnapshot>, ReaderError> {
        let row = sqlx::query(
            r#"
            SELECT id, content
            FROM resumes
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| read_error("resume", e))?;

        row.map(|r| {
            Ok(ResumeSnapshot {
                id: ResumeId::from_uuid(r.try_get("id").map_err(|e| read_error("resume", e))?),
                content: r.try_get("content").map_err(|e| read_error("resume", e))?,
            })
        })
        .transpose()
    }

    async fn posting(&self, id: PostingId) -> Result<Option<PostingSnapshot>, ReaderError> {
        let row = sqlx::query(
            r#"
            SELECT id, title, description, skills
            FROM job_postings
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| read_error("posting", e))?;

        row.map(|r| {
            let skills: serde_json::Value =
                r.try_get("skills").map_err(|e| read_error("posting", e))?;
            Ok(PostingSnapshot {
                id: PostingId::from_uuid(r.try_get("id").map_err(|e| read_error("posting", e))?),
                title: r.try_get("title").map_err(|e| read_error("posting", e))?,
                description: r
                    .try_get("description")
                    .map_err(|e| read_error("posting", e))?,
                skills: skills
                    .as_array()
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|v| v.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default(),
            })
        })
        .transpose()
    }

    async fn open_postings(&self, limit: usize) -> Result<Vec<PostingSnapshot>, ReaderError> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, description, skills
            FROM job_postings
            WHERE is_open
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| read_error("open_postings", e))?;

        rows.into_iter()
            .map(|r| {
                let skills: serde_json::Value = r
                    .try_get("skills")
                    .map_err(|e| read_error("open_postings", e))?;
                Ok(PostingSnapshot {
                    id: PostingId::from_uuid(
                        r.try_get("id").map_err(|e| read_error("open_postings", e))?,
                    ),
                    title: r
                        .try_get("title")
                        .map_err(|e| read_error("open_postings", e))?,
                    description: r
                        .try_get("description")
                        .map_err(|e| read_error("open_postings", e))?,
                    skills: skills
                        .as_array()
                        .map(|items| {
                            items
                                .iter()
                                .filter_map(|v| v.as_str().map(str::to_string))
                                .collect()
                        })
                        .unwrap_or_default(),
                })
            })
            .collect()
    }
}
