//! Postgres-backed job store.
//!
//! ## Expected schema
//!
//! ```sql
//! CREATE TABLE ai_jobs (
//!     id          UUID PRIMARY KEY,
//!     owner_id    UUID NOT NULL,
//!     job_type    TEXT NOT NULL,
//!     status      TEXT NOT NULL,
//!     input_ref   TEXT NOT NULL,
//!     result      JSONB,
//!     error       TEXT,
//!     version     BIGINT NOT NULL,
//!     started_at  TIMESTAMPTZ,
//!     finished_at TIMESTAMPTZ,
//!     token_usage BIGINT,
//!     provider    TEXT,
//!     created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```
//!
//! Domain writes additionally touch `applications (id, match_score, rank,
//! processing_state, updated_at)`.
//!
//! ## Concurrency
//!
//! The claim is one conditional UPDATE checked via `rows_affected()`: zero
//! rows means another worker got there first (or the record is gone) and the
//! message is dropped. Finalize is conditional on `status = 'processing' AND
//! version = $claimed`, which fences out workers whose claim was revoked by
//! the stuck-job sweep. Neither path ever reads-then-writes.
//!
//! ## Error mapping
//!
//! | SQLx error | PostgreSQL code | JobStoreError |
//! |------------|-----------------|---------------|
//! | Database (unique violation) | `23505` | `AlreadyExists` |
//! | Database (other) | any other | `Storage` |
//! | PoolClosed / Io / Tls | n/a | `Storage` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;

use talentforge_core::JobId;
use talentforge_jobs::store::{JobStore, JobStoreError};
use talentforge_jobs::types::{DomainWrite, Job, JobOutcome, JobStatus, JobType};

/// Postgres-backed durable job store.
///
/// Uses the SQLx connection pool (thread-safe, shareable); the pool is the
/// explicitly constructed, injected handle (opened at process start, closed
/// at shutdown).
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: Arc<PgPool>,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    async fn fetch_row(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                id, owner_id, job_type, status, input_ref, result, error,
                version, started_at, finished_at, token_usage, provider,
                created_at, updated_at
            FROM ai_jobs
            WHERE id = $1
            "#,
        )
        .bind(job_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch", e))?;

        row.map(|r| JobRow::from_row(&r).map(Job::from))
            .transpose()
            .map_err(|e| JobStoreError::Storage(format!("failed to deserialize job row: {e}")))
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self, job), fields(job_id = %job.id, job_type = %job.job_type), err)]
    async fn insert(&self, job: &Job) -> Result<(), JobStoreError> {
        sqlx::query(
            r#"
            INSERT INTO ai_jobs (
                id, owner_id, job_type, status, input_ref, result, error,
                version, started_at, finished_at, token_usage, provider,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.owner.as_uuid())
        .bind(job.job_type.as_str())
        .bind(job.status.as_str())
        .bind(&job.input_ref)
        .bind(&job.result)
        .bind(&job.error)
        .bind(job.version)
        .bind(job.started_at)
        .bind(job.finished_at)
        .bind(job.token_usage)
        .bind(&job.provider)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                JobStoreError::AlreadyExists(job.id)
            } else {
                map_sqlx_error("insert", e)
            }
        })?;

        Ok(())
    }

    async fn fetch(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        self.fetch_row(job_id).await
    }

    #[instrument(skip(self), fields(job_id = %job_id), err)]
    async fn claim(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let updated = sqlx::query(
            r#"
            UPDATE ai_jobs
            SET status = 'processing', version = version + 1,
                started_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(job_id.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("claim", e))?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }

        self.fetch_row(job_id).await
    }

    #[instrument(skip(self, outcome), fields(job_id = %job_id, claimed_version), err)]
    async fn finalize_success(
        &self,
        job_id: JobId,
        claimed_version: i64,
        outcome: JobOutcome,
    ) -> Result<(), JobStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let updated = sqlx::query(
            r#"
            UPDATE ai_jobs
            SET status = 'completed', version = version + 1, result = $3,
                error = NULL, token_usage = $4, provider = $5,
                finished_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'processing' AND version = $2
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(claimed_version)
        .bind(&outcome.result)
        .bind(outcome.token_usage)
        .bind(&outcome.provider)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("finalize_success", e))?;

        if updated.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(JobStoreError::Conflict(format!(
                "job {job_id} is not processing at version {claimed_version}"
            )));
        }

        // Domain side effects commit or roll back with the finalize.
        for write in &outcome.writes {
            apply_domain_write(&mut tx, write).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip(self, error), fields(job_id = %job_id, claimed_version), err)]
    async fn finalize_failure(
        &self,
        job_id: JobId,
        claimed_version: i64,
        error: &str,
    ) -> Result<(), JobStoreError> {
        let updated = sqlx::query(
            r#"
            UPDATE ai_jobs
            SET status = 'failed', version = version + 1, error = $3,
                finished_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'processing' AND version = $2
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(claimed_version)
        .bind(error)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("finalize_failure", e))?;

        if updated.rows_affected() == 0 {
            return Err(JobStoreError::Conflict(format!(
                "job {job_id} is not processing at version {claimed_version}"
            )));
        }

        Ok(())
    }

    async fn stale_pending(
        &self,
        older_than: Duration,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        let cutoff = Utc::now() - older_than;

        let rows = sqlx::query(
            r#"
            SELECT
                id, owner_id, job_type, status, input_ref, result, error,
                version, started_at, finished_at, token_usage, provider,
                created_at, updated_at
            FROM ai_jobs
            WHERE status = 'pending' AND version = 1 AND created_at <= $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("stale_pending", e))?;

        rows_to_jobs(rows)
    }

    async fn rearm_stuck(
        &self,
        older_than: Duration,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        let cutoff = Utc::now() - older_than;

        let candidates: Vec<uuid::Uuid> = sqlx::query(
            r#"
            SELECT id FROM ai_jobs
            WHERE status = 'processing' AND started_at <= $1
            ORDER BY started_at ASC
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("rearm_stuck", e))?
        .iter()
        .map(|row| row.try_get("id"))
        .collect::<Result<_, _>>()
        .map_err(|e| JobStoreError::Storage(format!("failed to read candidate id: {e}")))?;

        let mut rearmed = Vec::with_capacity(candidates.len());
        for id in candidates {
            // Conditional per row: a worker finishing between the SELECT and
            // this UPDATE wins, and the job is left alone.
            let updated = sqlx::query(
                r#"
                UPDATE ai_jobs
                SET status = 'pending', version = version + 1,
                    started_at = NULL, updated_at = NOW()
                WHERE id = $1 AND status = 'processing' AND started_at <= $2
                "#,
            )
            .bind(id)
            .bind(cutoff)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("rearm_stuck", e))?;

            if updated.rows_affected() == 0 {
                continue;
            }

            if let Some(job) = self.fetch_row(JobId::from_uuid(id)).await? {
                rearmed.push(job);
            }
        }

        Ok(rearmed)
    }
}

async fn apply_domain_write(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    write: &DomainWrite,
) -> Result<(), JobStoreError> {
    match write {
        DomainWrite::ApplicationScored {
            application_id,
            match_score,
            rank,
        } => {
            sqlx::query(
                r#"
                UPDATE applications
                SET match_score = $2, rank = $3, processing_state = 'scored',
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(application_id.as_uuid())
            .bind(match_score)
            .bind(rank)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("apply_domain_write", e))?;
        }
    }
    Ok(())
}

fn rows_to_jobs(rows: Vec<PgRow>) -> Result<Vec<Job>, JobStoreError> {
    rows.iter()
        .map(|row| {
            JobRow::from_row(row)
                .map(Job::from)
                .map_err(|e| JobStoreError::Storage(format!("failed to deserialize job row: {e}")))
        })
        .collect()
}

/// Map SQLx errors to JobStoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> JobStoreError {
    match err {
        sqlx::Error::Database(db_err) => JobStoreError::Storage(format!(
            "database error in {}: {}",
            operation,
            db_err.message()
        )),
        sqlx::Error::PoolClosed => {
            JobStoreError::Storage(format!("connection pool closed in {operation}"))
        }
        other => JobStoreError::Storage(format!("sqlx error in {operation}: {other}")),
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

fn parse_status(raw: &str) -> Result<JobStatus, sqlx::Error> {
    match raw {
        "pending" => Ok(JobStatus::Pending),
        "processing" => Ok(JobStatus::Processing),
        "completed" => Ok(JobStatus::Completed),
        "failed" => Ok(JobStatus::Failed),
        other => Err(sqlx::Error::Decode(
            format!("unknown job status: {other}").into(),
        )),
    }
}

// SQLx row types

#[derive(Debug)]
struct JobRow {
    id: uuid::Uuid,
    owner_id: uuid::Uuid,
    job_type: String,
    status: JobStatus,
    input_ref: String,
    result: Option<serde_json::Value>,
    error: Option<String>,
    version: i64,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    token_usage: Option<i64>,
    provider: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for JobRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        Ok(JobRow {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            job_type: row.try_get("job_type")?,
            status: parse_status(&status)?,
            input_ref: row.try_get("input_ref")?,
            result: row.try_get("result")?,
            error: row.try_get("error")?,
            version: row.try_get("version")?,
            started_at: row.try_get("started_at")?,
            finished_at: row.try_get("finished_at")?,
            token_usage: row.try_get("token_usage")?,
            provider: row.try_get("provider")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Job {
            id: JobId::from_uuid(row.id),
            owner: talentforge_core::UserId::from_uuid(row.owner_id),
            job_type: JobType::from(row.job_type),
            status: row.status,
            input_ref: row.input_ref,
            result: row.result,
            error: row.error,
            version: row.version,
            started_at: row.started_at,
            finished_at: row.finished_at,
            token_usage: row.token_usage,
            provider: row.provider,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(parse_status(status.as_str()).unwrap(), status);
        }
        assert!(parse_status("cancelled").is_err());
    }

    #[test]
    fn sqlx_errors_map_to_storage() {
        let err = map_sqlx_error("fetch", sqlx::Error::PoolClosed);
        assert!(matches!(err, JobStoreError::Storage(_)));
        assert!(err.to_string().contains("fetch"));
    }
}
