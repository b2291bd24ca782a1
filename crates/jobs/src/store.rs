//! Job persistence contract and the in-memory store for tests/dev.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use talentforge_core::JobId;

use crate::types::{DomainWrite, Job, JobOutcome, JobStatus};

/// Durable job persistence.
///
/// The claim is the only operation that needs an atomic conditional-write
/// primitive from the backing store; it must be a single compare-and-swap,
/// never a read-then-write. Finalize is conditional on the job still being
/// `Processing` at the version the worker claimed, which seals terminal
/// states and fences out a worker whose job was re-armed by the stuck-job
/// sweep while it was hung.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a freshly created job (`Pending`, `version = 1`).
    async fn insert(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Fetch a job by id.
    async fn fetch(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// Atomically transition `Pending -> Processing` and take ownership.
    ///
    /// Returns the claimed job, or `None` when the conditional write affected
    /// zero rows (already claimed, already finished, or no such record). A
    /// `None` is the expected dedup path for duplicate queue messages and is
    /// not an error.
    async fn claim(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// Transition `Processing -> Completed`, attach the result, and apply the
    /// outcome's domain writes in the same transaction.
    ///
    /// `claimed_version` is the version returned by [`JobStore::claim`]; a
    /// mismatch means the claim was revoked (stuck-job sweep) and the
    /// transition is rejected with [`JobStoreError::Conflict`].
    async fn finalize_success(
        &self,
        job_id: JobId,
        claimed_version: i64,
        outcome: JobOutcome,
    ) -> Result<(), JobStoreError>;

    /// Transition `Processing -> Failed` with a display-ready error string.
    /// Same conditionality as [`JobStore::finalize_success`].
    async fn finalize_failure(
        &self,
        job_id: JobId,
        claimed_version: i64,
        error: &str,
    ) -> Result<(), JobStoreError>;

    /// Jobs inserted but (presumably) never published: still `Pending` at
    /// `version = 1` and older than `older_than`. Used by the recovery sweep
    /// to re-publish their queue messages.
    async fn stale_pending(
        &self,
        older_than: Duration,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError>;

    /// Re-arm jobs whose worker died after the claim: `Processing` with
    /// `started_at` older than `older_than` goes back to `Pending`
    /// (version + 1). Returns the re-armed jobs so the sweep can re-publish
    /// them. The version bump revokes the dead worker's claim: if it was
    /// merely hung and comes back to finalize, the version check rejects it.
    async fn rearm_stuck(
        &self,
        older_than: Duration,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    /// A transition attempt against the wrong current status or a stale
    /// version. Rejected, not merged.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// In-memory job store for tests/dev.
///
/// All mutations happen under one write lock, which gives the same atomicity
/// the durable store gets from its conditional UPDATE. Applied domain writes
/// are kept in a log so tests can assert they landed with the finalize.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    applied_writes: RwLock<Vec<DomainWrite>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Domain writes applied so far, in application order.
    pub fn applied_writes(&self) -> Vec<DomainWrite> {
        self.applied_writes.read().unwrap().clone()
    }

    fn guarded<'a>(
        jobs: &'a mut HashMap<JobId, Job>,
        job_id: JobId,
        claimed_version: i64,
    ) -> Result<&'a mut Job, JobStoreError> {
        let job = jobs
            .get_mut(&job_id)
            .ok_or(JobStoreError::NotFound(job_id))?;

        if job.status != JobStatus::Processing || job.version != claimed_version {
            return Err(JobStoreError::Conflict(format!(
                "expected processing at version {claimed_version}, found {} at version {}",
                job.status, job.version
            )));
        }

        Ok(job)
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().unwrap();
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn fetch(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let jobs = self.jobs.read().unwrap();
        Ok(jobs.get(&job_id).cloned())
    }

    async fn claim(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let mut jobs = self.jobs.write().unwrap();
        match jobs.get_mut(&job_id) {
            Some(job) if job.status == JobStatus::Pending => {
                job.mark_processing();
                Ok(Some(job.clone()))
            }
            // Claimed by someone else, already terminal, or never existed:
            // zero rows affected, the caller drops the message.
            _ => Ok(None),
        }
    }

    async fn finalize_success(
        &self,
        job_id: JobId,
        claimed_version: i64,
        outcome: JobOutcome,
    ) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().unwrap();
        let job = Self::guarded(&mut jobs, job_id, claimed_version)?;

        let writes = outcome.writes.clone();
        job.mark_completed(outcome);
        // Same lock, same "transaction": the writes land with the finalize.
        self.applied_writes.write().unwrap().extend(writes);
        Ok(())
    }

    async fn finalize_failure(
        &self,
        job_id: JobId,
        claimed_version: i64,
        error: &str,
    ) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().unwrap();
        let job = Self::guarded(&mut jobs, job_id, claimed_version)?;
        job.mark_failed(error);
        Ok(())
    }

    async fn stale_pending(
        &self,
        older_than: Duration,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        let cutoff = Utc::now() - older_than;
        let jobs = self.jobs.read().unwrap();

        let mut stale: Vec<Job> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending && j.version == 1 && j.created_at <= cutoff)
            .cloned()
            .collect();

        stale.sort_by_key(|j| j.created_at);
        stale.truncate(limit);
        Ok(stale)
    }

    async fn rearm_stuck(
        &self,
        older_than: Duration,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        let cutoff = Utc::now() - older_than;
        let mut jobs = self.jobs.write().unwrap();

        let mut stuck_ids: Vec<JobId> = jobs
            .values()
            .filter(|j| {
                j.status == JobStatus::Processing
                    && j.started_at.is_some_and(|started| started <= cutoff)
            })
            .map(|j| j.id)
            .collect();

        stuck_ids.sort_by_key(|id| jobs[id].started_at);
        stuck_ids.truncate(limit);

        let mut rearmed = Vec::with_capacity(stuck_ids.len());
        for id in stuck_ids {
            if let Some(job) = jobs.get_mut(&id) {
                // Maintenance transition outside the worker state machine:
                // back to Pending so a live worker can claim it again.
                job.status = JobStatus::Pending;
                job.version += 1;
                job.started_at = None;
                job.updated_at = Utc::now();
                rearmed.push(job.clone());
            }
        }

        Ok(rearmed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::types::JobType;
    use talentforge_core::{ApplicationId, UserId};

    fn pending_job() -> Job {
        Job::new(UserId::new(), JobType::ResumeAnalysis, "file-42")
    }

    #[tokio::test]
    async fn claim_takes_ownership_once() {
        let store = InMemoryJobStore::new();
        let job = pending_job();
        store.insert(&job).await.unwrap();

        let claimed = store.claim(job.id).await.unwrap().unwrap();
        assert_eq!(claimed.status, JobStatus::Processing);
        assert_eq!(claimed.version, 2);
        assert!(claimed.started_at.is_some());

        // Duplicate message: zero rows affected, dropped.
        assert!(store.claim(job.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_of_unknown_job_is_a_silent_drop() {
        let store = InMemoryJobStore::new();
        assert!(store.claim(JobId::new()).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_claims_grant_exactly_one_winner() {
        let store = Arc::new(InMemoryJobStore::new());
        let job = pending_job();
        store.insert(&job).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            let id = job.id;
            tasks.push(tokio::spawn(async move {
                store.claim(id).await.unwrap().is_some()
            }));
        }

        let mut winners = 0;
        for t in tasks {
            if t.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn finalize_success_applies_writes_with_the_transition() {
        let store = InMemoryJobStore::new();
        let job = Job::new(UserId::new(), JobType::ApplicationScoring, "app-1");
        store.insert(&job).await.unwrap();
        let claimed = store.claim(job.id).await.unwrap().unwrap();

        let app_id = ApplicationId::new();
        let outcome = JobOutcome::new(json!({"score": 85}))
            .with_usage(1200, "universal")
            .with_write(DomainWrite::ApplicationScored {
                application_id: app_id,
                match_score: 85,
                rank: 16,
            });
        store
            .finalize_success(job.id, claimed.version, outcome)
            .await
            .unwrap();

        let done = store.fetch(job.id).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.version, 3);
        assert_eq!(done.token_usage, Some(1200));
        assert_eq!(done.provider.as_deref(), Some("universal"));

        let writes = store.applied_writes();
        assert_eq!(writes.len(), 1);
        assert!(matches!(
            writes[0],
            DomainWrite::ApplicationScored { application_id, match_score: 85, rank: 16 }
                if application_id == app_id
        ));
    }

    #[tokio::test]
    async fn terminal_jobs_reject_further_transitions() {
        let store = InMemoryJobStore::new();
        let job = pending_job();
        store.insert(&job).await.unwrap();
        let claimed = store.claim(job.id).await.unwrap().unwrap();
        store
            .finalize_failure(job.id, claimed.version, "model returned malformed output")
            .await
            .unwrap();

        let failed = store.fetch(job.id).await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.version, 3);

        // No double-finalize: version stops incrementing.
        let err = store
            .finalize_success(job.id, failed.version, JobOutcome::new(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, JobStoreError::Conflict(_)));
        let still = store.fetch(job.id).await.unwrap().unwrap();
        assert_eq!(still.version, 3);
    }

    #[tokio::test]
    async fn finalize_without_claim_is_rejected() {
        let store = InMemoryJobStore::new();
        let job = pending_job();
        store.insert(&job).await.unwrap();

        let err = store
            .finalize_success(job.id, job.version, JobOutcome::new(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, JobStoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn rearm_revokes_the_original_claim() {
        let store = InMemoryJobStore::new();
        let job = pending_job();
        store.insert(&job).await.unwrap();
        let claimed = store.claim(job.id).await.unwrap().unwrap();

        store.rearm_stuck(Duration::zero(), 10).await.unwrap();
        let reclaimed = store.claim(job.id).await.unwrap().unwrap();

        // The hung worker comes back after the sweep: stale version, rejected.
        let err = store
            .finalize_success(job.id, claimed.version, JobOutcome::new(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, JobStoreError::Conflict(_)));

        // The new owner finalizes normally.
        store
            .finalize_success(job.id, reclaimed.version, JobOutcome::new(json!({"ok": true})))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn stale_pending_skips_jobs_that_were_ever_claimed() {
        let store = InMemoryJobStore::new();

        let orphaned = pending_job();
        store.insert(&orphaned).await.unwrap();

        let rearmed_once = pending_job();
        store.insert(&rearmed_once).await.unwrap();
        store.claim(rearmed_once.id).await.unwrap().unwrap();
        store.rearm_stuck(Duration::zero(), 10).await.unwrap();

        let stale = store.stale_pending(Duration::zero(), 10).await.unwrap();
        let ids: Vec<_> = stale.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![orphaned.id]);
    }

    #[tokio::test]
    async fn rearm_makes_a_stuck_job_claimable_again() {
        let store = InMemoryJobStore::new();
        let job = pending_job();
        store.insert(&job).await.unwrap();
        store.claim(job.id).await.unwrap().unwrap();

        let rearmed = store.rearm_stuck(Duration::zero(), 10).await.unwrap();
        assert_eq!(rearmed.len(), 1);
        assert_eq!(rearmed[0].status, JobStatus::Pending);
        assert_eq!(rearmed[0].version, 3);
        assert!(rearmed[0].started_at.is_none());

        let reclaimed = store.claim(job.id).await.unwrap().unwrap();
        assert_eq!(reclaimed.version, 4);
    }
}
