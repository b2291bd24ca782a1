//! Enqueue-side contract used by request handlers.

use std::sync::Arc;

use tracing::{instrument, warn};

use talentforge_core::{JobId, UserId};

use crate::store::{JobStore, JobStoreError};
use crate::transport::QueueTransport;
use crate::types::{Job, JobStatusView, JobType};

/// Producer error. Transport failures are deliberately absent: a push failure
/// after a durable insert is accepted (see [`JobProducer::submit`]).
#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
    #[error(transparent)]
    Store(#[from] JobStoreError),
}

/// Creates job records and publishes their work-available signals.
///
/// All asynchronous work goes through here; there is no side channel that
/// fires background tasks without a job record.
#[derive(Clone)]
pub struct JobProducer {
    store: Arc<dyn JobStore>,
    transport: Arc<dyn QueueTransport>,
}

impl JobProducer {
    pub fn new(store: Arc<dyn JobStore>, transport: Arc<dyn QueueTransport>) -> Self {
        Self { store, transport }
    }

    /// Insert a new `Pending` job (version 1), then push its queue message.
    ///
    /// If the push fails after the insert, the job is durably pending but
    /// undiscoverable until the recovery sweep re-publishes it; that bounded
    /// staleness is accepted instead of requiring a distributed transaction
    /// across store and transport, so the submit still succeeds.
    #[instrument(skip(self), fields(job_type = %job_type), err)]
    pub async fn submit(
        &self,
        job_type: JobType,
        owner: UserId,
        input_ref: impl Into<String> + std::fmt::Debug,
    ) -> Result<Job, ProducerError> {
        let job = Job::new(owner, job_type, input_ref);
        self.store.insert(&job).await?;

        if let Err(err) = self.transport.push(&job.message()).await {
            warn!(
                job_id = %job.id,
                error = %err,
                "queue push failed after insert; job stays pending until the sweep re-publishes it"
            );
        }

        Ok(job)
    }

    /// Poll a job's status. `Failed` views always carry a displayable error.
    pub async fn status(&self, job_id: JobId) -> Result<Option<JobStatusView>, ProducerError> {
        let job = self.store.fetch(job_id).await?;
        Ok(job.as_ref().map(JobStatusView::from))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::store::InMemoryJobStore;
    use crate::transport::{InMemoryTransport, TransportError};
    use crate::types::{JobStatus, QueueMessage};

    struct DownTransport;

    #[async_trait]
    impl QueueTransport for DownTransport {
        async fn push(&self, _message: &QueueMessage) -> Result<(), TransportError> {
            Err(TransportError::Unavailable("connection refused".into()))
        }

        async fn pop(
            &self,
            _timeout: Duration,
        ) -> Result<Option<QueueMessage>, TransportError> {
            Err(TransportError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn submit_inserts_and_publishes() {
        let store = Arc::new(InMemoryJobStore::new());
        let transport = Arc::new(InMemoryTransport::new());
        let producer = JobProducer::new(store.clone(), transport.clone());

        let job = producer
            .submit(JobType::ResumeAnalysis, UserId::new(), "file-42")
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.version, 1);

        let msg = transport
            .pop(Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.job_id, job.id);
        assert_eq!(msg.input_ref, "file-42");

        let view = producer.status(job.id).await.unwrap().unwrap();
        assert_eq!(view.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn push_failure_leaves_a_durable_pending_job() {
        let store = Arc::new(InMemoryJobStore::new());
        let producer = JobProducer::new(store.clone(), Arc::new(DownTransport));

        let job = producer
            .submit(JobType::JobMatching, UserId::new(), "file-1")
            .await
            .unwrap();

        let stored = store.fetch(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn status_of_unknown_job_is_none() {
        let producer = JobProducer::new(
            Arc::new(InMemoryJobStore::new()),
            Arc::new(InMemoryTransport::new()),
        );
        assert!(producer.status(JobId::new()).await.unwrap().is_none());
    }
}
