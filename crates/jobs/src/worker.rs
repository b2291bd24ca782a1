//! The worker loop: poll, claim, dispatch, finalize.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::registry::{HandlerError, HandlerRegistry};
use crate::store::{JobStore, JobStoreError};
use crate::transport::QueueTransport;
use crate::types::{Job, JobOutcome, QueueMessage};

/// Worker loop configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Name for logging.
    pub name: String,
    /// Bounded blocking-pop timeout; the loop re-checks shutdown between pops.
    pub poll_timeout: Duration,
    /// Pause after an empty pop before polling again.
    pub idle_sleep: Duration,
    /// Upper bound on a single handler invocation. A hung collaborator call
    /// becomes a finalize-failure instead of starving the worker.
    pub handler_timeout: Duration,
    /// Initial backoff after a transport/store connectivity failure; doubles
    /// up to `max_error_backoff`, resets on the next healthy poll.
    pub error_backoff: Duration,
    pub max_error_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "worker".to_string(),
            poll_timeout: Duration::from_secs(5),
            idle_sleep: Duration::from_millis(100),
            handler_timeout: Duration::from_secs(120),
            error_backoff: Duration::from_millis(500),
            max_error_backoff: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }
}

/// Handle to control and join a spawned worker or sweeper task.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub(crate) fn new(shutdown: mpsc::Sender<()>, join: JoinHandle<()>) -> Self {
        Self { shutdown, join }
    }

    /// Request graceful shutdown and wait for the task to stop.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(()).await;
        let _ = self.join.await;
    }
}

/// Single logical consumer of the queue transport.
///
/// Any number of workers may run against the same store and transport; the
/// claim's conditional write makes concurrent claim attempts safe without any
/// in-process locking. The loop never exits on handler failures; only a
/// shutdown signal stops it. Transport and store connectivity failures back
/// off and retry, because a dead worker is a silent availability loss.
pub struct JobWorker {
    store: Arc<dyn JobStore>,
    transport: Arc<dyn QueueTransport>,
    registry: Arc<HandlerRegistry>,
    config: WorkerConfig,
}

impl JobWorker {
    pub fn new(
        store: Arc<dyn JobStore>,
        transport: Arc<dyn QueueTransport>,
        registry: Arc<HandlerRegistry>,
    ) -> Self {
        Self {
            store,
            transport,
            registry,
            config: WorkerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Spawn the loop as a background task.
    pub fn spawn(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let join = tokio::spawn(async move { self.run(shutdown_rx).await });
        WorkerHandle::new(shutdown_tx, join)
    }

    /// Run the loop until a shutdown signal arrives.
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) {
        info!(worker = %self.config.name, "worker started");
        let mut backoff = self.config.error_backoff;

        loop {
            match shutdown.try_recv() {
                Ok(()) | Err(mpsc::error::TryRecvError::Disconnected) => break,
                Err(mpsc::error::TryRecvError::Empty) => {}
            }

            match self.transport.pop(self.config.poll_timeout).await {
                Ok(Some(message)) => {
                    backoff = self.config.error_backoff;
                    if let Err(err) = self.handle_message(message).await {
                        // Store connectivity trouble: back off like a
                        // transport failure. No job was corrupted; the
                        // sweep re-publishes whatever got stranded.
                        error!(worker = %self.config.name, error = %err, "store error while processing message");
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(self.config.max_error_backoff);
                    }
                }
                Ok(None) => {
                    backoff = self.config.error_backoff;
                    tokio::time::sleep(self.config.idle_sleep).await;
                }
                Err(err) => {
                    error!(worker = %self.config.name, error = %err, "queue pop failed");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.config.max_error_backoff);
                }
            }
        }

        info!(worker = %self.config.name, "worker stopped");
    }

    /// Claim, dispatch, finalize. Returns `Err` only for store connectivity
    /// failures; handler failures are converted into the job's own `Failed`
    /// state and a lost claim race is a silent drop.
    async fn handle_message(&self, message: QueueMessage) -> Result<(), JobStoreError> {
        let job = match self.store.claim(message.job_id).await? {
            Some(job) => job,
            None => {
                // Another worker owns it, it already finished, or the record
                // is gone. Dropping the message here is the deduplication.
                debug!(job_id = %message.job_id, "claim lost; dropping message");
                return Ok(());
            }
        };

        let claimed_version = job.version;
        let started = Instant::now();
        let outcome = self.dispatch(&job).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(outcome) => {
                match self
                    .store
                    .finalize_success(job.id, claimed_version, outcome)
                    .await
                {
                    Ok(()) => {
                        info!(
                            worker = %self.config.name,
                            job_id = %job.id,
                            job_type = %job.job_type,
                            duration_ms,
                            "job completed"
                        );
                        Ok(())
                    }
                    Err(JobStoreError::Conflict(reason)) => {
                        // Our claim was revoked mid-flight (stuck-job sweep).
                        // The new owner's result wins; ours is discarded.
                        warn!(job_id = %job.id, reason = %reason, "finalize rejected");
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            Err(handler_err) => {
                let error = handler_err.to_string();
                match self
                    .store
                    .finalize_failure(job.id, claimed_version, &error)
                    .await
                {
                    Ok(()) => {
                        warn!(
                            worker = %self.config.name,
                            job_id = %job.id,
                            job_type = %job.job_type,
                            duration_ms,
                            error = %error,
                            "job failed"
                        );
                        Ok(())
                    }
                    Err(JobStoreError::Conflict(reason)) => {
                        warn!(job_id = %job.id, reason = %reason, "finalize rejected");
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
        }
    }

    async fn dispatch(&self, job: &Job) -> Result<JobOutcome, HandlerError> {
        let handler = self
            .registry
            .get(&job.job_type)
            .ok_or_else(|| HandlerError::Other(format!("unknown job type: {}", job.job_type)))?;

        match tokio::time::timeout(self.config.handler_timeout, handler.execute(job)).await {
            Ok(result) => result,
            Err(_) => Err(HandlerError::collaborator(format!(
                "handler timed out after {:?}",
                self.config.handler_timeout
            ))),
        }
    }
}
