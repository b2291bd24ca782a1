//! Periodic recovery of orphaned and stuck jobs.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::store::{JobStore, JobStoreError};
use crate::transport::QueueTransport;
use crate::types::Job;
use crate::worker::WorkerHandle;

/// Sweep configuration.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Pause between sweep passes.
    pub interval: StdDuration,
    /// `Pending` at version 1 older than this is assumed orphaned (the
    /// producer inserted it but the queue push never landed).
    pub pending_after: Duration,
    /// `Processing` with `started_at` older than this is assumed stuck (the
    /// worker died between claim and finalize).
    pub processing_after: Duration,
    /// Max records recovered per category per pass.
    pub batch: usize,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: StdDuration::from_secs(60),
            pending_after: Duration::minutes(5),
            processing_after: Duration::minutes(30),
            batch: 100,
        }
    }
}

/// What a single sweep pass recovered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Orphaned pending jobs whose messages were re-published.
    pub republished: usize,
    /// Stuck processing jobs re-armed to pending and re-published.
    pub rearmed: usize,
}

/// Maintenance pass recovering jobs the happy path lost track of.
///
/// Re-publishing may produce duplicate queue messages for a job that was in
/// fact discoverable; the claim protocol makes those duplicates no-ops.
pub struct Sweeper {
    store: Arc<dyn JobStore>,
    transport: Arc<dyn QueueTransport>,
    config: SweeperConfig,
}

impl Sweeper {
    pub fn new(store: Arc<dyn JobStore>, transport: Arc<dyn QueueTransport>) -> Self {
        Self {
            store,
            transport,
            config: SweeperConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SweeperConfig) -> Self {
        self.config = config;
        self
    }

    /// Spawn the periodic loop as a background task.
    pub fn spawn(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let join = tokio::spawn(async move { self.run(shutdown_rx).await });
        WorkerHandle::new(shutdown_tx, join)
    }

    /// Run sweep passes until a shutdown signal arrives.
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) {
        info!("sweeper started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }

            if let Err(err) = self.sweep().await {
                warn!(error = %err, "sweep pass failed");
            }
        }

        info!("sweeper stopped");
    }

    /// One recovery pass: re-publish orphaned pending jobs, then re-arm and
    /// re-publish stuck processing jobs.
    pub async fn sweep(&self) -> Result<SweepReport, JobStoreError> {
        let mut report = SweepReport::default();

        let orphaned = self
            .store
            .stale_pending(self.config.pending_after, self.config.batch)
            .await?;
        report.republished = self.republish(&orphaned).await;

        let rearmed = self
            .store
            .rearm_stuck(self.config.processing_after, self.config.batch)
            .await?;
        report.rearmed = self.republish(&rearmed).await;

        if report.republished > 0 || report.rearmed > 0 {
            info!(
                republished = report.republished,
                rearmed = report.rearmed,
                "sweep recovered jobs"
            );
        }

        Ok(report)
    }

    async fn republish(&self, jobs: &[Job]) -> usize {
        let mut published = 0;
        for job in jobs {
            match self.transport.push(&job.message()).await {
                Ok(()) => published += 1,
                // Still recoverable: the job stays pending and the next pass
                // picks it up again.
                Err(err) => warn!(job_id = %job.id, error = %err, "sweep re-publish failed"),
            }
        }
        published
    }
}
