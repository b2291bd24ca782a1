//! Job type registry and the handler contract.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::types::{Job, JobOutcome, JobType};

/// A job-type-specific handler: pure orchestration over external
/// collaborators (object store, text extraction, language model, read-side
/// domain records).
///
/// Handlers must treat language-model output as untrusted: parse defensively
/// and surface parse failures as ordinary errors, never as worker crashes.
/// Returning `Err` finalizes the job as `Failed` with the error string on the
/// record; handlers never leave a job `Processing`.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job type this handler executes.
    fn job_type(&self) -> JobType;

    async fn execute(&self, job: &Job) -> Result<JobOutcome, HandlerError>;
}

/// Handler failure, captured verbatim on the job record.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The input_ref pointed at a record that no longer exists.
    #[error("referenced entity not found: {0}")]
    MissingEntity(String),

    /// An external collaborator (object store, extractor, model backend)
    /// failed or timed out.
    #[error("collaborator call failed: {0}")]
    Collaborator(String),

    /// The model returned output that could not be coerced into the expected
    /// shape.
    #[error("model output rejected: {0}")]
    BadModelOutput(String),

    #[error("{0}")]
    Other(String),
}

impl HandlerError {
    pub fn missing_entity(msg: impl Into<String>) -> Self {
        Self::MissingEntity(msg.into())
    }

    pub fn collaborator(msg: impl Into<String>) -> Self {
        Self::Collaborator(msg.into())
    }

    pub fn bad_model_output(msg: impl Into<String>) -> Self {
        Self::BadModelOutput(msg.into())
    }
}

/// Maps a job type to its handler. Built once at startup, then shared
/// immutably across workers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own job type. Re-registering a type
    /// replaces the previous handler.
    pub fn register<H: JobHandler + 'static>(&mut self, handler: H) {
        self.handlers.insert(handler.job_type(), Arc::new(handler));
    }

    pub fn get(&self, job_type: &JobType) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    pub fn registered_types(&self) -> Vec<JobType> {
        self.handlers.keys().cloned().collect()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("types", &self.registered_types())
            .finish()
    }
}
