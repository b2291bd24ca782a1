//! Core job record and wire types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use talentforge_core::{ApplicationId, JobId, UserId};

/// Job kind, routed to a registered handler by its string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobType {
    ResumeAnalysis,
    JobMatching,
    ApplicationScoring,
    /// Forward-compatible escape hatch for job types this build does not know.
    Custom(String),
}

impl JobType {
    pub fn as_str(&self) -> &str {
        match self {
            JobType::ResumeAnalysis => "resume_analysis",
            JobType::JobMatching => "job_matching",
            JobType::ApplicationScoring => "application_scoring",
            JobType::Custom(s) => s,
        }
    }
}

impl From<String> for JobType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "resume_analysis" => JobType::ResumeAnalysis,
            "job_matching" => JobType::JobMatching,
            "application_scoring" => JobType::ApplicationScoring,
            _ => JobType::Custom(value),
        }
    }
}

impl From<&str> for JobType {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<JobType> for String {
    fn from(value: JobType) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job execution status.
///
/// The only legal transitions are `Pending -> Processing` (the claim) and
/// `Processing -> Completed | Failed` (the finalize). Terminal states are
/// sealed; a transition attempt against the wrong current status is rejected
/// by the store, never merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit of asynchronous work.
///
/// Created by the producer (always `Pending`, `version = 1`), mutated only by
/// the worker that successfully claimed it, never deleted by this engine.
/// `version` increases by exactly one per accepted transition and is the
/// optimistic-concurrency token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Requesting principal. Authorization is the caller's concern; the
    /// scheduler never looks at this.
    pub owner: UserId,
    pub job_type: JobType,
    pub status: JobStatus,
    /// Opaque reference resolved by the handler (file id, application id, ...).
    pub input_ref: String,
    /// Structured output, present only once `Completed`.
    pub result: Option<JsonValue>,
    /// Human-readable failure description, present only once `Failed`.
    pub error: Option<String>,
    pub version: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Model accounting metadata, recorded on successful finalize.
    pub token_usage: Option<i64>,
    pub provider: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(owner: UserId, job_type: JobType, input_ref: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            owner,
            job_type,
            status: JobStatus::Pending,
            input_ref: input_ref.into(),
            result: None,
            error: None,
            version: 1,
            started_at: None,
            finished_at: None,
            token_usage: None,
            provider: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The lightweight pointer pushed onto the queue transport.
    pub fn message(&self) -> QueueMessage {
        QueueMessage {
            job_id: self.id,
            job_type: self.job_type.clone(),
            input_ref: self.input_ref.clone(),
        }
    }

    /// Mark the job claimed by a worker. Stores apply this only under their
    /// atomic conditional-write primitive.
    pub fn mark_processing(&mut self) {
        let now = Utc::now();
        self.status = JobStatus::Processing;
        self.version += 1;
        self.started_at = Some(now);
        self.updated_at = now;
    }

    /// Mark the job completed with its structured result.
    pub fn mark_completed(&mut self, outcome: JobOutcome) {
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.version += 1;
        self.result = Some(outcome.result);
        self.error = None;
        self.token_usage = outcome.token_usage;
        self.provider = outcome.provider;
        self.finished_at = Some(now);
        self.updated_at = now;
    }

    /// Mark the job failed with a display-ready error string.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        let now = Utc::now();
        self.status = JobStatus::Failed;
        self.version += 1;
        self.error = Some(error.into());
        self.finished_at = Some(now);
        self.updated_at = now;
    }
}

/// Ephemeral work-available signal. Not authoritative: loss or duplication is
/// tolerated because the job store remains the source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub job_id: JobId,
    pub job_type: JobType,
    pub input_ref: String,
}

/// What a poller sees: always one of the four statuses, with the result or
/// error attached once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusView {
    pub id: JobId,
    pub job_type: JobType,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            job_type: job.job_type.clone(),
            status: job.status,
            result: job.result.clone(),
            error: job.error.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// Successful handler output, applied by the store at finalize time.
///
/// Domain writes ride in the same store transaction as the finalize
/// transition, so a side effect is never observed without its job ending
/// `Completed` (and vice versa).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    pub result: JsonValue,
    pub token_usage: Option<i64>,
    pub provider: Option<String>,
    pub writes: Vec<DomainWrite>,
}

impl JobOutcome {
    pub fn new(result: JsonValue) -> Self {
        Self {
            result,
            token_usage: None,
            provider: None,
            writes: Vec::new(),
        }
    }

    pub fn with_usage(mut self, token_usage: i64, provider: impl Into<String>) -> Self {
        self.token_usage = Some(token_usage);
        self.provider = Some(provider.into());
        self
    }

    pub fn with_write(mut self, write: DomainWrite) -> Self {
        self.writes.push(write);
        self
    }
}

/// A write onto a related domain record, committed atomically with the
/// finalize transition of the job that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DomainWrite {
    /// Persist a computed match score and rank onto an application record and
    /// advance its processing state.
    ApplicationScored {
        application_id: ApplicationId,
        match_score: i64,
        rank: i64,
    },
}
