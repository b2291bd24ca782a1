//! Language-model backend boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A posting offered to the model for ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateJob {
    pub id: String,
    pub title: String,
    pub description: String,
}

/// Raw model output plus whatever usage accounting the provider reported.
///
/// `content` is untrusted text: it may be malformed, fenced in markdown, or
/// shaped wrong. Callers must run it through [`crate::parse`] and treat
/// rejection as an ordinary handler failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmResponse {
    pub content: String,
    pub token_usage: Option<i64>,
}

impl LlmResponse {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            token_usage: None,
        }
    }

    pub fn with_usage(mut self, token_usage: i64) -> Self {
        self.token_usage = Some(token_usage);
        self
    }
}

/// The model backend. Implementations wrap whatever provider is configured;
/// the engine imposes nothing on them beyond "text in, text out, may fail".
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Analyze a resume (optionally against a target job description).
    async fn analyze(
        &self,
        resume_text: &str,
        job_description: &str,
    ) -> Result<LlmResponse, LlmError>;

    /// Rank candidate postings for a resume.
    async fn rank(
        &self,
        resume_text: &str,
        candidates: &[CandidateJob],
    ) -> Result<LlmResponse, LlmError>;

    /// Provider label for accounting (e.g. the configured model name).
    fn provider(&self) -> &str;
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("model backend unreachable: {0}")]
    Unreachable(String),

    #[error("model request rejected: {0}")]
    Rejected(String),

    #[error("model response unreadable: {0}")]
    BadResponse(String),
}
