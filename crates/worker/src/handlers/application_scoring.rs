//! Application scoring: one resume against one posting, score written back.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use talentforge_ai::backend::{CandidateJob, LlmBackend};
use talentforge_ai::parse::{coerce_json, extract_matches};
use talentforge_ai::reader::DomainReader;
use talentforge_core::ApplicationId;
use talentforge_jobs::registry::{HandlerError, JobHandler};
use talentforge_jobs::types::{DomainWrite, Job, JobOutcome, JobType};

use super::{from_llm, from_parse, from_reader};

/// `application_scoring`: `input_ref` is the application's id. Scores the
/// application's resume against its target posting and writes the score back
/// onto the application. That write rides in the finalize transaction, so
/// scored-but-not-completed (or the reverse) cannot be observed.
pub struct ApplicationScoringHandler {
    reader: Arc<dyn DomainReader>,
    llm: Arc<dyn LlmBackend>,
}

impl ApplicationScoringHandler {
    pub fn new(reader: Arc<dyn DomainReader>, llm: Arc<dyn LlmBackend>) -> Self {
        Self { reader, llm }
    }
}

#[async_trait]
impl JobHandler for ApplicationScoringHandler {
    fn job_type(&self) -> JobType {
        JobType::ApplicationScoring
    }

    async fn execute(&self, job: &Job) -> Result<JobOutcome, HandlerError> {
        let application_id: ApplicationId = job.input_ref.parse().map_err(|_| {
            HandlerError::Other(format!(
                "input_ref is not an application id: {}",
                job.input_ref
            ))
        })?;

        let application = self
            .reader
            .application(application_id)
            .await
            .map_err(from_reader)?
            .ok_or_else(|| HandlerError::missing_entity("application not found"))?;

        let resume = self
            .reader
            .resume(application.resume_id)
            .await
            .map_err(from_reader)?
            .ok_or_else(|| HandlerError::missing_entity("resume not found"))?;

        let posting = self
            .reader
            .posting(application.posting_id)
            .await
            .map_err(from_reader)?
            .ok_or_else(|| HandlerError::missing_entity("posting not found"))?;

        // The stored resume is a structured document; the prompt gets its
        // JSON form.
        let resume_text = resume.content.to_string();
        let jd_text = format!(
            "{}\n{}\n{}",
            posting.title,
            posting.description,
            posting.skills.join(", ")
        );

        let candidates = [CandidateJob {
            id: posting.id.to_string(),
            title: posting.title.clone(),
            description: jd_text,
        }];

        let response = self
            .llm
            .rank(&resume_text, &candidates)
            .await
            .map_err(from_llm)?;
        let value = coerce_json(&response.content).map_err(from_parse)?;
        let matches = extract_matches(&value);

        // An empty ranking is a legitimate answer: score zero.
        let score = matches.first().map(|m| m.score).unwrap_or(0);
        // Rank estimate relative to a 0-100 score; real ranking would compare
        // peers.
        let rank = (101 - score).max(1);

        let mut outcome = JobOutcome::new(json!({ "score": score, "analysis": matches }))
            .with_write(DomainWrite::ApplicationScored {
                application_id,
                match_score: score,
                rank,
            });
        outcome.token_usage = response.token_usage;
        outcome.provider = Some(self.llm.provider().to_string());
        Ok(outcome)
    }
}
