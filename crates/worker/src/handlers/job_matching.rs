//! Job matching: resume text ranked against the open postings.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use talentforge_ai::backend::{CandidateJob, LlmBackend};
use talentforge_ai::extract::TextExtractor;
use talentforge_ai::object_store::ObjectStore;
use talentforge_ai::parse::{coerce_json, extract_matches};
use talentforge_ai::reader::DomainReader;
use talentforge_core::FileId;
use talentforge_jobs::registry::{HandlerError, JobHandler};
use talentforge_jobs::types::{Job, JobOutcome, JobType};

use super::{from_extract, from_llm, from_object_store, from_parse, from_reader};

/// How many open postings are offered to the model per run.
const POSTING_LIMIT: usize = 20;

/// `job_matching`: when `input_ref` parses as a file id the resume text comes
/// from that upload; otherwise a placeholder is used (legacy submissions
/// carried an inline payload marker instead of a reference).
pub struct JobMatchingHandler {
    reader: Arc<dyn DomainReader>,
    object_store: Arc<dyn ObjectStore>,
    extractor: Arc<dyn TextExtractor>,
    llm: Arc<dyn LlmBackend>,
}

impl JobMatchingHandler {
    pub fn new(
        reader: Arc<dyn DomainReader>,
        object_store: Arc<dyn ObjectStore>,
        extractor: Arc<dyn TextExtractor>,
        llm: Arc<dyn LlmBackend>,
    ) -> Self {
        Self {
            reader,
            object_store,
            extractor,
            llm,
        }
    }

    async fn resume_text(&self, input_ref: &str) -> Result<String, HandlerError> {
        let Ok(file_id) = input_ref.parse::<FileId>() else {
            return Ok("Placeholder resume text".to_string());
        };

        let file = self
            .reader
            .file(file_id)
            .await
            .map_err(from_reader)?
            .ok_or_else(|| HandlerError::missing_entity("resume file not found"))?;

        let bytes = self
            .object_store
            .get(&file.bucket_path)
            .await
            .map_err(from_object_store)?;

        self.extractor
            .extract(&bytes, &file.original_filename)
            .map_err(from_extract)
    }
}

#[async_trait]
impl JobHandler for JobMatchingHandler {
    fn job_type(&self) -> JobType {
        JobType::JobMatching
    }

    async fn execute(&self, job: &Job) -> Result<JobOutcome, HandlerError> {
        let resume_text = self.resume_text(&job.input_ref).await?;

        let postings = self
            .reader
            .open_postings(POSTING_LIMIT)
            .await
            .map_err(from_reader)?;

        let candidates: Vec<CandidateJob> = postings
            .iter()
            .map(|p| CandidateJob {
                id: p.id.to_string(),
                title: p.title.clone(),
                description: p.description.clone(),
            })
            .collect();

        let response = self
            .llm
            .rank(&resume_text, &candidates)
            .await
            .map_err(from_llm)?;
        let value = coerce_json(&response.content).map_err(from_parse)?;
        let matches = extract_matches(&value);

        let mut outcome = JobOutcome::new(json!({ "matches": matches }));
        outcome.token_usage = response.token_usage;
        outcome.provider = Some(self.llm.provider().to_string());
        Ok(outcome)
    }
}
