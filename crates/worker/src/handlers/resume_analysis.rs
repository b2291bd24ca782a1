//! Resume analysis: file bytes -> text -> model assessment.

use std::sync::Arc;

use async_trait::async_trait;

use talentforge_ai::backend::LlmBackend;
use talentforge_ai::extract::TextExtractor;
use talentforge_ai::object_store::ObjectStore;
use talentforge_ai::parse::coerce_json;
use talentforge_ai::reader::DomainReader;
use talentforge_core::FileId;
use talentforge_jobs::registry::{HandlerError, JobHandler};
use talentforge_jobs::types::{Job, JobOutcome, JobType};

use super::{from_extract, from_llm, from_object_store, from_parse, from_reader};

/// `resume_analysis`: `input_ref` is the uploaded file's id. Downloads the
/// bytes, extracts text, and asks the model for a structured assessment.
pub struct ResumeAnalysisHandler {
    reader: Arc<dyn DomainReader>,
    object_store: Arc<dyn ObjectStore>,
    extractor: Arc<dyn TextExtractor>,
    llm: Arc<dyn LlmBackend>,
}

impl ResumeAnalysisHandler {
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
}

#[async_trait]
impl JobHandler for ResumeAnalysisHandler {
    fn job_type(&self) -> JobType {
        JobType::ResumeAnalysis
    }

    async fn execute(&self, job: &Job) -> Result<JobOutcome, HandlerError> {
        let file_id: FileId = job
            .input_ref
            .parse()
            .map_err(|_| HandlerError::Other(format!("input_ref is not a file id: {}", job.input_ref)))?;

        let file = self
            .reader
            .file(file_id)
            .await
            .map_err(from_reader)?
            .ok_or_else(|| HandlerError::missing_entity("referenced file not found"))?;

        let bytes = self
            .object_store
            .get(&file.bucket_path)
            .await
            .map_err(from_object_store)?;

        let text = self
            .extractor
            .extract(&bytes, &file.original_filename)
            .map_err(from_extract)?;

        let response = self.llm.analyze(&text, "").await.map_err(from_llm)?;
        let analysis = coerce_json(&response.content).map_err(from_parse)?;

        let mut outcome = JobOutcome::new(analysis);
        outcome.token_usage = response.token_usage;
        outcome.provider = Some(self.llm.provider().to_string());
        Ok(outcome)
    }
}
