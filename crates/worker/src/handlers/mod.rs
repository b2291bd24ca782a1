//! Job-type handlers: pure orchestration over the AI collaborators.
//!
//! Handlers resolve `input_ref`, call out to the collaborators, coerce the
//! model output, and hand the engine a [`talentforge_jobs::JobOutcome`].
//! They never touch the job record itself; finalization belongs to the
//! worker loop and the store.

mod application_scoring;
mod job_matching;
mod resume_analysis;

pub use application_scoring::ApplicationScoringHandler;
pub use job_matching::JobMatchingHandler;
pub use resume_analysis::ResumeAnalysisHandler;

use talentforge_ai::backend::LlmError;
use talentforge_ai::extract::ExtractError;
use talentforge_ai::object_store::ObjectStoreError;
use talentforge_ai::parse::ParseError;
use talentforge_ai::reader::ReaderError;
use talentforge_jobs::registry::HandlerError;

// Collaborator failures all surface as ordinary handler failures; the worker
// turns them into a FAILED job, never a crash.

pub(crate) fn from_reader(err: ReaderError) -> HandlerError {
    HandlerError::collaborator(err.to_string())
}

pub(crate) fn from_object_store(err: ObjectStoreError) -> HandlerError {
    HandlerError::collaborator(err.to_string())
}

pub(crate) fn from_extract(err: ExtractError) -> HandlerError {
    HandlerError::collaborator(err.to_string())
}

pub(crate) fn from_llm(err: LlmError) -> HandlerError {
    HandlerError::collaborator(err.to_string())
}

pub(crate) fn from_parse(err: ParseError) -> HandlerError {
    HandlerError::bad_model_output(err.to_string())
}
