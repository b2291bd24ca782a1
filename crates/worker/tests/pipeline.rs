//! Black-box pipeline tests: producer -> transport -> worker -> store, with
//! mocked AI collaborators.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use talentforge_ai::backend::{CandidateJob, LlmBackend, LlmError, LlmResponse};
use talentforge_ai::extract::PlainTextExtractor;
use talentforge_ai::object_store::{ObjectMetadata, ObjectStore, ObjectStoreError};
use talentforge_ai::reader::{
    ApplicationSnapshot, DomainReader, PostingSnapshot, ReaderError, ResumeSnapshot,
    StoredFileSnapshot,
};
use talentforge_core::{ApplicationId, FileId, PostingId, ResumeId, UserId};
use talentforge_jobs::{
    DomainWrite, HandlerRegistry, InMemoryJobStore, InMemoryTransport, Job, JobProducer,
    JobStatus, JobStore, JobType, JobWorker, QueueTransport, Sweeper, SweeperConfig,
    WorkerConfig,
};
use talentforge_worker::handlers::{
    ApplicationScoringHandler, JobMatchingHandler, ResumeAnalysisHandler,
};

#[derive(Default)]
struct MockReader {
    files: HashMap<FileId, StoredFileSnapshot>,
    applications: HashMap<ApplicationId, ApplicationSnapshot>,
    resumes: HashMap<ResumeId, ResumeSnapshot>,
    postings: HashMap<PostingId, PostingSnapshot>,
}

#[async_trait]
impl DomainReader for MockReader {
    async fn file(&self, id: FileId) -> Result<Option<StoredFileSnapshot>, ReaderError> {
        Ok(self.files.get(&id).cloned())
    }

    async fn application(
        &self,
        id: ApplicationId,
    ) -> Result<Option<ApplicationSnapshot>, ReaderError> {
        Ok(self.applications.get(&id).cloned())
    }

    async fn resume(&self, id: ResumeId) -> Result<Option<ResumeSnapshot>, ReaderError> {
        Ok(self.resumes.get(&id).cloned())
    }

    async fn posting(&self, id: PostingId) -> Result<Option<PostingSnapshot>, ReaderError> {
        Ok(self.postings.get(&id).cloned())
    }

    async fn open_postings(&self, limit: usize) -> Result<Vec<PostingSnapshot>, ReaderError> {
        Ok(self.postings.values().take(limit).cloned().collect())
    }
}

#[derive(Default)]
struct MockObjectStore {
    objects: std::sync::Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn put(
        &self,
        bytes: &[u8],
        metadata: ObjectMetadata,
    ) -> Result<String, ObjectStoreError> {
        let path = format!("bucket/{}", metadata.filename);
        self.objects
            .lock()
            .unwrap()
            .insert(path.clone(), bytes.to_vec());
        Ok(path)
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, ObjectStoreError> {
        self.objects
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| ObjectStoreError::NotFound(path.to_string()))
    }

    async fn sign(&self, path: &str) -> Result<String, ObjectStoreError> {
        Ok(format!("https://signed.example/{path}"))
    }
}

struct MockLlm {
    analyze_response: String,
    rank_response: String,
    calls: AtomicUsize,
}

impl MockLlm {
    fn new(analyze_response: &str, rank_response: &str) -> Self {
        Self {
            analyze_response: analyze_response.to_string(),
            rank_response: rank_response.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmBackend for MockLlm {
    async fn analyze(
        &self,
        _resume_text: &str,
        _job_description: &str,
    ) -> Result<LlmResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(LlmResponse::new(self.analyze_response.clone()).with_usage(1_234))
    }

    async fn rank(
        &self,
        _resume_text: &str,
        _candidates: &[CandidateJob],
    ) -> Result<LlmResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(LlmResponse::new(self.rank_response.clone()).with_usage(777))
    }

    fn provider(&self) -> &str {
        "mock-model"
    }
}

struct Pipeline {
    store: Arc<InMemoryJobStore>,
    transport: Arc<InMemoryTransport>,
    producer: JobProducer,
    llm: Arc<MockLlm>,
    registry: Arc<HandlerRegistry>,
}

async fn pipeline_with(reader: MockReader, object_store: MockObjectStore, llm: MockLlm) -> Pipeline {
    let store = Arc::new(InMemoryJobStore::new());
    let transport = Arc::new(InMemoryTransport::new());
    let producer = JobProducer::new(store.clone(), transport.clone());

    let reader: Arc<dyn DomainReader> = Arc::new(reader);
    let object_store: Arc<dyn ObjectStore> = Arc::new(object_store);
    let extractor = Arc::new(PlainTextExtractor);
    let llm = Arc::new(llm);

    let mut registry = HandlerRegistry::new();
    registry.register(ResumeAnalysisHandler::new(
        reader.clone(),
        object_store.clone(),
        extractor.clone(),
        llm.clone(),
    ));
    registry.register(JobMatchingHandler::new(
        reader.clone(),
        object_store.clone(),
        extractor.clone(),
        llm.clone(),
    ));
    registry.register(ApplicationScoringHandler::new(reader.clone(), llm.clone()));

    Pipeline {
        store,
        transport,
        producer,
        llm,
        registry: Arc::new(registry),
    }
}

fn spawn_worker(p: &Pipeline) -> talentforge_jobs::WorkerHandle {
    JobWorker::new(p.store.clone(), p.transport.clone(), p.registry.clone())
        .with_config(WorkerConfig {
            poll_timeout: Duration::from_millis(20),
            idle_sleep: Duration::from_millis(5),
            handler_timeout: Duration::from_millis(500),
            ..WorkerConfig::default()
        })
        .spawn()
}

async fn wait_terminal(store: &InMemoryJobStore, job: &Job) -> Job {
    for _ in 0..200 {
        let current = store.fetch(job.id).await.unwrap().unwrap();
        if current.status.is_terminal() {
            return current;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job never reached a terminal status");
}

/// Reader + object store pre-loaded with one plain-text resume upload.
fn seeded_file() -> (MockReader, MockObjectStore, FileId) {
    let file_id = FileId::new();
    let mut reader = MockReader::default();
    reader.files.insert(
        file_id,
        StoredFileSnapshot {
            id: file_id,
            owner: UserId::new(),
            original_filename: "resume.txt".to_string(),
            content_type: "text/plain".to_string(),
            bucket_path: "bucket/resume.txt".to_string(),
            created_at: chrono::Utc::now(),
        },
    );

    let object_store = MockObjectStore::default();
    object_store.objects.lock().unwrap().insert(
        "bucket/resume.txt".to_string(),
        b"Senior Rust engineer, seven years of backend work".to_vec(),
    );

    (reader, object_store, file_id)
}

#[tokio::test]
async fn resume_analysis_runs_pending_to_completed() {
    let (reader, object_store, file_id) = seeded_file();
    let llm = MockLlm::new(
        r#"{"ats_score": {"score": 82, "rationale": "strong"}, "summary": "solid"}"#,
        "[]",
    );
    let p = pipeline_with(reader, object_store, llm).await;

    let job = p
        .producer
        .submit(JobType::ResumeAnalysis, UserId::new(), file_id.to_string())
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.version, 1);

    let handle = spawn_worker(&p);
    let done = wait_terminal(&p.store, &job).await;
    handle.shutdown().await;

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.version, 3);
    assert!(done.started_at.is_some());
    assert!(done.finished_at.is_some());
    assert_eq!(done.result.as_ref().unwrap()["ats_score"]["score"], json!(82));
    assert_eq!(done.token_usage, Some(1_234));
    assert_eq!(done.provider.as_deref(), Some("mock-model"));
    assert!(done.error.is_none());

    let view = p.producer.status(job.id).await.unwrap().unwrap();
    assert_eq!(view.status, JobStatus::Completed);
    assert!(view.result.is_some());
}

#[tokio::test]
async fn duplicated_messages_execute_the_handler_once() {
    let (reader, object_store, file_id) = seeded_file();
    let llm = MockLlm::new(r#"{"summary": "ok"}"#, "[]");
    let p = pipeline_with(reader, object_store, llm).await;

    let job = p
        .producer
        .submit(JobType::ResumeAnalysis, UserId::new(), file_id.to_string())
        .await
        .unwrap();

    // At-least-once transport: the same pointer delivered four times.
    for _ in 0..3 {
        p.transport.push(&job.message()).await.unwrap();
    }

    let handle = spawn_worker(&p);
    let done = wait_terminal(&p.store, &job).await;

    for _ in 0..100 {
        if p.transport.len().await == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    handle.shutdown().await;

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.version, 3);
    assert_eq!(p.llm.calls(), 1);
}

#[tokio::test]
async fn malformed_model_output_fails_the_job_without_requeue() {
    let (reader, object_store, file_id) = seeded_file();
    let llm = MockLlm::new("Sorry, I cannot help with that.", "[]");
    let p = pipeline_with(reader, object_store, llm).await;

    let job = p
        .producer
        .submit(JobType::ResumeAnalysis, UserId::new(), file_id.to_string())
        .await
        .unwrap();

    let handle = spawn_worker(&p);
    let failed = wait_terminal(&p.store, &job).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.shutdown().await;

    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.version, 3);
    assert!(failed.error.as_deref().unwrap().contains("model output rejected"));
    assert!(failed.result.is_none());

    // Never retried automatically: no message was re-queued.
    assert_eq!(p.transport.len().await, 0);
    assert_eq!(p.llm.calls(), 1);
}

#[tokio::test]
async fn missing_referenced_file_fails_the_job() {
    let llm = MockLlm::new(r#"{"summary": "ok"}"#, "[]");
    let p = pipeline_with(MockReader::default(), MockObjectStore::default(), llm).await;

    let job = p
        .producer
        .submit(
            JobType::ResumeAnalysis,
            UserId::new(),
            FileId::new().to_string(),
        )
        .await
        .unwrap();

    let handle = spawn_worker(&p);
    let failed = wait_terminal(&p.store, &job).await;
    handle.shutdown().await;

    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed
        .error
        .as_deref()
        .unwrap()
        .contains("referenced file not found"));
}

#[tokio::test]
async fn orphaned_job_is_recovered_by_the_sweep() {
    let (reader, object_store, file_id) = seeded_file();
    let llm = MockLlm::new(r#"{"summary": "recovered"}"#, "[]");
    let p = pipeline_with(reader, object_store, llm).await;

    // The producer's push never happened: insert the record directly.
    let job = Job::new(UserId::new(), JobType::ResumeAnalysis, file_id.to_string());
    p.store.insert(&job).await.unwrap();
    assert_eq!(p.transport.len().await, 0);

    let sweeper = Sweeper::new(p.store.clone(), p.transport.clone()).with_config(SweeperConfig {
        pending_after: chrono::Duration::zero(),
        processing_after: chrono::Duration::zero(),
        ..SweeperConfig::default()
    });
    let report = sweeper.sweep().await.unwrap();
    assert_eq!(report.republished, 1);

    let handle = spawn_worker(&p);
    let done = wait_terminal(&p.store, &job).await;
    handle.shutdown().await;

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.version, 3);
}

#[tokio::test]
async fn application_scoring_writes_the_score_with_the_finalize() {
    let application_id = ApplicationId::new();
    let resume_id = ResumeId::new();
    let posting_id = PostingId::new();

    let mut reader = MockReader::default();
    reader.applications.insert(
        application_id,
        ApplicationSnapshot {
            id: application_id,
            resume_id,
            posting_id,
        },
    );
    reader.resumes.insert(
        resume_id,
        ResumeSnapshot {
            id: resume_id,
            content: json!({"experience": ["rust", "postgres"]}),
        },
    );
    reader.postings.insert(
        posting_id,
        PostingSnapshot {
            id: posting_id,
            title: "Backend Engineer".to_string(),
            description: "Own the job pipeline".to_string(),
            skills: vec!["rust".to_string(), "redis".to_string()],
        },
    );

    // Fenced output exercises the defensive parse on the scoring path.
    let rank_response = format!(
        "```json\n[{{\"job_id\": \"{posting_id}\", \"match_score\": 85, \"reason\": \"good fit\"}}]\n```"
    );
    let llm = MockLlm::new("{}", &rank_response);
    let p = pipeline_with(reader, MockObjectStore::default(), llm).await;

    let job = p
        .producer
        .submit(
            JobType::ApplicationScoring,
            UserId::new(),
            application_id.to_string(),
        )
        .await
        .unwrap();

    let handle = spawn_worker(&p);
    let done = wait_terminal(&p.store, &job).await;
    handle.shutdown().await;

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.result.as_ref().unwrap()["score"], json!(85));

    let writes = p.store.applied_writes();
    assert_eq!(writes.len(), 1);
    assert!(matches!(
        writes[0],
        DomainWrite::ApplicationScored {
            application_id: id,
            match_score: 85,
            rank: 16,
        } if id == application_id
    ));
}

#[tokio::test]
async fn job_matching_ranks_open_postings() {
    let posting_id = PostingId::new();
    let mut reader = MockReader::default();
    reader.postings.insert(
        posting_id,
        PostingSnapshot {
            id: posting_id,
            title: "Platform Engineer".to_string(),
            description: "Queues and storage".to_string(),
            skills: vec![],
        },
    );

    let rank_response = format!(
        r#"{{"results": [{{"job_id": "{posting_id}", "match_score": 64, "reason": "relevant"}}]}}"#
    );
    let llm = MockLlm::new("{}", &rank_response);
    let p = pipeline_with(reader, MockObjectStore::default(), llm).await;

    // Legacy-style submission: input_ref is not a file id.
    let job = p
        .producer
        .submit(JobType::JobMatching, UserId::new(), "resume_data")
        .await
        .unwrap();

    let handle = spawn_worker(&p);
    let done = wait_terminal(&p.store, &job).await;
    handle.shutdown().await;

    assert_eq!(done.status, JobStatus::Completed);
    let matches = done.result.as_ref().unwrap()["matches"].as_array().unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0]["score"], json!(64));
    assert_eq!(matches[0]["job_id"], json!(posting_id.to_string()));
}
