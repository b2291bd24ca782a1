use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;

use talentforge_ai::extract::PlainTextExtractor;
use talentforge_infra::{
    LlmConfig, LocalObjectStore, PostgresDomainReader, PostgresJobStore, RedisQueueTransport,
    UniversalLlmBackend,
};
use talentforge_jobs::{
    HandlerRegistry, JobWorker, Sweeper, SweeperConfig, WorkerConfig,
};
use talentforge_worker::handlers::{
    ApplicationScoringHandler, JobMatchingHandler, ResumeAnalysisHandler,
};
use talentforge_worker::WorkerProcessConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    talentforge_observability::init();

    let config = WorkerProcessConfig::from_env()?;

    // Client handles: constructed here, injected everywhere, closed on the
    // way out.
    let pool = PgPoolOptions::new()
        .max_connections(config.worker_count as u32 + 2)
        .connect(&config.database_url)
        .await?;

    let store = Arc::new(PostgresJobStore::new(pool.clone()));
    let transport = Arc::new(RedisQueueTransport::new(
        &config.redis_url,
        config.queue_key.clone(),
    )?);
    let reader = Arc::new(PostgresDomainReader::new(pool.clone()));
    let object_store = Arc::new(LocalObjectStore::new(&config.storage_root)?);
    let extractor = Arc::new(PlainTextExtractor);
    let llm = Arc::new(UniversalLlmBackend::new(LlmConfig::new(
        &config.llm_base_url,
        &config.llm_api_key,
        &config.llm_model,
    ))?);

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
    let registry = Arc::new(registry);

    let mut handles = Vec::with_capacity(config.worker_count + 1);
    for i in 0..config.worker_count {
        let worker_config = WorkerConfig::default()
            .with_name(format!("worker-{i}"))
            .with_handler_timeout(config.handler_timeout);
        let worker = JobWorker::new(store.clone(), transport.clone(), registry.clone())
            .with_config(WorkerConfig {
                poll_timeout: config.poll_timeout,
                ..worker_config
            });
        handles.push(worker.spawn());
    }

    handles.push(
        Sweeper::new(store.clone(), transport.clone())
            .with_config(SweeperConfig {
                interval: config.sweep_interval,
                pending_after: config.sweep_pending_after,
                processing_after: config.sweep_processing_after,
                ..SweeperConfig::default()
            })
            .spawn(),
    );

    tracing::info!(
        workers = config.worker_count,
        "talentforge worker process started"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    for handle in handles {
        handle.shutdown().await;
    }
    pool.close().await;

    Ok(())
}
