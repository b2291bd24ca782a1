//! Infrastructure layer: Postgres persistence, Redis transport, external
//! service clients.

pub mod external;
pub mod job_store;
pub mod queue;
pub mod read_model;

pub use external::llm::{LlmConfig, UniversalLlmBackend};
pub use external::object_store::LocalObjectStore;
pub use job_store::postgres::PostgresJobStore;
pub use queue::redis::RedisQueueTransport;
pub use read_model::postgres::PostgresDomainReader;
