//! `talentforge-jobs` — asynchronous job queue and worker execution engine.
//!
//! ## Design
//!
//! - The **job store** (durable table of job records) is the source of truth;
//!   the **queue transport** is only a work-available signal and may deliver a
//!   message zero, one, or many times.
//! - A worker turns "a message is on the queue" into "exactly one worker owns
//!   this job" with a single atomic conditional write (the claim). Losing the
//!   claim race is the expected dedup path, not an error.
//! - Handlers are pure orchestration over external collaborators; any handler
//!   failure finalizes the job as FAILED with the error captured on the record.
//!   Jobs are never retried automatically; resubmission creates a new job.
//! - A periodic sweep recovers jobs orphaned between insert and publish, and
//!   re-arms jobs whose worker died after claiming.
//!
//! ## Components
//!
//! - [`Job`] / [`JobStatus`] / [`QueueMessage`]: the record and wire types
//! - [`JobStore`]: persistence with conditional (compare-and-swap) transitions
//! - [`QueueTransport`]: durable FIFO list with a bounded blocking pop
//! - [`HandlerRegistry`] / [`JobHandler`]: job-type dispatch
//! - [`JobProducer`]: enqueue-side contract for request handlers
//! - [`JobWorker`]: the poll/claim/dispatch/finalize loop
//! - [`Sweeper`]: orphan recovery

pub mod producer;
pub mod registry;
pub mod store;
pub mod sweeper;
pub mod transport;
pub mod types;
pub mod worker;

pub use producer::{JobProducer, ProducerError};
pub use registry::{HandlerError, HandlerRegistry, JobHandler};
pub use store::{InMemoryJobStore, JobStore, JobStoreError};
pub use sweeper::{SweepReport, Sweeper, SweeperConfig};
pub use transport::{InMemoryTransport, QueueTransport, TransportError};
pub use types::{DomainWrite, Job, JobOutcome, JobStatus, JobStatusView, JobType, QueueMessage};
pub use worker::{JobWorker, WorkerConfig, WorkerHandle};
