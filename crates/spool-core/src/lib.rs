//! spool-core
//!
//! A persistent, dependency-aware job queue.
//!
//! # Modules
//! - **domain**: job records, ids, types, states and read-only status views
//! - **ports**: seams for storage, time and id generation (`JobStore`, `Clock`, `IdGenerator`)
//! - **impls**: `FsJobStore` (one JSON file per job) and `InMemoryJobStore`
//! - **queue**: `JobQueue` and `QueueBuilder`
//! - **worker**: handler registry and worker group built on `JobQueue`
//! - **config**: `QueueConfig`, including environment loading
//! - **codec**: encode/decode of opaque args and results
//! - **error**: `QueueError`

pub mod codec;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;
pub mod queue;
pub mod worker;

pub use config::QueueConfig;
pub use domain::{JobId, JobRecord, JobState, JobStatus, JobType, QueueCounts};
pub use error::{QueueError, Result};
pub use queue::{JobQueue, QueueBuilder};
pub use tokio_util::sync::CancellationToken;
pub use worker::{HandlerRegistry, JobHandler, JobOutcome, WorkerGroup};
