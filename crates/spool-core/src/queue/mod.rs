//! Queue module: the dependency-aware job queue engine.
//!
//! - `JobQueue`: enqueue / dequeue / finish / cancel / status
//! - `QueueBuilder`: validated construction with injectable ports
//! - internal indexes and the dequeue coordinator

mod builder;
mod coordinator;
mod dependency;
mod job_queue;
mod pending;
mod readiness;

pub use builder::QueueBuilder;
pub use job_queue::JobQueue;
