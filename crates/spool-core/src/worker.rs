//! Worker loop: dequeue, run a handler, finish.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::{JobId, JobType};
use crate::error::{QueueError, Result};
use crate::queue::JobQueue;

/// Pause after a dequeue error other than cancellation.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Runs jobs of one type.
///
/// Handlers get the raw args and decode them as they like. An `Err` is
/// recorded as a failed `JobOutcome`; the job is still finished.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, id: JobId, args: Value) -> std::result::Result<Value, String>;
}

/// The result a worker stores for every job it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub success: bool,
    #[serde(default)]
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobOutcome {
    pub fn success(output: Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: Value::Null,
            error: Some(error.into()),
        }
    }
}

/// Registry of handlers (job_type -> handler).
///
/// Built during initialization, then shared read-only between workers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        job_type: impl Into<JobType>,
        handler: Arc<dyn JobHandler>,
    ) -> Result<()> {
        let job_type = job_type.into();
        if self.handlers.contains_key(&job_type) {
            return Err(QueueError::DuplicateHandler(job_type));
        }
        self.handlers.insert(job_type, handler);
        Ok(())
    }

    pub fn get(&self, job_type: &JobType) -> Option<&Arc<dyn JobHandler>> {
        self.handlers.get(job_type)
    }

    /// Registered types, sorted.
    pub fn types(&self) -> Vec<JobType> {
        let mut types: Vec<JobType> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Worker group handle.
pub struct WorkerGroup {
    shutdown: CancellationToken,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers serving every type in `registry`.
    pub fn spawn(n: usize, queue: Arc<JobQueue>, registry: Arc<HandlerRegistry>) -> Self {
        let shutdown = CancellationToken::new();

        let joins = (0..n)
            .map(|worker_id| {
                let queue = Arc::clone(&queue);
                let registry = Arc::clone(&registry);
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    worker_loop(worker_id, queue, registry, shutdown).await;
                })
            })
            .collect();

        Self { shutdown, joins }
    }

    /// Stop taking new jobs. In-flight handlers run to completion.
    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(e) = join.await {
                warn!(error = %e, "worker task panicked");
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<JobQueue>,
    registry: Arc<HandlerRegistry>,
    shutdown: CancellationToken,
) {
    let types = registry.types();
    let types: Vec<&str> = types.iter().map(JobType::as_str).collect();
    debug!(worker = worker_id, ?types, "worker started");

    // A ready job still wins over cancellation inside dequeue, so check
    // first to stop draining the queue after shutdown.
    while !shutdown.is_cancelled() {
        let record = match queue.dequeue_job(&shutdown, &types).await {
            Ok(record) => record,
            Err(QueueError::Canceled) => break,
            Err(e) => {
                warn!(worker = worker_id, error = %e, "dequeue failed");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(ERROR_BACKOFF) => continue,
                }
            }
        };

        let outcome = match registry.get(&record.job_type) {
            Some(handler) => match handler.handle(record.id, record.args).await {
                Ok(output) => JobOutcome::success(output),
                Err(error) => {
                    warn!(worker = worker_id, job = %record.id, %error, "job failed");
                    JobOutcome::failure(error)
                }
            },
            None => JobOutcome::failure(format!("no handler for job type {}", record.job_type)),
        };

        if let Err(e) = queue.finish_job(record.id, &outcome).await {
            warn!(worker = worker_id, job = %record.id, error = %e, "finish failed");
        }
    }

    debug!(worker = worker_id, "worker stopped");
}
