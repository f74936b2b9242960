//! QueueBuilder - wiring a `JobQueue` together.
//!
//! Validation happens in `open()` before anything touches storage, so a bad
//! configuration fails at startup with a clear error.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::JobQueue;
use crate::config::QueueConfig;
use crate::domain::JobType;
use crate::error::Result;
use crate::impls::FsJobStore;
use crate::ports::{Clock, IdGenerator, JobStore, SystemClock, UlidGenerator};

/// Builds a `JobQueue`.
///
/// ```ignore
/// let queue = QueueBuilder::new("/var/lib/spool")
///     .job_types(&["osbuild", "koji-finalize"])
///     .poll_interval(Duration::from_millis(500))
///     .open()
///     .await?;
/// ```
///
/// By default the queue persists to an `FsJobStore` at the configured root,
/// stamps times with `SystemClock` and generates ULID ids. Each of these can be
/// swapped, mostly for tests.
pub struct QueueBuilder {
    config: QueueConfig,
    store: Option<Arc<dyn JobStore>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

impl QueueBuilder {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self::from_config(QueueConfig::new(root))
    }

    pub fn from_config(config: QueueConfig) -> Self {
        Self {
            config,
            store: None,
            clock: None,
            ids: None,
        }
    }

    /// Restrict enqueue to these job types. Empty accepts any type.
    pub fn job_types(mut self, job_types: &[&str]) -> Self {
        self.config = self.config.with_job_types(job_types);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Use this store instead of an `FsJobStore` at the configured root.
    pub fn store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub async fn open(self) -> Result<JobQueue> {
        self.config.validate()?;

        let store = match self.store {
            Some(store) => store,
            None => {
                let store = FsJobStore::open(&self.config.root)?;
                info!(root = %self.config.root.display(), "using filesystem job store");
                Arc::new(store) as Arc<dyn JobStore>
            }
        };
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let ids = self.ids.unwrap_or_else(|| {
            Arc::new(UlidGenerator::new(Arc::clone(&clock))) as Arc<dyn IdGenerator>
        });
        let known_types = self
            .config
            .job_types
            .iter()
            .map(|t| JobType::new(t.as_str()))
            .collect();

        JobQueue::recover(store, clock, ids, known_types, self.config.poll_interval).await
    }
}
