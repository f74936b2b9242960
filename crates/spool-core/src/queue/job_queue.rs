//! JobQueue - the public queue engine.
//!
//! Design:
//! - The `JobStore` is the only source of truth. Every transition is a
//!   read-validate-write through `JobStore::update`.
//! - `PendingIndex` and `DependencyIndex` hold immutable facts (ids, types,
//!   dependency edges). They narrow scans and target wakes, nothing more.
//! - Blocked dequeuers park on the `Coordinator`; enqueue and finish wake them
//!   after the durable write has committed.
//! - Other handles on the same root never wake this one. Dequeue merges the
//!   store's claimable records into the indexes when it starts and on every
//!   poll tick, so their jobs are picked up within one `poll_interval`.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::QueueBuilder;
use super::coordinator::Coordinator;
use super::dependency::DependencyIndex;
use super::pending::PendingIndex;
use super::readiness::{is_ready, matches_types};
use crate::codec;
use crate::domain::{JobId, JobRecord, JobStatus, JobType, QueueCounts};
use crate::error::{QueueError, Result};
use crate::ports::{Clock, IdGenerator, JobStore};

pub struct JobQueue {
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    known_types: HashSet<JobType>,
    poll_interval: Duration,
    coordinator: Coordinator,
    pending: Mutex<PendingIndex>,
    dependencies: Mutex<DependencyIndex>,
}

impl JobQueue {
    /// Open a filesystem-backed queue rooted at `root`.
    ///
    /// `known_types` lists the job types this queue accepts. An empty list
    /// accepts any type.
    pub async fn open(root: impl AsRef<Path>, known_types: &[&str]) -> Result<Self> {
        QueueBuilder::new(root.as_ref())
            .job_types(known_types)
            .open()
            .await
    }

    /// Build a queue over `store`, rebuilding the in-memory indexes from it.
    pub(crate) async fn recover(
        store: Arc<dyn JobStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        known_types: HashSet<JobType>,
        poll_interval: Duration,
    ) -> Result<Self> {
        let records = store.list().await?;

        let mut pending = PendingIndex::new();
        let mut dependencies = DependencyIndex::new();
        for record in &records {
            if record.is_claimable() {
                pending.insert(&record.job_type, record.id);
            }
            if !record.is_finished() {
                dependencies.add_job(record.id, &record.job_type, &record.dependencies);
            }
        }

        info!(
            jobs = records.len(),
            pending = pending.len(),
            "job queue opened"
        );

        Ok(Self {
            store,
            clock,
            ids,
            known_types,
            poll_interval,
            coordinator: Coordinator::new(),
            pending: Mutex::new(pending),
            dependencies: Mutex::new(dependencies),
        })
    }

    /// Create a new QUEUED job and return its id.
    ///
    /// `args` is serialized before anything else happens, so a value that
    /// cannot be serialized allocates no id. Every dependency must already
    /// exist in the store.
    pub async fn enqueue<A: Serialize + ?Sized>(
        &self,
        job_type: &str,
        args: &A,
        dependencies: &[JobId],
    ) -> Result<JobId> {
        let args = codec::encode(args)?;

        let job_type = JobType::new(job_type);
        if job_type.is_empty()
            || (!self.known_types.is_empty() && !self.known_types.contains(&job_type))
        {
            return Err(QueueError::UnknownJobType(job_type));
        }

        let mut seen = HashSet::new();
        let dependencies: Vec<JobId> = dependencies
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();
        for &dependency in &dependencies {
            match self.store.read(dependency).await {
                Ok(_) => {}
                Err(QueueError::NotFound(_)) => {
                    return Err(QueueError::UnknownDependency(dependency));
                }
                Err(e) => return Err(e),
            }
        }

        let id = self.ids.generate_job_id();
        let record = JobRecord::new(id, job_type, args, dependencies, self.clock.now());
        self.store.create(&record).await?;

        self.dependencies_index()
            .add_job(id, &record.job_type, &record.dependencies);
        self.pending_index().insert(&record.job_type, id);
        self.coordinator.wake(&record.job_type);

        debug!(
            job = %id,
            job_type = %record.job_type,
            dependencies = record.dependencies.len(),
            "job enqueued"
        );
        Ok(id)
    }

    /// Claim a ready job of one of `types`, waiting until one appears.
    ///
    /// Returns `Canceled` once `cancel` fires and no ready job could be
    /// claimed. A job that can be claimed when cancellation is observed is
    /// still returned. Arguments are decoded before the claim commits, so a
    /// job whose args do not fit `A` stays QUEUED.
    pub async fn dequeue<A: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        types: &[&str],
    ) -> Result<(JobId, A)> {
        let (record, args) = self.claim(cancel, types).await?;
        Ok((record.id, args))
    }

    /// Like `dequeue`, but hands back the claimed record with raw args.
    pub async fn dequeue_job(
        &self,
        cancel: &CancellationToken,
        types: &[&str],
    ) -> Result<JobRecord> {
        let (record, _) = self.claim::<Value>(cancel, types).await?;
        Ok(record)
    }

    async fn claim<A: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        types: &[&str],
    ) -> Result<(JobRecord, A)> {
        let types = requested_types(types);
        if types.is_empty() {
            return Err(QueueError::NoJobTypes);
        }

        // Register before the first scan; a wake landing between scan and
        // sleep leaves a permit behind.
        let registration = self.coordinator.register(&types);

        let mut sync_store = true;
        loop {
            if let Some(claimed) = self.try_claim(&types).await? {
                return Ok(claimed);
            }
            if sync_store && self.sync_pending(&types).await? > 0 {
                if let Some(claimed) = self.try_claim(&types).await? {
                    return Ok(claimed);
                }
            }
            if cancel.is_cancelled() {
                return Err(QueueError::Canceled);
            }

            // A local wake means the indexes already know the job.
            sync_store = tokio::select! {
                biased;
                _ = registration.notified() => false,
                _ = cancel.cancelled() => true,
                _ = tokio::time::sleep(self.poll_interval) => true,
            };
        }
    }

    /// Index claimable jobs of `types` that this handle has not seen yet,
    /// typically ones enqueued through another handle. Returns how many
    /// were added.
    async fn sync_pending(&self, types: &[JobType]) -> Result<usize> {
        let records = self.store.list_candidates(types).await?;

        let mut added = Vec::new();
        {
            let mut pending = self.pending_index();
            for record in &records {
                if pending.insert(&record.job_type, record.id) {
                    added.push(record);
                }
            }
        }
        if !added.is_empty() {
            let mut dependencies = self.dependencies_index();
            for record in &added {
                dependencies.add_job(record.id, &record.job_type, &record.dependencies);
            }
            debug!(jobs = added.len(), "indexed jobs from store");
        }
        Ok(added.len())
    }

    /// One pass over the pending candidates of `types`, oldest first.
    ///
    /// A ready job whose args do not decode as `A` is skipped, so it does not
    /// block younger jobs. If nothing else could be claimed, the first decode
    /// error is returned.
    async fn try_claim<A: DeserializeOwned>(
        &self,
        types: &[JobType],
    ) -> Result<Option<(JobRecord, A)>> {
        let candidates = self.pending_index().candidates(types);
        let mut undecodable = None;

        for id in candidates {
            let record = match self.store.read(id).await {
                Ok(record) => record,
                Err(QueueError::NotFound(_)) => {
                    self.forget(types, id);
                    continue;
                }
                Err(e @ QueueError::CorruptRecord { .. }) => {
                    warn!(job = %id, error = %e, "skipping unreadable job");
                    self.forget(types, id);
                    continue;
                }
                Err(e) => return Err(e),
            };

            if !record.is_claimable() || !matches_types(&record, types) {
                self.pending_index().remove(&record.job_type, id);
                if !record.is_claimable() {
                    self.dependencies_index().remove_waiter(id);
                }
                continue;
            }
            if !is_ready(&record, self.store.as_ref()).await? {
                continue;
            }

            let args: A = match codec::decode(&record.args) {
                Ok(args) => args,
                Err(e) => {
                    warn!(job = %id, error = %e, "job args do not fit the requested type");
                    undecodable.get_or_insert(e);
                    continue;
                }
            };

            let now = self.clock.now();
            match self.store.update(id, &|r| r.start(now)).await {
                Ok(claimed) => {
                    self.pending_index().remove(&claimed.job_type, id);
                    self.dependencies_index().remove_waiter(id);
                    debug!(job = %id, job_type = %claimed.job_type, "job dequeued");
                    return Ok(Some((claimed, args)));
                }
                // Someone else claimed or canceled it first.
                Err(QueueError::NotQueued(_)) => {
                    self.pending_index().remove(&record.job_type, id);
                    self.dependencies_index().remove_waiter(id);
                }
                Err(e) => return Err(e),
            }
        }

        match undecodable {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    /// Record `result` for a RUNNING job and mark it FINISHED.
    ///
    /// A job canceled while running can still be finished.
    pub async fn finish_job<R: Serialize + ?Sized>(&self, id: JobId, result: &R) -> Result<()> {
        let result = codec::encode(result)?;
        let now = self.clock.now();

        let record = self
            .store
            .update(id, &|r| r.finish(now, result.clone()))
            .await?;

        let waiting = {
            let mut dependencies = self.dependencies_index();
            let waiting = dependencies.waiting_types(id);
            dependencies.remove_job(id);
            waiting
        };
        for job_type in &waiting {
            self.coordinator.wake(job_type);
        }

        debug!(
            job = %id,
            job_type = %record.job_type,
            canceled = record.canceled,
            woken_types = waiting.len(),
            "job finished"
        );
        Ok(())
    }

    /// Set the canceled flag on an unfinished job.
    ///
    /// Canceling a finished job is a no-op. A RUNNING job keeps running; the
    /// flag only stops a QUEUED job from being dequeued.
    pub async fn cancel_job(&self, id: JobId) -> Result<()> {
        if self.store.read(id).await?.is_finished() {
            debug!(job = %id, "cancel ignored, job already finished");
            return Ok(());
        }

        let record = self
            .store
            .update(id, &|r| {
                r.cancel();
                Ok(())
            })
            .await?;

        if record.started_at.is_none() {
            self.pending_index().remove(&record.job_type, id);
            self.dependencies_index().remove_job(id);
        }

        debug!(job = %id, state = %record.state(), canceled = record.canceled, "job canceled");
        Ok(())
    }

    pub async fn job_status(&self, id: JobId) -> Result<JobStatus> {
        self.store.read(id).await.map(JobStatus::from)
    }

    /// The full stored record for `id`.
    pub async fn job(&self, id: JobId) -> Result<JobRecord> {
        self.store.read(id).await
    }

    pub async fn counts(&self) -> Result<QueueCounts> {
        let records = self.store.list().await?;
        Ok(QueueCounts::tally(&records))
    }

    fn forget(&self, types: &[JobType], id: JobId) {
        let mut pending = self.pending_index();
        for job_type in types {
            pending.remove(job_type, id);
        }
    }

    fn pending_index(&self) -> MutexGuard<'_, PendingIndex> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn dependencies_index(&self) -> MutexGuard<'_, DependencyIndex> {
        self.dependencies.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Trimmed, non-empty, deduplicated types in request order.
fn requested_types(types: &[&str]) -> Vec<JobType> {
    let mut requested: Vec<JobType> = Vec::with_capacity(types.len());
    for name in types {
        let job_type = JobType::new(name.trim());
        if !job_type.is_empty() && !requested.contains(&job_type) {
            requested.push(job_type);
        }
    }
    requested
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::tests::Unserializable;
    use crate::impls::InMemoryJobStore;
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    async fn queue(known_types: &[&str]) -> JobQueue {
        QueueBuilder::new("/unused")
            .store(Arc::new(InMemoryJobStore::new()))
            .job_types(known_types)
            .poll_interval(Duration::from_millis(50))
            .open()
            .await
            .unwrap()
    }

    #[test]
    fn requested_types_are_trimmed_and_deduplicated() {
        let types = requested_types(&["fish", " fish ", "", "octopus", "fish"]);
        assert_eq!(types, vec![JobType::new("fish"), JobType::new("octopus")]);
    }

    #[tokio::test]
    async fn unserializable_args_allocate_no_job() {
        let queue = queue(&[]).await;
        let err = queue.enqueue("test", &Unserializable, &[]).await.unwrap_err();
        assert!(matches!(err, QueueError::Serialization(_)));
        assert_eq!(queue.counts().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn unknown_dependency_creates_no_record() {
        let queue = queue(&[]).await;
        let ghost = JobId::from_ulid(ulid::Ulid::new());
        let err = queue.enqueue("test", "arg0", &[ghost]).await.unwrap_err();
        assert!(matches!(err, QueueError::UnknownDependency(id) if id == ghost));
        assert_eq!(queue.counts().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn known_types_restrict_enqueue() {
        let queue = queue(&["fish"]).await;
        assert!(queue.enqueue("fish", &json!({}), &[]).await.is_ok());
        let err = queue.enqueue("zebra", &json!({}), &[]).await.unwrap_err();
        assert!(matches!(err, QueueError::UnknownJobType(t) if t.as_str() == "zebra"));
    }

    #[tokio::test]
    async fn blank_type_is_rejected() {
        let queue = queue(&[]).await;
        let err = queue.enqueue("  ", &json!({}), &[]).await.unwrap_err();
        assert!(matches!(err, QueueError::UnknownJobType(_)));
    }

    #[tokio::test]
    async fn empty_type_list_fails_immediately() {
        let queue = queue(&[]).await;
        let err = queue
            .dequeue::<Value>(&CancellationToken::new(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::NoJobTypes));
    }

    #[tokio::test]
    async fn duplicate_dependencies_are_collapsed() {
        let queue = queue(&[]).await;
        let dep = queue.enqueue("test", &json!(null), &[]).await.unwrap();
        let id = queue.enqueue("test", &json!(null), &[dep, dep]).await.unwrap();
        assert_eq!(queue.job(id).await.unwrap().dependencies, vec![dep]);
    }

    #[tokio::test]
    async fn args_that_do_not_decode_leave_the_job_queued() {
        let queue = queue(&[]).await;
        let id = queue.enqueue("test", "not a number", &[]).await.unwrap();

        let err = queue
            .dequeue::<u32>(&CancellationToken::new(), &["test"])
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Serialization(_)));
        assert!(queue.job_status(id).await.unwrap().started_at.is_none());

        let (claimed, args): (JobId, String) = queue
            .dequeue(&CancellationToken::new(), &["test"])
            .await
            .unwrap();
        assert_eq!((claimed, args.as_str()), (id, "not a number"));
    }

    #[tokio::test]
    async fn args_that_do_not_decode_do_not_block_younger_jobs() {
        let queue = queue(&[]).await;
        let bad = queue.enqueue("test", "not a number", &[]).await.unwrap();
        let good = queue.enqueue("test", &7u32, &[]).await.unwrap();

        let (claimed, args): (JobId, u32) = queue
            .dequeue(&CancellationToken::new(), &["test"])
            .await
            .unwrap();
        assert_eq!((claimed, args), (good, 7));
        assert!(queue.job_status(bad).await.unwrap().started_at.is_none());
    }

    #[tokio::test]
    async fn finished_chain_leaves_the_indexes_empty() {
        let queue = queue(&[]).await;
        let first = queue.enqueue("test", &json!(1), &[]).await.unwrap();
        let second = queue.enqueue("test", &json!(2), &[first]).await.unwrap();
        let third = queue.enqueue("test", &json!(3), &[first, second]).await.unwrap();

        for expected in [first, second, third] {
            let record = queue
                .dequeue_job(&CancellationToken::new(), &["test"])
                .await
                .unwrap();
            assert_eq!(record.id, expected);
            queue.finish_job(record.id, &json!(null)).await.unwrap();
        }

        assert!(queue.pending_index().is_empty());
        assert!(queue.dependencies_index().is_empty());
    }

    #[tokio::test]
    async fn jobs_written_by_another_handle_are_indexed_on_dequeue() {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let open = || {
            QueueBuilder::new("/unused")
                .store(Arc::clone(&store))
                .poll_interval(Duration::from_millis(20))
                .open()
        };
        let worker = open().await.unwrap();
        let producer = open().await.unwrap();

        let dep = producer.enqueue("build", &json!(null), &[]).await.unwrap();
        let waiting = producer.enqueue("upload", &json!(null), &[dep]).await.unwrap();
        assert_eq!(worker.pending_index().len(), 0);

        let record = worker
            .dequeue_job(&CancellationToken::new(), &["build", "upload"])
            .await
            .unwrap();
        assert_eq!(record.id, dep);
        assert_eq!(worker.pending_index().len(), 1);
        assert_eq!(worker.dependencies_index().waiting_jobs(dep), vec![waiting]);
    }

    #[tokio::test]
    async fn ready_job_wins_over_an_already_canceled_token() {
        let queue = queue(&[]).await;
        let id = queue.enqueue("test", &json!(1), &[]).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let (claimed, _): (JobId, Value) = queue.dequeue(&cancel, &["test"]).await.unwrap();
        assert_eq!(claimed, id);
    }

    #[tokio::test]
    async fn canceled_queued_job_is_never_dispatched() {
        let queue = queue(&[]).await;
        let id = queue.enqueue("test", &json!(null), &[]).await.unwrap();
        queue.cancel_job(id).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = queue
            .dequeue::<Value>(&cancel, &["test"])
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Canceled));

        let err = queue.finish_job(id, &json!(null)).await.unwrap_err();
        assert!(matches!(err, QueueError::NotRunning(_)));
    }

    #[tokio::test]
    async fn dequeue_job_returns_the_claimed_record() {
        let queue = queue(&[]).await;
        let id = queue.enqueue("fish", &json!({"fins": 2}), &[]).await.unwrap();

        let record = queue
            .dequeue_job(&CancellationToken::new(), &["fish"])
            .await
            .unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.job_type.as_str(), "fish");
        assert_eq!(record.args, json!({"fins": 2}));
        assert!(record.started_at.is_some());
    }

    #[tokio::test]
    async fn timestamps_come_from_the_clock() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::new(t0));
        let queue = QueueBuilder::new("/unused")
            .store(Arc::new(InMemoryJobStore::new()))
            .clock(clock.clone())
            .open()
            .await
            .unwrap();

        let id = queue.enqueue("test", &json!(null), &[]).await.unwrap();
        clock.advance(chrono::Duration::seconds(5));
        let _: (JobId, Value) = queue
            .dequeue(&CancellationToken::new(), &["test"])
            .await
            .unwrap();
        clock.advance(chrono::Duration::seconds(5));
        queue.finish_job(id, &json!("done")).await.unwrap();

        let status = queue.job_status(id).await.unwrap();
        assert_eq!(status.queued_at, t0);
        assert_eq!(status.started_at, Some(t0 + chrono::Duration::seconds(5)));
        assert_eq!(status.finished_at, Some(t0 + chrono::Duration::seconds(10)));
        assert_eq!(status.result::<String>().unwrap().as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn recover_rebuilds_pending_and_dependency_indexes() {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let first = QueueBuilder::new("/unused")
            .store(Arc::clone(&store))
            .open()
            .await
            .unwrap();
        let dep = first.enqueue("build", &json!(null), &[]).await.unwrap();
        let waiting = first.enqueue("upload", &json!(null), &[dep]).await.unwrap();
        drop(first);

        let second = QueueBuilder::new("/unused")
            .store(store)
            .open()
            .await
            .unwrap();
        assert_eq!(second.pending_index().len(), 2);
        assert_eq!(
            second.dependencies_index().waiting_jobs(dep),
            vec![waiting]
        );
    }
}
