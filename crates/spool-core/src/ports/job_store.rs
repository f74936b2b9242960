//! JobStore port - the source of truth for job records.
//!
//! The queue never caches job state across operations: every transition goes
//! through `update`, which reads the current record, lets the caller validate
//! and mutate it, and writes it back atomically.

use async_trait::async_trait;

use crate::domain::{JobId, JobRecord, JobType};
use crate::error::Result;

/// A state transition applied under the record's lock.
///
/// Returning an error aborts the update; nothing is written.
pub type Mutator<'a> = &'a (dyn Fn(&mut JobRecord) -> Result<()> + Send + Sync);

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new record. Fails with `DuplicateId` if the id is taken.
    async fn create(&self, record: &JobRecord) -> Result<()>;

    /// Fails with `NotFound` for unknown ids.
    async fn read(&self, id: JobId) -> Result<JobRecord>;

    /// Read-validate-write one record. Returns the record as written.
    async fn update(&self, id: JobId, mutate: Mutator<'_>) -> Result<JobRecord>;

    /// Every record in the store, in no particular order.
    async fn list(&self) -> Result<Vec<JobRecord>>;

    /// Queued, non-canceled records whose type is in `types`, oldest id first.
    async fn list_candidates(&self, types: &[JobType]) -> Result<Vec<JobRecord>> {
        let mut candidates: Vec<JobRecord> = self
            .list()
            .await?
            .into_iter()
            .filter(|record| record.is_claimable() && types.contains(&record.job_type))
            .collect();
        candidates.sort_by_key(|record| record.id);
        Ok(candidates)
    }
}
