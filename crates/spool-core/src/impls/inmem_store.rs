//! InMemoryJobStore - non-durable store for tests and experiments.
//!
//! Same contract as `FsJobStore` minus persistence: records live in a map
//! behind one async mutex, which also makes every `update` atomic.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{JobId, JobRecord};
use crate::error::{QueueError, Result};
use crate::ports::{JobStore, Mutator};

#[derive(Default)]
pub struct InMemoryJobStore {
    records: Mutex<HashMap<JobId, JobRecord>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, record: &JobRecord) -> Result<()> {
        let mut records = self.records.lock().await;
        match records.entry(record.id) {
            Entry::Occupied(_) => Err(QueueError::DuplicateId(record.id)),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn read(&self, id: JobId) -> Result<JobRecord> {
        let records = self.records.lock().await;
        records.get(&id).cloned().ok_or(QueueError::NotFound(id))
    }

    async fn update(&self, id: JobId, mutate: Mutator<'_>) -> Result<JobRecord> {
        let mut records = self.records.lock().await;
        let stored = records.get_mut(&id).ok_or(QueueError::NotFound(id))?;

        // Mutate a copy so a rejected transition leaves the stored record as is.
        let mut record = stored.clone();
        mutate(&mut record)?;
        *stored = record.clone();
        Ok(record)
    }

    async fn list(&self) -> Result<Vec<JobRecord>> {
        let records = self.records.lock().await;
        Ok(records.values().cloned().collect())
    }
}
