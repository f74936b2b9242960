//! Pending index: ids of jobs that may still be claimable, per type.
//!
//! The index is a scan hint. An id in it only says "this job was queued and
//! not canceled when we last looked"; dequeue always re-reads the record before
//! claiming and drops ids whose record says otherwise.

use std::collections::{BTreeSet, HashMap};

use crate::domain::{JobId, JobType};

#[derive(Debug, Default)]
pub struct PendingIndex {
    by_type: HashMap<JobType, BTreeSet<JobId>>,
}

impl PendingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether `id` was new to the index.
    pub fn insert(&mut self, job_type: &JobType, id: JobId) -> bool {
        self.by_type.entry(job_type.clone()).or_default().insert(id)
    }

    pub fn remove(&mut self, job_type: &JobType, id: JobId) {
        if let Some(ids) = self.by_type.get_mut(job_type) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_type.remove(job_type);
            }
        }
    }

    /// Candidate ids across `types`, oldest first.
    pub fn candidates(&self, types: &[JobType]) -> Vec<JobId> {
        let mut ids: Vec<JobId> = types
            .iter()
            .filter_map(|job_type| self.by_type.get(job_type))
            .flatten()
            .copied()
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn len(&self) -> usize {
        self.by_type.values().map(BTreeSet::len).sum()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}
