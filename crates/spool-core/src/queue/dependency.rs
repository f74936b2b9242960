//! Dependency index: who is waiting for whom.
//!
//! Design:
//! - Forward edges: job -> jobs it depends on
//! - Reverse edges: job -> jobs that depend on it, with their types
//! - Invariant: edges and reverse_edges are kept in sync
//!
//! Dependencies and job types are fixed at enqueue, so the index only holds
//! immutable facts. It never answers "is this job ready"; that question always
//! goes to the store. It answers "which job types may have gained a ready job
//! now that this one finished", so `finish_job` wakes only the waiters that can
//! make use of it.

use std::collections::{HashMap, HashSet};

use crate::domain::{JobId, JobType};

#[derive(Debug, Default)]
pub struct DependencyIndex {
    /// Forward edges: job -> jobs it depends on.
    edges: HashMap<JobId, HashSet<JobId>>,

    /// Reverse edges: job -> jobs waiting for it.
    reverse_edges: HashMap<JobId, HashSet<JobId>>,

    /// Types of the jobs that appear on the waiting side of an edge.
    job_types: HashMap<JobId, JobType>,
}

impl DependencyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `job` (of `job_type`) waits for every id in `depends_on`.
    pub fn add_job(&mut self, job: JobId, job_type: &JobType, depends_on: &[JobId]) {
        if depends_on.is_empty() {
            return;
        }
        self.job_types.insert(job, job_type.clone());
        for &dependency in depends_on {
            self.edges.entry(job).or_default().insert(dependency);
            self.reverse_edges.entry(dependency).or_default().insert(job);
        }
    }

    /// Jobs that list `finished` among their dependencies.
    #[cfg(test)]
    pub fn waiting_jobs(&self, finished: JobId) -> Vec<JobId> {
        self.reverse_edges
            .get(&finished)
            .map(|waiting| waiting.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Distinct types of the jobs waiting for `finished`.
    pub fn waiting_types(&self, finished: JobId) -> Vec<JobType> {
        let mut types: Vec<JobType> = self
            .reverse_edges
            .get(&finished)
            .into_iter()
            .flatten()
            .filter_map(|job| self.job_types.get(job).cloned())
            .collect();
        types.sort();
        types.dedup();
        types
    }

    /// Forget that `job` is waiting; it was claimed or can no longer run.
    ///
    /// Edges pointing at `job` are kept: they are needed when it finishes.
    pub fn remove_waiter(&mut self, job: JobId) {
        self.job_types.remove(&job);
        let Some(dependencies) = self.edges.remove(&job) else {
            return;
        };
        for dependency in dependencies {
            if let Some(waiting) = self.reverse_edges.get_mut(&dependency) {
                waiting.remove(&job);
                if waiting.is_empty() {
                    self.reverse_edges.remove(&dependency);
                }
            }
        }
    }

    /// Drop every edge touching `job`. It has finished, or was canceled
    /// before it ever ran, so it will never wake anyone again.
    pub fn remove_job(&mut self, job: JobId) {
        self.remove_waiter(job);
        if let Some(waiting) = self.reverse_edges.remove(&job) {
            for waiter in waiting {
                if let Some(dependencies) = self.edges.get_mut(&waiter) {
                    dependencies.remove(&job);
                    if dependencies.is_empty() {
                        self.edges.remove(&waiter);
                        self.job_types.remove(&waiter);
                    }
                }
            }
        }
    }

    #[cfg(test)]
    pub fn dependencies(&self, job: JobId) -> Vec<JobId> {
        self.edges
            .get(&job)
            .map(|deps| deps.iter().copied().collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty() && self.reverse_edges.is_empty() && self.job_types.is_empty()
    }
}
