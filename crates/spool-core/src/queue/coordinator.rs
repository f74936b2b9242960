//! Dequeue coordinator: parking and waking blocked dequeuers.
//!
//! Each blocked `dequeue` call owns one `Notify` and registers it under every
//! job type it asked for. `wake(t)` pokes the waiters registered under `t`.
//!
//! `Notify::notify_one` leaves a permit when nobody is currently awaiting, so
//! a waiter that registers *before* scanning the store can never miss a wake
//! that lands between its scan and its sleep. Wakes are hints only: the woken
//! waiter re-scans durable state and may find nothing (someone else won).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::domain::JobType;

#[derive(Default)]
pub struct Coordinator {
    waiters: Mutex<HashMap<JobType, Vec<(u64, Arc<Notify>)>>>,
    next_waiter: AtomicU64,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `types`. Interest ends when the guard is dropped.
    pub fn register(&self, types: &[JobType]) -> Registration<'_> {
        let id = self.next_waiter.fetch_add(1, Ordering::Relaxed);
        let notify = Arc::new(Notify::new());

        let mut waiters = self.waiters.lock().unwrap_or_else(|e| e.into_inner());
        for job_type in types {
            waiters
                .entry(job_type.clone())
                .or_default()
                .push((id, Arc::clone(&notify)));
        }

        Registration {
            coordinator: self,
            id,
            types: types.to_vec(),
            notify,
        }
    }

    /// Wake every waiter interested in `job_type`.
    pub fn wake(&self, job_type: &JobType) {
        let waiters = self.waiters.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(list) = waiters.get(job_type) {
            for (_, notify) in list {
                notify.notify_one();
            }
        }
    }

    /// Number of registrations currently parked on `job_type`.
    #[cfg(test)]
    pub fn waiting(&self, job_type: &JobType) -> usize {
        let waiters = self.waiters.lock().unwrap_or_else(|e| e.into_inner());
        waiters.get(job_type).map_or(0, Vec::len)
    }

    fn unregister(&self, id: u64, types: &[JobType]) {
        let mut waiters = self.waiters.lock().unwrap_or_else(|e| e.into_inner());
        for job_type in types {
            if let Some(list) = waiters.get_mut(job_type) {
                list.retain(|(waiter, _)| *waiter != id);
                if list.is_empty() {
                    waiters.remove(job_type);
                }
            }
        }
    }
}

/// A waiter's interest in a set of job types.
pub struct Registration<'a> {
    coordinator: &'a Coordinator,
    id: u64,
    types: Vec<JobType>,
    notify: Arc<Notify>,
}

impl Registration<'_> {
    /// Resolves once any registered type has been woken since the last call.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.coordinator.unregister(self.id, &self.types);
    }
}
