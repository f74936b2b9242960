//! Read-only views handed back to callers.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{JobRecord, JobState};
use crate::codec;
use crate::error::Result;

/// Timestamps and flags of one job, plus its raw result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub canceled: bool,
    result: Option<Value>,
}

impl JobStatus {
    pub fn state(&self) -> JobState {
        match (self.started_at, self.finished_at) {
            (_, Some(_)) => JobState::Finished,
            (Some(_), None) => JobState::Running,
            (None, None) => JobState::Queued,
        }
    }

    /// Decode the stored result into the caller's type.
    ///
    /// `Ok(None)` until the job is finished.
    pub fn result<R: DeserializeOwned>(&self) -> Result<Option<R>> {
        self.result.as_ref().map(codec::decode).transpose()
    }

    pub fn raw_result(&self) -> Option<&Value> {
        self.result.as_ref()
    }
}

impl From<JobRecord> for JobStatus {
    fn from(record: JobRecord) -> Self {
        Self {
            queued_at: record.queued_at,
            started_at: record.started_at,
            finished_at: record.finished_at,
            canceled: record.canceled,
            result: record.result,
        }
    }
}

/// Number of jobs per state. `canceled` overlaps the other counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub queued: usize,
    pub running: usize,
    pub finished: usize,
    pub canceled: usize,
}

impl QueueCounts {
    pub fn tally<'a>(records: impl IntoIterator<Item = &'a JobRecord>) -> Self {
        let mut counts = Self::default();
        for record in records {
            match record.state() {
                JobState::Queued => counts.queued += 1,
                JobState::Running => counts.running += 1,
                JobState::Finished => counts.finished += 1,
            }
            if record.canceled {
                counts.canceled += 1;
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.queued + self.running + self.finished
    }
}
