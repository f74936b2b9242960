//! Job record: the persisted document for one job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{JobId, JobState, JobType};
use crate::error::{QueueError, Result};

/// Everything the queue knows about a job.
///
/// Design:
/// - This is the single source of truth for job state; the store persists it
///   as one document per job.
/// - State is never stored directly. It is derived from the timestamps.
/// - All state transitions happen here, so every store implementation
///   enforces the same rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,

    #[serde(rename = "type")]
    pub job_type: JobType,

    /// Opaque arguments, never inspected by the queue.
    pub args: Value,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<JobId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    pub queued_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub canceled: bool,
}

impl JobRecord {
    pub fn new(
        id: JobId,
        job_type: JobType,
        args: Value,
        dependencies: Vec<JobId>,
        queued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            job_type,
            args,
            dependencies,
            result: None,
            queued_at,
            started_at: None,
            finished_at: None,
            canceled: false,
        }
    }

    pub fn state(&self) -> JobState {
        match (self.started_at, self.finished_at) {
            (_, Some(_)) => JobState::Finished,
            (Some(_), None) => JobState::Running,
            (None, None) => JobState::Queued,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Queued and not canceled: the only jobs dequeue may hand out.
    pub fn is_claimable(&self) -> bool {
        self.state() == JobState::Queued && !self.canceled
    }

    /// Queued -> Running.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<()> {
        if !self.is_claimable() {
            return Err(QueueError::NotQueued(self.id));
        }
        self.started_at = Some(now.max(self.queued_at));
        Ok(())
    }

    /// Running -> Finished. The result is written exactly once.
    ///
    /// A canceled job that is already running may still be finished.
    pub fn finish(&mut self, now: DateTime<Utc>, result: Value) -> Result<()> {
        match self.state() {
            JobState::Finished => Err(QueueError::AlreadyFinished(self.id)),
            JobState::Queued => Err(QueueError::NotRunning(self.id)),
            JobState::Running => {
                let started_at = self.started_at.unwrap_or(self.queued_at);
                self.finished_at = Some(now.max(started_at));
                self.result = Some(result);
                Ok(())
            }
        }
    }

    /// Set the canceled flag. Finished jobs are left untouched.
    ///
    /// Returns whether the flag is set afterwards.
    pub fn cancel(&mut self) -> bool {
        if !self.is_finished() {
            self.canceled = true;
        }
        self.canceled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rstest::rstest;
    use ulid::Ulid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn record() -> JobRecord {
        JobRecord::new(
            JobId::from_ulid(Ulid::new()),
            JobType::new("test"),
            serde_json::json!({"n": 1}),
            vec![],
            t0(),
        )
    }

    #[test]
    fn new_record_is_queued() {
        let job = record();
        assert_eq!(job.state(), JobState::Queued);
        assert!(job.is_claimable());
        assert!(!job.canceled);
        assert!(job.result.is_none());
    }

    #[test]
    fn start_then_finish() {
        let mut job = record();
        job.start(t0() + Duration::seconds(1)).unwrap();
        assert_eq!(job.state(), JobState::Running);

        job.finish(t0() + Duration::seconds(2), serde_json::json!("ok"))
            .unwrap();
        assert_eq!(job.state(), JobState::Finished);
        assert_eq!(job.result, Some(serde_json::json!("ok")));
    }

    #[test]
    fn start_twice_is_rejected() {
        let mut job = record();
        job.start(t0()).unwrap();
        assert!(matches!(job.start(t0()), Err(QueueError::NotQueued(_))));
    }

    #[test]
    fn canceled_job_cannot_be_started() {
        let mut job = record();
        job.cancel();
        assert!(!job.is_claimable());
        assert!(matches!(job.start(t0()), Err(QueueError::NotQueued(_))));
    }

    #[test]
    fn finish_requires_running() {
        let mut job = record();
        let err = job.finish(t0(), Value::Null).unwrap_err();
        assert!(matches!(err, QueueError::NotRunning(_)));
        assert!(job.finished_at.is_none());
    }

    #[test]
    fn second_finish_keeps_first_result() {
        let mut job = record();
        job.start(t0()).unwrap();
        job.finish(t0(), serde_json::json!(1)).unwrap();

        let err = job.finish(t0(), serde_json::json!(2)).unwrap_err();
        assert!(matches!(err, QueueError::AlreadyFinished(_)));
        assert_eq!(job.result, Some(serde_json::json!(1)));
    }

    #[test]
    fn canceled_running_job_can_finish() {
        let mut job = record();
        job.start(t0()).unwrap();
        assert!(job.cancel());
        job.finish(t0(), Value::Null).unwrap();
        assert_eq!(job.state(), JobState::Finished);
    }

    #[rstest]
    #[case::queued(false, false, true)]
    #[case::running(true, false, true)]
    #[case::finished(true, true, false)]
    fn cancel_sets_flag_unless_finished(
        #[case] started: bool,
        #[case] finished: bool,
        #[case] expected: bool,
    ) {
        let mut job = record();
        if started {
            job.start(t0()).unwrap();
        }
        if finished {
            job.finish(t0(), Value::Null).unwrap();
        }
        assert_eq!(job.cancel(), expected);
        assert_eq!(job.cancel(), expected);
        assert_eq!(job.canceled, expected);
    }

    #[test]
    fn timestamps_never_go_backwards() {
        let mut job = record();
        let earlier = t0() - Duration::seconds(30);
        job.start(earlier).unwrap();
        job.finish(earlier, Value::Null).unwrap();

        assert!(job.started_at.unwrap() >= job.queued_at);
        assert!(job.finished_at.unwrap() >= job.started_at.unwrap());
    }

    #[test]
    fn unset_fields_are_omitted_from_documents() {
        let job = record();
        let doc = serde_json::to_value(&job).unwrap();
        assert_eq!(doc["type"], "test");
        assert!(doc.get("started_at").is_none());
        assert!(doc.get("result").is_none());
        assert!(doc.get("dependencies").is_none());
    }
}
