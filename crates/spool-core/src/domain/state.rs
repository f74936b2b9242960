//! Job state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a job, derived from its timestamps.
///
/// State transitions:
/// - Queued -> Running   (a worker claims the job; `started_at` is set)
/// - Running -> Finished (the worker reports a result; `finished_at` is set)
///
/// Cancellation is not a state. It is a flag overlaying Queued or Running:
/// a canceled Queued job is never handed out, a canceled Running job keeps
/// running until it is finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting to be claimed (possibly blocked on dependencies).
    Queued,

    /// Claimed by a worker.
    Running,

    /// Result recorded. No further transitions.
    Finished,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Finished)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Finished => "finished",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
