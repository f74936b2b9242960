//! Domain model (ids, job types, records, states, status views).

pub mod ids;
pub mod job_type;
pub mod record;
pub mod state;
pub mod status;

pub use ids::JobId;
pub use job_type::JobType;
pub use record::JobRecord;
pub use state::JobState;
pub use status::{JobStatus, QueueCounts};
