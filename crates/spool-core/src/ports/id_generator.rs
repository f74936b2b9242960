//! IdGenerator port.
//!
//! Job ids are ULIDs stamped with the queue's clock. Within one process the
//! generator is monotonic, so ids handed out later always sort later; the
//! dequeue scan relies on that for FIFO order inside a job type.

use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use ulid::{Generator, Ulid};

use crate::domain::JobId;
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    fn generate_job_id(&self) -> JobId;
}

/// ULID-based generator driven by a `Clock`.
pub struct UlidGenerator {
    clock: Arc<dyn Clock>,
    generator: Mutex<Generator>,
}

impl UlidGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            generator: Mutex::new(Generator::new()),
        }
    }
}

impl IdGenerator for UlidGenerator {
    fn generate_job_id(&self) -> JobId {
        let now: SystemTime = self.clock.now().into();
        let mut generator = self.generator.lock().unwrap_or_else(|e| e.into_inner());
        match generator.generate_from_datetime(now) {
            Ok(ulid) => JobId::from(ulid),
            // The random part overflowed within one millisecond; give up on
            // monotonicity for this id rather than fail the enqueue.
            Err(_) => {
                let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
                JobId::from(Ulid::from_parts(timestamp_ms, rand::random()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn generates_unique_ids() {
        let id_gen = UlidGenerator::new(Arc::new(SystemClock));

        let id1 = id_gen.generate_job_id();
        let id2 = id_gen.generate_job_id();
        let id3 = id_gen.generate_job_id();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn ids_from_a_fixed_clock_share_the_timestamp_and_still_increase() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(Arc::new(FixedClock::new(fixed_time)));

        let ids: Vec<JobId> = (0..100).map(|_| id_gen.generate_job_id()).collect();

        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        for id in &ids {
            assert_eq!(
                id.as_ulid().timestamp_ms(),
                fixed_time.timestamp_millis() as u64
            );
        }
    }
}
