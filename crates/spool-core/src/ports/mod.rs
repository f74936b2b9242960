//! Ports - the seams the queue is wired through.
//!
//! - **JobStore**: durable job records (filesystem, or in-memory for tests)
//! - **Clock**: the source of every timestamp
//! - **IdGenerator**: fresh job ids

pub mod clock;
pub mod id_generator;
pub mod job_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::job_store::{JobStore, Mutator};
