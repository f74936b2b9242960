//! Impls - implementations of the ports.
//!
//! - **FsJobStore**: durable store, one JSON file per job
//! - **InMemoryJobStore**: non-durable store for tests

pub mod fs_store;
pub mod inmem_store;

pub use self::fs_store::FsJobStore;
pub use self::inmem_store::InMemoryJobStore;
