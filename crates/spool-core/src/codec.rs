//! Payload codec: the boundary between caller types and stored blobs.
//!
//! Job arguments and results are stored as JSON values. The queue only moves
//! them around; their schema belongs to whoever enqueues and executes the job.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{QueueError, Result};

pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(QueueError::Serialization)
}

pub fn decode<T: DeserializeOwned>(value: &Value) -> Result<T> {
    T::deserialize(value).map_err(QueueError::Serialization)
}
