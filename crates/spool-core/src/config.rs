//! Queue configuration.
//!
//! Environment variables (all optional):
//! - `SPOOL_ROOT`: storage root directory (default: `./data/spool`)
//! - `SPOOL_JOB_TYPES`: comma-separated list of accepted job types
//!   (default: empty, meaning any type is accepted)
//! - `SPOOL_POLL_INTERVAL_MS`: fallback re-scan interval for blocked
//!   dequeues, in milliseconds (default: 1000)

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{QueueError, Result};

pub const DEFAULT_ROOT: &str = "./data/spool";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub root: PathBuf,
    /// Accepted job types. Empty accepts any type.
    pub job_types: Vec<String>,
    /// Upper bound on how long a blocked dequeue sleeps without a wake.
    pub poll_interval: Duration,
}

impl QueueConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            job_types: Vec::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_job_types(mut self, job_types: &[&str]) -> Self {
        self.job_types = job_types.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key/value source (the environment, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let root = lookup("SPOOL_ROOT")
            .and_then(non_empty)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT));

        let job_types = lookup("SPOOL_JOB_TYPES")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let poll_interval = match lookup("SPOOL_POLL_INTERVAL_MS").and_then(non_empty) {
            Some(raw) => {
                let ms: u64 = raw.parse().map_err(|_| {
                    QueueError::InvalidConfig(format!(
                        "invalid SPOOL_POLL_INTERVAL_MS={raw} (expected milliseconds)"
                    ))
                })?;
                Duration::from_millis(ms)
            }
            None => DEFAULT_POLL_INTERVAL,
        };

        let config = Self {
            root,
            job_types,
            poll_interval,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(QueueError::InvalidConfig(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        if let Some(blank) = self.job_types.iter().find(|t| t.trim().is_empty()) {
            return Err(QueueError::InvalidConfig(format!(
                "job type must not be blank: {blank:?}"
            )));
        }
        Ok(())
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
