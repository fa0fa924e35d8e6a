//! Delivery job lifecycle.
//!
//! `Waiting -> Active -> Completed`, or after a failed attempt either back to
//! `Waiting` (retry after backoff) or out of the queue into the DLQ.

use serde::{Deserialize, Serialize};

/// Queue name recorded as `sourceQueue` on dead-lettered jobs.
pub const DEFAULT_SOURCE_QUEUE: &str = "webhook-delivery";

/// State of a job in the delivery queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Runnable once `run_at` has passed.
    Waiting,
    /// Leased by a worker.
    Active,
    /// Delivered.
    Completed,
}

impl JobState {
    /// Returns the database representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }

    /// Returns true if a worker may lease the job.
    #[must_use]
    pub const fn is_claimable(&self) -> bool {
        matches!(self, Self::Waiting)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
