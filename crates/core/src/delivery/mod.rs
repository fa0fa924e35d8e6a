//! Outbound webhook delivery rules.
//!
//! - Exponential backoff with jitter
//! - Transient/permanent failure classification and the retry decision
//! - Job states and DLQ replay records

pub mod backoff;
pub mod classify;
pub mod job;
pub mod replay;

#[cfg(test)]
mod backoff_props;

pub use backoff::BackoffPolicy;
pub use classify::{DeliveryFailure, FailureClass, RetryDecision, classify_status, decide};
pub use job::{DEFAULT_SOURCE_QUEUE, JobState};
pub use replay::{DlqState, ReplayHistoryEntry, replay_job_id};
