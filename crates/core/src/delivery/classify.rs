//! Delivery failure classification.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::backoff::BackoffPolicy;

/// Whether retrying a failed delivery can help.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureClass {
    /// Timeout, network error, 429 or 5xx.
    Transient,
    /// Any other rejection by the receiver.
    Permanent,
}

impl FailureClass {
    /// Returns the database representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
        }
    }
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FailureClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transient" => Ok(Self::Transient),
            "permanent" => Ok(Self::Permanent),
            _ => Err(format!("Unknown failure class: {s}")),
        }
    }
}

/// One failed delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryFailure {
    /// The attempt hit its hard timeout.
    #[error("delivery timed out")]
    Timeout,
    /// The receiver could not be reached.
    #[error("connection failed: {0}")]
    Connect(String),
    /// Any other transport error.
    #[error("network error: {0}")]
    Network(String),
    /// The receiver answered with a non-2xx status.
    #[error("receiver responded with HTTP {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },
    /// The job cannot be sent at all (e.g. no target URL).
    #[error("undeliverable: {0}")]
    Undeliverable(String),
}

impl DeliveryFailure {
    /// Classifies the failure.
    #[must_use]
    pub const fn class(&self) -> FailureClass {
        match self {
            Self::Timeout | Self::Connect(_) | Self::Network(_) => FailureClass::Transient,
            Self::Status { status } => classify_status(*status),
            Self::Undeliverable(_) => FailureClass::Permanent,
        }
    }
}

/// Classifies a non-2xx HTTP status.
#[must_use]
pub const fn classify_status(status: u16) -> FailureClass {
    match status {
        429 | 500..=599 => FailureClass::Transient,
        _ => FailureClass::Permanent,
    }
}

/// What to do with a job after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Put back to waiting, runnable after `delay`.
    Retry {
        /// Backoff before the next attempt.
        delay: Duration,
    },
    /// Move to the DLQ.
    DeadLetter {
        /// Classification recorded on the DLQ job.
        class: FailureClass,
    },
}

/// Decides the next step after attempt number `attempts_made` (1-based) failed.
///
/// Permanent failures dead-letter immediately. Transient ones retry until
/// `attempts_made` reaches `max_attempts`.
#[must_use]
pub fn decide(
    failure: &DeliveryFailure,
    attempts_made: u32,
    max_attempts: u32,
    policy: &BackoffPolicy,
    jitter_sample: u64,
) -> RetryDecision {
    let class = failure.class();
    if class == FailureClass::Permanent || attempts_made >= max_attempts {
        return RetryDecision::DeadLetter { class };
    }
    RetryDecision::Retry {
        delay: policy.delay_with_jitter(attempts_made.saturating_sub(1), jitter_sample),
    }
}
