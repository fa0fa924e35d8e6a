//! DLQ replay records.

use chrono::{DateTime, Utc};
use rampart_shared::types::DlqJobId;
use serde::{Deserialize, Serialize};

/// Builds the queue key of a replayed job.
///
/// Includes the time so two replays of one DLQ job never collide with each
/// other or with the original job.
#[must_use]
pub fn replay_job_id(token: &str, dlq_job_id: DlqJobId, at: DateTime<Utc>) -> String {
    format!("replay:{token}:{dlq_job_id}:{}", at.timestamp_millis())
}

/// One append-only entry of a DLQ job's replay history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayHistoryEntry {
    /// When the replay happened.
    pub at: DateTime<Utc>,
    /// Who triggered it.
    pub actor: String,
    /// Operator-supplied reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Queue key of the job that was enqueued.
    pub enqueued_job_id: String,
    /// Whether the original webhook event id was reused.
    pub preserved_webhook_event_id: bool,
    /// Event id carried by the enqueued job.
    pub webhook_event_id: String,
}

/// Listing state of a DLQ job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DlqState {
    /// Never replayed and not archived.
    Pending,
    /// Replayed at least once and not archived.
    Replayed,
    /// Archived; cannot be replayed.
    Archived,
}

impl DlqState {
    /// Derives the state from the stored columns.
    #[must_use]
    pub const fn of(archived: bool, replay_count: i32) -> Self {
        if archived {
            Self::Archived
        } else if replay_count > 0 {
            Self::Replayed
        } else {
            Self::Pending
        }
    }
}

impl std::str::FromStr for DlqState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "replayed" => Ok(Self::Replayed),
            "archived" => Ok(Self::Archived),
            _ => Err(format!("Unknown DLQ state: {s}")),
        }
    }
}
