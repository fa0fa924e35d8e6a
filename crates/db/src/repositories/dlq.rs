//! DLQ store: inspection, archival and replay of dead-lettered deliveries.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Serialize;
use tracing::{info, warn};

use rampart_core::delivery::{DlqState, FailureClass, ReplayHistoryEntry, replay_job_id};
use rampart_shared::types::{DlqJobId, OffsetPage, PageRequest};

use super::delivery::{DeliveryQueue, NewDelivery, QueueError, new_webhook_event_id};
use crate::entities::{dlq_jobs, sea_orm_active_enums::FailureClass as DbFailureClass};

/// Largest batch a bulk replay processes.
pub const MAX_BULK_REPLAY: u64 = 100;

/// Error types for DLQ operations.
#[derive(Debug, thiserror::Error)]
pub enum DlqError {
    /// No DLQ job matches.
    #[error("DLQ job not found: {0}")]
    NotFound(String),

    /// Archived jobs cannot be replayed.
    #[error("DLQ job is archived: {0}")]
    Archived(DlqJobId),

    /// The request is malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Stored replay history is not a valid history array.
    #[error("Corrupt replay history on {0}: {1}")]
    CorruptHistory(DlqJobId, String),

    /// Re-enqueue failed.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl DlqError {
    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "DLQ_JOB_NOT_FOUND",
            Self::Archived(_) => "DLQ_JOB_ARCHIVED",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::CorruptHistory(..) => "DLQ_CORRUPT_HISTORY",
            Self::Queue(e) => e.error_code(),
            Self::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Archived(_) => 409,
            Self::InvalidRequest(_) => 400,
            Self::Queue(e) => e.http_status_code(),
            Self::CorruptHistory(..) | Self::Database(_) => 500,
        }
    }
}

/// Listing filter.
#[derive(Debug, Clone, Default)]
pub struct DlqFilter {
    /// States to include; empty means all.
    pub states: Vec<DlqState>,
    /// Include archived jobs. When false, archived jobs are removed even if
    /// `states` names them.
    pub include_archived: bool,
    /// Restrict to one failure class.
    pub failure_class: Option<FailureClass>,
}

/// How a replay request names its job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayTarget {
    /// By DLQ job id.
    Id(DlqJobId),
    /// Newest non-archived job for a transaction token.
    Token(String),
    /// Newest non-archived job carrying a webhook event id.
    WebhookEventId(String),
}

/// Replay options.
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Operator performing the replay.
    pub actor: String,
    /// Free-text reason.
    pub reason: Option<String>,
    /// Archive the DLQ job after re-enqueueing it.
    pub archive_after: bool,
    /// Reuse the original webhook event id instead of minting a new one.
    pub preserve_webhook_event_id: bool,
}

/// Result of one replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayResult {
    /// Replayed DLQ job.
    pub dlq_job_id: DlqJobId,
    /// Key of the enqueued delivery job.
    pub enqueued_job_id: String,
    /// Event id the new delivery carries.
    pub webhook_event_id: String,
    /// Whether the DLQ job is now archived.
    pub archived: bool,
    /// Replays so far, including this one.
    pub replay_count: i32,
}

/// Bulk replay request.
#[derive(Debug, Clone)]
pub struct BulkReplayRequest {
    /// Restrict to one failure class.
    pub failure_class: Option<FailureClass>,
    /// Maximum jobs to replay, clamped to `1..=100`.
    pub limit: u64,
    /// Pause between replays.
    pub sleep: Duration,
    /// Options applied to each replay.
    pub options: ReplayOptions,
}

/// Per-job result of a bulk replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkReplayItem {
    /// DLQ job.
    pub dlq_job_id: DlqJobId,
    /// Replay result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ReplayResult>,
    /// Error code on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of resolving a duplicate group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveGroupResult {
    /// Replay of the primary job.
    pub primary: ReplayResult,
    /// Other jobs, now archived.
    pub archived: Vec<DlqJobId>,
    /// Ids that did not exist.
    pub missing: Vec<DlqJobId>,
}

/// DLQ store.
#[derive(Debug, Clone)]
pub struct DlqStore {
    db: DatabaseConnection,
    queue: DeliveryQueue,
}

impl DlqStore {
    /// Creates a new DLQ store that re-enqueues through `queue`.
    #[must_use]
    pub const fn new(db: DatabaseConnection, queue: DeliveryQueue) -> Self {
        Self { db, queue }
    }

    /// Lists DLQ jobs, newest failure first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(
        &self,
        filter: &DlqFilter,
        page: PageRequest,
    ) -> Result<OffsetPage<dlq_jobs::Model>, DbErr> {
        let mut query = dlq_jobs::Entity::find();

        if !filter.states.is_empty() {
            query = query.filter(state_condition(&filter.states));
        }
        if !filter.include_archived {
            query = query.filter(dlq_jobs::Column::ArchivedAt.is_null());
        }
        if let Some(class) = filter.failure_class {
            query = query.filter(dlq_jobs::Column::FailureClass.eq(DbFailureClass::from(class)));
        }

        let total = query.clone().count(&self.db).await?;
        let items = query
            .order_by_desc(dlq_jobs::Column::FailedAt)
            .order_by_desc(dlq_jobs::Column::Id)
            .offset(page.offset)
            .limit(page.limit())
            .all(&self.db)
            .await?;

        Ok(OffsetPage::new(items, page, total))
    }

    /// Gets one DLQ job.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or a database error.
    pub async fn get(&self, id: DlqJobId) -> Result<dlq_jobs::Model, DlqError> {
        dlq_jobs::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await?
            .ok_or_else(|| DlqError::NotFound(id.to_string()))
    }

    /// Resolves a replay target to a job id.
    ///
    /// Token and event-id lookups pick the newest non-archived match.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if nothing matches.
    pub async fn resolve_target(&self, target: &ReplayTarget) -> Result<DlqJobId, DlqError> {
        let (column, value) = match target {
            ReplayTarget::Id(id) => return Ok(*id),
            ReplayTarget::Token(token) => (dlq_jobs::Column::Token, token),
            ReplayTarget::WebhookEventId(event_id) => (dlq_jobs::Column::WebhookEventId, event_id),
        };

        dlq_jobs::Entity::find()
            .filter(column.eq(value.as_str()))
            .filter(dlq_jobs::Column::ArchivedAt.is_null())
            .order_by_desc(dlq_jobs::Column::FailedAt)
            .one(&self.db)
            .await?
            .map(|job| DlqJobId::from_uuid(job.id))
            .ok_or_else(|| DlqError::NotFound(value.clone()))
    }

    /// Archives a job. Archiving an archived job changes nothing.
    ///
    /// Returns true if this call archived it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or a database error.
    pub async fn archive(
        &self,
        id: DlqJobId,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<bool, DlqError> {
        let result = dlq_jobs::Entity::update_many()
            .col_expr(dlq_jobs::Column::ArchivedAt, Expr::value(Utc::now()))
            .col_expr(dlq_jobs::Column::ArchivedBy, Expr::value(actor))
            .col_expr(
                dlq_jobs::Column::ArchiveReason,
                Expr::value(reason.map(str::to_string)),
            )
            .filter(dlq_jobs::Column::Id.eq(id.into_inner()))
            .filter(dlq_jobs::Column::ArchivedAt.is_null())
            .exec(&self.db)
            .await?;

        if result.rows_affected == 1 {
            info!(target: "dlq", dlq_job_id = %id, actor, "DLQ job archived");
            return Ok(true);
        }

        // Either already archived (idempotent success) or missing.
        self.get(id).await?;
        Ok(false)
    }

    /// Re-enqueues a DLQ job as a fresh delivery and records the replay.
    ///
    /// The job row is locked for the duration, so concurrent replays of the
    /// same job serialize and get distinct replay ids.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Archived`, or a queue/database error. Nothing is
    /// enqueued on error.
    pub async fn replay(
        &self,
        id: DlqJobId,
        options: &ReplayOptions,
    ) -> Result<ReplayResult, DlqError> {
        let txn = self.db.begin().await?;

        let job = dlq_jobs::Entity::find_by_id(id.into_inner())
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| DlqError::NotFound(id.to_string()))?;

        if job.archived_at.is_some() {
            return Err(DlqError::Archived(id));
        }

        let mut history: Vec<ReplayHistoryEntry> =
            serde_json::from_value(job.replay_history.clone())
                .map_err(|e| DlqError::CorruptHistory(id, e.to_string()))?;

        let at = replay_instant(Utc::now(), job.last_replayed_at.map(|t| t.with_timezone(&Utc)));
        let webhook_event_id = if options.preserve_webhook_event_id {
            job.webhook_event_id.clone()
        } else {
            new_webhook_event_id()
        };

        let enqueued = self
            .queue
            .enqueue_in(
                &txn,
                NewDelivery {
                    job_key: Some(replay_job_id(&job.token, id, at)),
                    token: job.token.clone(),
                    url: Some(job.url.clone()),
                    secret: Some(job.secret.clone()),
                    payload: job.payload.clone(),
                    webhook_event_id: Some(webhook_event_id.clone()),
                },
            )
            .await?;

        history.push(ReplayHistoryEntry {
            at,
            actor: options.actor.clone(),
            reason: options.reason.clone(),
            enqueued_job_id: enqueued.job_key.clone(),
            preserved_webhook_event_id: options.preserve_webhook_event_id,
            webhook_event_id: webhook_event_id.clone(),
        });
        let history = serde_json::to_value(&history)
            .map_err(|e| DlqError::CorruptHistory(id, e.to_string()))?;

        let replay_count = job.replay_count + 1;
        let mut active = job.into_active_model();
        active.replay_count = Set(replay_count);
        active.replay_history = Set(history);
        active.last_replayed_at = Set(Some(at.into()));
        if options.archive_after {
            active.archived_at = Set(Some(Utc::now().into()));
            active.archived_by = Set(Some(options.actor.clone()));
            active.archive_reason = Set(options.reason.clone());
        }
        active.update(&txn).await?;

        txn.commit().await?;

        info!(
            target: "dlq",
            dlq_job_id = %id,
            enqueued_job_id = %enqueued.job_key,
            webhook_event_id = %webhook_event_id,
            preserved = options.preserve_webhook_event_id,
            archived = options.archive_after,
            actor = %options.actor,
            "DLQ job replayed"
        );

        Ok(ReplayResult {
            dlq_job_id: id,
            enqueued_job_id: enqueued.job_key,
            webhook_event_id,
            archived: options.archive_after,
            replay_count,
        })
    }

    /// Replays up to `limit` non-archived jobs, oldest failure first.
    ///
    /// One job's failure is recorded in its item and does not stop the batch.
    ///
    /// # Errors
    ///
    /// Returns an error only if selecting the batch fails.
    pub async fn replay_bulk(
        &self,
        request: &BulkReplayRequest,
    ) -> Result<Vec<BulkReplayItem>, DlqError> {
        let limit = request.limit.clamp(1, MAX_BULK_REPLAY);

        let mut query = dlq_jobs::Entity::find().filter(dlq_jobs::Column::ArchivedAt.is_null());
        if let Some(class) = request.failure_class {
            query = query.filter(dlq_jobs::Column::FailureClass.eq(DbFailureClass::from(class)));
        }
        let ids: Vec<DlqJobId> = query
            .order_by_asc(dlq_jobs::Column::FailedAt)
            .limit(limit)
            .all(&self.db)
            .await?
            .into_iter()
            .map(|job| DlqJobId::from_uuid(job.id))
            .collect();

        let mut items = Vec::with_capacity(ids.len());
        for (index, id) in ids.iter().copied().enumerate() {
            if index > 0 && !request.sleep.is_zero() {
                tokio::time::sleep(request.sleep).await;
            }

            let item = match self.replay(id, &request.options).await {
                Ok(result) => BulkReplayItem {
                    dlq_job_id: id,
                    result: Some(result),
                    error: None,
                },
                Err(e) => {
                    warn!(target: "dlq", dlq_job_id = %id, error = %e, "Bulk replay item failed");
                    BulkReplayItem {
                        dlq_job_id: id,
                        result: None,
                        error: Some(e.error_code().to_string()),
                    }
                }
            };
            items.push(item);
        }

        info!(
            target: "dlq",
            requested = limit,
            replayed = items.iter().filter(|i| i.result.is_some()).count(),
            failed = items.iter().filter(|i| i.error.is_some()).count(),
            "Bulk replay finished"
        );
        Ok(items)
    }

    /// Collapses a duplicate cluster: replays `primary` and archives every
    /// other id in `ids`.
    ///
    /// # Errors
    ///
    /// Returns the primary's replay error; nothing is archived in that case.
    pub async fn resolve_group(
        &self,
        primary: DlqJobId,
        ids: &[DlqJobId],
        actor: &str,
        reason: Option<&str>,
    ) -> Result<ResolveGroupResult, DlqError> {
        let options = ReplayOptions {
            actor: actor.to_string(),
            reason: reason.map(str::to_string),
            archive_after: true,
            preserve_webhook_event_id: true,
        };
        let primary_result = self.replay(primary, &options).await?;

        let mut archived = Vec::new();
        let mut missing = Vec::new();
        for &id in ids.iter().filter(|&&id| id != primary) {
            match self.archive(id, actor, reason).await {
                Ok(_) => archived.push(id),
                Err(DlqError::NotFound(_)) => missing.push(id),
                Err(e) => return Err(e),
            }
        }

        info!(
            target: "dlq",
            primary = %primary,
            archived = archived.len(),
            missing = missing.len(),
            actor,
            "Duplicate group resolved"
        );

        Ok(ResolveGroupResult {
            primary: primary_result,
            archived,
            missing,
        })
    }
}

fn state_condition(states: &[DlqState]) -> Condition {
    states.iter().fold(Condition::any(), |cond, state| {
        let clause = match state {
            DlqState::Pending => Condition::all()
                .add(dlq_jobs::Column::ArchivedAt.is_null())
                .add(dlq_jobs::Column::ReplayCount.eq(0)),
            DlqState::Replayed => Condition::all()
                .add(dlq_jobs::Column::ArchivedAt.is_null())
                .add(dlq_jobs::Column::ReplayCount.gt(0)),
            DlqState::Archived => Condition::all().add(dlq_jobs::Column::ArchivedAt.is_not_null()),
        };
        cond.add(clause)
    })
}

/// Timestamp for a replay id: `now`, or one millisecond past the previous
/// replay when the clock has not moved on.
fn replay_instant(now: DateTime<Utc>, last: Option<DateTime<Utc>>) -> DateTime<Utc> {
    match last {
        Some(last) if last.timestamp_millis() >= now.timestamp_millis() => {
            last + TimeDelta::milliseconds(1)
        }
        _ => now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_replay_instant_moves_forward() {
        let now = Utc.timestamp_millis_opt(5_000).unwrap();
        assert_eq!(replay_instant(now, None), now);
        assert_eq!(
            replay_instant(now, Some(Utc.timestamp_millis_opt(4_000).unwrap())),
            now
        );
        assert_eq!(
            replay_instant(now, Some(now)),
            Utc.timestamp_millis_opt(5_001).unwrap()
        );
        assert_eq!(
            replay_instant(now, Some(Utc.timestamp_millis_opt(9_000).unwrap())),
            Utc.timestamp_millis_opt(9_001).unwrap()
        );
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(DlqError::NotFound("x".into()).error_code(), "DLQ_JOB_NOT_FOUND");
        assert_eq!(DlqError::NotFound("x".into()).http_status_code(), 404);
        let archived = DlqError::Archived(DlqJobId::new());
        assert_eq!(archived.error_code(), "DLQ_JOB_ARCHIVED");
        assert_eq!(archived.http_status_code(), 409);
    }
}
