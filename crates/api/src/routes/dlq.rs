//! Admin DLQ routes.
//!
//! Every mutation is recorded in the audit log with the acting operator.

use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};
use validator::Validate;

use rampart_core::delivery::{DlqState, FailureClass, ReplayHistoryEntry};
use rampart_db::entities::dlq_jobs;
use rampart_db::repositories::{
    AuditEvent, BulkReplayItem, BulkReplayRequest, DlqFilter, ReplayOptions, ReplayResult,
    ReplayTarget, ResolveGroupResult,
};
use rampart_shared::types::{DlqJobId, OffsetPage, PageRequest};

use crate::{AppState, error::ApiError};

const DEFAULT_ACTOR: &str = "admin";
const MAX_SLEEP_MS: u64 = 10_000;

/// Creates DLQ routes. Mounted behind the admin token check.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/dlq/list", get(list_dlq))
        .route("/admin/dlq/replay", post(replay))
        .route("/admin/dlq/replay-bulk", post(replay_bulk))
        .route("/admin/dlq/archive", post(archive))
        .route("/admin/dlq/resolve-group", post(resolve_group))
        .route("/admin/dlq/{id}", get(get_dlq_job))
}

/// Query parameters for listing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    /// Page size, clamped to `1..=100`.
    pub limit: Option<u64>,
    /// Rows to skip.
    pub offset: Option<u64>,
    /// Include archived jobs.
    #[serde(default)]
    pub include_archived: bool,
    /// Comma-separated subset of `pending,replayed,archived`.
    pub states: Option<String>,
    /// `transient` or `permanent`.
    pub failure_class: Option<String>,
}

impl ListQuery {
    fn filter(&self) -> Result<DlqFilter, ApiError> {
        let states = match &self.states {
            Some(raw) => parse_states(raw)?,
            None => Vec::new(),
        };
        let failure_class = self
            .failure_class
            .as_deref()
            .map(str::parse::<FailureClass>)
            .transpose()
            .map_err(ApiError::validation)?;

        Ok(DlqFilter {
            states,
            include_archived: self.include_archived,
            failure_class,
        })
    }

    fn page(&self) -> PageRequest {
        let default = PageRequest::default();
        PageRequest::new(
            self.offset.unwrap_or(default.offset),
            self.limit.unwrap_or(default.limit),
        )
    }
}

fn parse_states(raw: &str) -> Result<Vec<DlqState>, ApiError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<DlqState>().map_err(ApiError::validation))
        .collect()
}

/// A DLQ job as returned to operators. The signing secret is never exposed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DlqJobResponse {
    /// DLQ job id.
    pub id: DlqJobId,
    /// Listing state.
    pub state: DlqState,
    /// Queue the job failed on.
    pub source_queue: String,
    /// Key of the failed delivery job.
    pub source_job_id: String,
    /// Transaction token.
    pub token: String,
    /// Target URL.
    pub url: String,
    /// Delivery body.
    pub payload: Value,
    /// Event id of the failed delivery.
    pub webhook_event_id: String,
    /// Last error.
    pub failure_reason: String,
    /// Transient or permanent.
    pub failure_class: FailureClass,
    /// RFC 3339 time of the final failure.
    pub failed_at: String,
    /// Attempts made before dead-lettering.
    pub attempts: i32,
    /// Replays so far.
    pub replay_count: i32,
    /// Append-only replay record.
    pub replay_history: Vec<ReplayHistoryEntry>,
    /// RFC 3339 time of the last replay.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_replayed_at: Option<String>,
    /// RFC 3339 archive time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<String>,
    /// Operator who archived the job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_by: Option<String>,
    /// Why it was archived.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_reason: Option<String>,
}

impl From<dlq_jobs::Model> for DlqJobResponse {
    fn from(job: dlq_jobs::Model) -> Self {
        let replay_history = serde_json::from_value(job.replay_history).unwrap_or_else(|e| {
            warn!(target: "dlq", dlq_job_id = %job.id, error = %e, "Unreadable replay history");
            Vec::new()
        });

        Self {
            id: DlqJobId::from_uuid(job.id),
            state: DlqState::of(job.archived_at.is_some(), job.replay_count),
            source_queue: job.source_queue,
            source_job_id: job.source_job_id,
            token: job.token,
            url: job.url,
            payload: job.payload,
            webhook_event_id: job.webhook_event_id,
            failure_reason: job.failure_reason,
            failure_class: job.failure_class.into(),
            failed_at: job.failed_at.to_rfc3339(),
            attempts: job.attempts,
            replay_count: job.replay_count,
            replay_history,
            last_replayed_at: job.last_replayed_at.map(|t| t.to_rfc3339()),
            archived_at: job.archived_at.map(|t| t.to_rfc3339()),
            archived_by: job.archived_by,
            archive_reason: job.archive_reason,
        }
    }
}

/// `GET /admin/dlq/list`.
async fn list_dlq(
    State(state): State<AppState>,
    WithRejection(Query(query), _): WithRejection<Query<ListQuery>, ApiError>,
) -> Result<Json<OffsetPage<DlqJobResponse>>, ApiError> {
    let filter = query.filter()?;
    let page = state.dlq.list(&filter, query.page()).await?;

    Ok(Json(OffsetPage {
        items: page.items.into_iter().map(DlqJobResponse::from).collect(),
        offset: page.offset,
        limit: page.limit,
        total: page.total,
        has_more: page.has_more,
    }))
}

/// `GET /admin/dlq/{id}`.
async fn get_dlq_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DlqJobResponse>, ApiError> {
    let id = parse_id(&id)?;
    let job = state.dlq.get(id).await?;
    Ok(Json(job.into()))
}

fn parse_id(raw: &str) -> Result<DlqJobId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::validation("DLQ job id must be a UUID"))
}

/// Request body for a single replay. Exactly one target is used, checked in
/// the order `dlqJobId`, `token`, `webhookEventId`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayRequest {
    /// Replay this DLQ job.
    pub dlq_job_id: Option<DlqJobId>,
    /// Replay the newest job for this transaction token.
    pub token: Option<String>,
    /// Replay the newest job carrying this event id.
    pub webhook_event_id: Option<String>,
    /// Archive the DLQ job afterwards.
    #[serde(default)]
    pub archive_after: bool,
    /// Reuse the original event id.
    #[serde(default)]
    pub preserve_webhook_event_id: bool,
    /// Operator note.
    pub reason: Option<String>,
    /// Operator name, `admin` when omitted.
    pub actor: Option<String>,
}

impl ReplayRequest {
    fn target(&self) -> Result<ReplayTarget, ApiError> {
        let non_empty = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        if let Some(id) = self.dlq_job_id {
            Ok(ReplayTarget::Id(id))
        } else if let Some(token) = non_empty(&self.token) {
            Ok(ReplayTarget::Token(token))
        } else if let Some(event_id) = non_empty(&self.webhook_event_id) {
            Ok(ReplayTarget::WebhookEventId(event_id))
        } else {
            Err(ApiError::validation(
                "One of dlqJobId, token or webhookEventId is required",
            ))
        }
    }

    fn options(&self) -> ReplayOptions {
        ReplayOptions {
            actor: actor_or_default(self.actor.as_deref()),
            reason: self.reason.clone(),
            archive_after: self.archive_after,
            preserve_webhook_event_id: self.preserve_webhook_event_id,
        }
    }
}

fn actor_or_default(actor: Option<&str>) -> String {
    actor
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or(DEFAULT_ACTOR)
        .to_string()
}

/// `POST /admin/dlq/replay`.
async fn replay(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<ReplayRequest>, ApiError>,
) -> Result<Json<ReplayResult>, ApiError> {
    let target = req.target()?;
    let options = req.options();

    let id = state.dlq.resolve_target(&target).await?;
    let result = state.dlq.replay(id, &options).await?;

    info!(
        target: "dlq",
        dlq_job_id = %id,
        enqueued_job_id = %result.enqueued_job_id,
        actor = %options.actor,
        "DLQ job replayed"
    );
    state.audit.record_detached(
        AuditEvent::audit("dlq.replay")
            .actor(options.actor.clone())
            .details(json!({ "result": result, "reason": options.reason })),
    );

    Ok(Json(result))
}

/// Request body for a bulk replay.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BulkReplayBody {
    /// Restrict to one failure class.
    pub failure_class: Option<FailureClass>,
    /// Maximum jobs to replay.
    #[serde(default = "default_bulk_limit")]
    #[validate(range(min = 1, max = 100, message = "limit must be between 1 and 100"))]
    pub limit: u64,
    /// Pause between replays.
    #[serde(default)]
    #[validate(range(max = 10000, message = "sleepMs cannot exceed 10000"))]
    pub sleep_ms: u64,
    /// Archive each job after replaying it.
    #[serde(default)]
    pub archive_after: bool,
    /// Reuse the original event ids.
    #[serde(default)]
    pub preserve_webhook_event_id: bool,
    /// Operator note.
    pub reason: Option<String>,
    /// Operator name.
    pub actor: Option<String>,
}

const fn default_bulk_limit() -> u64 {
    20
}

/// Bulk replay response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkReplayResponse {
    /// Jobs picked up.
    pub attempted: usize,
    /// Jobs re-enqueued.
    pub replayed: usize,
    /// Per-job results.
    pub items: Vec<BulkReplayItem>,
}

/// `POST /admin/dlq/replay-bulk`.
async fn replay_bulk(
    State(state): State<AppState>,
    WithRejection(Json(body), _): WithRejection<Json<BulkReplayBody>, ApiError>,
) -> Result<Json<BulkReplayResponse>, ApiError> {
    body.validate()?;

    let request = BulkReplayRequest {
        failure_class: body.failure_class,
        limit: body.limit,
        sleep: Duration::from_millis(body.sleep_ms.min(MAX_SLEEP_MS)),
        options: ReplayOptions {
            actor: actor_or_default(body.actor.as_deref()),
            reason: body.reason,
            archive_after: body.archive_after,
            preserve_webhook_event_id: body.preserve_webhook_event_id,
        },
    };

    let items = state.dlq.replay_bulk(&request).await?;
    let replayed = items.iter().filter(|i| i.result.is_some()).count();

    info!(
        target: "dlq",
        attempted = items.len(),
        replayed,
        actor = %request.options.actor,
        "Bulk DLQ replay finished"
    );
    state.audit.record_detached(
        AuditEvent::audit("dlq.replay_bulk")
            .actor(request.options.actor.clone())
            .details(json!({
                "failureClass": request.failure_class,
                "attempted": items.len(),
                "replayed": replayed,
                "reason": request.options.reason,
            })),
    );

    Ok(Json(BulkReplayResponse {
        attempted: items.len(),
        replayed,
        items,
    }))
}

/// Request body for archiving.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveRequest {
    /// Job to archive.
    pub dlq_job_id: DlqJobId,
    /// Operator note.
    pub reason: Option<String>,
    /// Operator name.
    pub actor: Option<String>,
}

/// `POST /admin/dlq/archive`.
async fn archive(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<ArchiveRequest>, ApiError>,
) -> Result<Json<Value>, ApiError> {
    let actor = actor_or_default(req.actor.as_deref());
    let changed = state
        .dlq
        .archive(req.dlq_job_id, &actor, req.reason.as_deref())
        .await?;

    if changed {
        info!(target: "dlq", dlq_job_id = %req.dlq_job_id, actor = %actor, "DLQ job archived");
        state.audit.record_detached(
            AuditEvent::audit("dlq.archive")
                .actor(actor)
                .details(json!({ "dlqJobId": req.dlq_job_id, "reason": req.reason })),
        );
    }

    Ok(Json(json!({
        "dlqJobId": req.dlq_job_id,
        "archived": true,
        "changed": changed,
    })))
}

/// Request body for resolving a group of duplicate DLQ jobs.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveGroupRequest {
    /// Job to replay.
    pub primary_id: DlqJobId,
    /// Duplicates to archive.
    #[serde(default)]
    pub ids: Vec<DlqJobId>,
    /// Operator note.
    pub reason: Option<String>,
    /// Operator name.
    pub actor: Option<String>,
}

/// `POST /admin/dlq/resolve-group`.
async fn resolve_group(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<ResolveGroupRequest>, ApiError>,
) -> Result<Json<ResolveGroupResult>, ApiError> {
    let actor = actor_or_default(req.actor.as_deref());
    let result = state
        .dlq
        .resolve_group(req.primary_id, &req.ids, &actor, req.reason.as_deref())
        .await?;

    info!(
        target: "dlq",
        primary_id = %req.primary_id,
        archived = result.archived.len(),
        missing = result.missing.len(),
        "DLQ group resolved"
    );
    state.audit.record_detached(
        AuditEvent::audit("dlq.resolve_group")
            .actor(actor)
            .details(json!({ "result": result, "reason": req.reason })),
    );

    Ok(Json(result))
}
