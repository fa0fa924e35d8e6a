//! Admin delivery producer.

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use rampart_db::repositories::NewDelivery;
use rampart_shared::types::DeliveryJobId;

use crate::{AppState, error::ApiError};

/// Creates delivery routes. Mounted behind the admin token check.
pub fn routes() -> Router<AppState> {
    Router::new().route("/admin/deliveries", post(enqueue_delivery))
}

/// Request body for enqueueing an outbound webhook.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EnqueueDeliveryRequest {
    /// Transaction token the delivery is about.
    #[validate(length(min = 1, max = 128, message = "token must be 1-128 characters"))]
    pub token: String,
    /// Body sent to the target.
    pub payload: Value,
    /// Target URL; the configured default when omitted.
    #[validate(url(message = "url must be a valid URL"))]
    pub url: Option<String>,
    /// Event id; minted when omitted.
    #[validate(length(min = 1, max = 128, message = "webhookEventId must be 1-128 characters"))]
    pub webhook_event_id: Option<String>,
}

/// Enqueue result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueDeliveryResponse {
    /// Job row id.
    pub id: DeliveryJobId,
    /// Dedup key.
    pub job_key: String,
    /// Event id the delivery carries.
    pub webhook_event_id: String,
    /// False when an identical job was already queued.
    pub created: bool,
}

/// `POST /admin/deliveries`.
async fn enqueue_delivery(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<EnqueueDeliveryRequest>, ApiError>,
) -> Result<(StatusCode, Json<EnqueueDeliveryResponse>), ApiError> {
    req.validate()?;

    let enqueued = state
        .queue
        .enqueue(NewDelivery {
            token: req.token,
            url: req.url,
            payload: req.payload,
            webhook_event_id: req.webhook_event_id,
            ..Default::default()
        })
        .await?;

    let status = if enqueued.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        Json(EnqueueDeliveryResponse {
            id: enqueued.id,
            job_key: enqueued.job_key,
            webhook_event_id: enqueued.webhook_event_id,
            created: enqueued.created,
        }),
    ))
}
