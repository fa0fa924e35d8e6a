//! Provider webhook ingestion.
//!
//! The signature is checked over the exact raw body before anything is
//! parsed. Audit events are written after the settlement transaction has
//! committed and never affect the response.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::json;
use tracing::{info, warn};

use rampart_core::settlement::{ClaimOutcome, ClaimRejection, WebhookPayload};
use rampart_db::repositories::AuditEvent;
use rampart_shared::signature::{self, EVENT_ID_HEADER, SIGNATURE_HEADER};

use crate::{AppState, error::ApiError};

const ACTOR: &str = "bank-webhook";

/// Creates webhook routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/bankWebhook", post(bank_webhook))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// `POST /bankWebhook`.
async fn bank_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let event_id = header(&headers, EVENT_ID_HEADER).map(str::to_string);

    let signature_ok = header(&headers, SIGNATURE_HEADER)
        .is_some_and(|sig| signature::verify(&state.webhook_secret, &body, sig));

    if !signature_ok {
        warn!(target: "settlement", webhook_event_id = ?event_id, "Webhook signature rejected");
        state.audit.record_detached(
            AuditEvent::security("webhook.signature_invalid")
                .actor(ACTOR)
                .details(json!({
                    "webhookEventId": event_id,
                    "signaturePresent": headers.contains_key(SIGNATURE_HEADER),
                })),
        );
        return ApiError::unauthorized("Invalid webhook signature").into_response();
    }

    let payload = match WebhookPayload::parse(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(
                target: "settlement",
                webhook_event_id = ?event_id,
                error = %e,
                "Webhook payload rejected"
            );
            return ApiError::from(e).into_response();
        }
    };

    match state.settlement.settle(&payload, event_id.as_deref()).await {
        Ok(outcome) => {
            record_outcome(&state, &payload, event_id.as_deref(), &outcome);
            outcome_response(&outcome)
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

fn outcome_response(outcome: &ClaimOutcome) -> Response {
    match outcome {
        ClaimOutcome::ProcessedSuccess { .. }
        | ClaimOutcome::ProcessedFailure { .. }
        | ClaimOutcome::Rejected(ClaimRejection::AlreadyProcessed) => {
            (StatusCode::OK, Json(json!({ "message": "Captured" }))).into_response()
        }
        ClaimOutcome::Rejected(rejection) => {
            let status = StatusCode::from_u16(rejection.http_status_code())
                .unwrap_or(StatusCode::BAD_REQUEST);
            let message = match rejection {
                ClaimRejection::NotFound => "No transaction of this type has the token",
                ClaimRejection::UserMismatch => "user_identifier does not own the transaction",
                ClaimRejection::AmountMismatch => "amount does not match the transaction",
                ClaimRejection::AccountMismatch => {
                    "linkedBankAccountId does not match the withdrawal"
                }
                ClaimRejection::AlreadyProcessed => "Transaction already processed",
            };
            (
                status,
                Json(json!({ "error": rejection.as_str(), "message": message })),
            )
                .into_response()
        }
    }
}

fn record_outcome(
    state: &AppState,
    payload: &WebhookPayload,
    event_id: Option<&str>,
    outcome: &ClaimOutcome,
) {
    let details = json!({
        "type": payload.kind,
        "status": payload.status,
        "amount": payload.amount,
        "failureReasonCode": payload.failure_reason_code,
        "linkedBankAccountId": payload.linked_bank_account_id,
        "webhookEventId": event_id,
        "outcome": outcome.as_str(),
    });

    let event = match outcome {
        ClaimOutcome::Rejected(rejection) if rejection.is_security_event() => {
            warn!(
                target: "settlement",
                token = %payload.token,
                rejection = rejection.as_str(),
                "Webhook failed ownership checks"
            );
            AuditEvent::security(format!("webhook.{}", rejection.as_str()))
        }
        ClaimOutcome::Rejected(_) => return,
        ClaimOutcome::ProcessedSuccess {
            ledger_transaction_id,
            ..
        } => {
            info!(
                target: "settlement",
                token = %payload.token,
                ledger_transaction_id = %ledger_transaction_id,
                "Webhook captured"
            );
            AuditEvent::audit("webhook.settled")
        }
        ClaimOutcome::ProcessedFailure { funds_released } => {
            info!(target: "settlement", token = %payload.token, funds_released, "Webhook captured");
            AuditEvent::audit("webhook.settled")
        }
    };

    state.audit.record_detached(
        event
            .actor(ACTOR)
            .user(payload.user_identifier)
            .token(payload.token.clone())
            .details(details),
    );
}
