//! Wallet initiation routes.
//!
//! Every route runs behind the idempotency cache: the key is reserved before
//! the operation, completed with the response after it, and released if the
//! operation fails so a corrected retry can run.

use std::future::Future;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use validator::Validate;

use rampart_core::settlement::{Metadata, RampKind, TxnStatus};
use rampart_db::entities::ramp_transactions;
use rampart_db::repositories::{InitiateRampInput, Reservation};
use rampart_shared::types::{Currency, UserId};

use crate::{
    AppState,
    error::ApiError,
    extractors::{IdempotencyKey, WalletUser},
};

/// Header set on responses served from the idempotency cache.
pub const REPLAYED_HEADER: &str = "Idempotent-Replayed";

/// Creates wallet routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/wallet/onramp", post(initiate_onramp))
        .route("/api/v1/wallet/offramp", post(initiate_offramp))
        .route("/api/v1/wallet/p2p", post(p2p_transfer))
}

/// Request body for on-ramp and off-ramp initiation.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InitiateRampRequest {
    /// Amount in minor units.
    #[validate(range(min = 1, message = "amount must be a positive integer"))]
    pub amount: i64,
    /// Currency, INR when omitted.
    #[serde(default)]
    pub currency: Currency,
    /// Payment provider.
    #[validate(length(min = 1, max = 64, message = "provider must be 1-64 characters"))]
    pub provider: String,
    /// Linked bank account; required for off-ramp.
    pub linked_bank_account_id: Option<i64>,
    /// Client metadata stored on the transaction.
    pub metadata: Option<Value>,
}

/// Request body for a P2P transfer.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct P2pRequest {
    /// Receiving user.
    pub receiver_id: UserId,
    /// Amount in minor units.
    #[validate(range(min = 1, message = "amount must be a positive integer"))]
    pub amount: i64,
    /// Currency, INR when omitted.
    #[serde(default)]
    pub currency: Currency,
}

/// Ramp transaction as returned to the client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RampTransactionResponse {
    /// Token the provider webhook will reference.
    pub token: String,
    /// Transaction direction.
    #[serde(rename = "type")]
    pub kind: RampKind,
    /// Always `Processing` on creation.
    pub status: TxnStatus,
    /// Amount in minor units.
    pub amount: i64,
    /// Currency code.
    pub currency: String,
    /// Payment provider.
    pub provider: String,
    /// Linked bank account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_bank_account_id: Option<i64>,
    /// RFC 3339 creation time.
    pub started_at: String,
}

impl From<ramp_transactions::Model> for RampTransactionResponse {
    fn from(row: ramp_transactions::Model) -> Self {
        Self {
            token: row.token,
            kind: row.kind.into(),
            status: row.status.into(),
            amount: row.amount,
            currency: row.currency,
            provider: row.provider,
            linked_bank_account_id: row.linked_bank_account_id,
            started_at: row.started_at.to_rfc3339(),
        }
    }
}

/// Completed transfer as returned to the client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    /// Transfer id.
    pub transfer_id: String,
    /// Ledger transaction `p2p:<transferId>`.
    pub ledger_transaction_id: String,
    /// Amount in minor units.
    pub amount: i64,
    /// Currency.
    pub currency: Currency,
    /// Sender balance after the transfer.
    pub sender_balance: BalanceResponse,
}

/// `(amount, locked)` of a balance.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Total funds.
    pub amount: i64,
    /// Funds reserved for pending withdrawals.
    pub locked: i64,
    /// `amount - locked`.
    pub available: i64,
}

/// Runs `op` at most once per idempotency key.
async fn idempotent<F, Fut>(
    state: &AppState,
    key: &IdempotencyKey,
    user: UserId,
    action: &str,
    op: F,
) -> Result<Response, ApiError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(StatusCode, Value), ApiError>>,
{
    if let Reservation::Replay { status, body } =
        state.idempotency.reserve(&key.0, user, action).await?
    {
        info!(target: "idempotency", key = %key.0, action, "Serving cached response");
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
        let mut response = (status, Json(body)).into_response();
        response
            .headers_mut()
            .insert(REPLAYED_HEADER, HeaderValue::from_static("true"));
        return Ok(response);
    }

    match op().await {
        Ok((status, body)) => {
            if let Err(e) = state.idempotency.complete(&key.0, status.as_u16(), &body).await {
                warn!(
                    target: "idempotency",
                    key = %key.0,
                    action,
                    error = %e,
                    "Failed to store idempotent response"
                );
            }
            Ok((status, Json(body)).into_response())
        }
        Err(e) => {
            if let Err(release_err) = state.idempotency.release(&key.0).await {
                warn!(
                    target: "idempotency",
                    key = %key.0,
                    action,
                    error = %release_err,
                    "Failed to release idempotency key"
                );
            }
            Err(e)
        }
    }
}

fn to_body<T: Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            e.to_string(),
        )
    })
}

fn ramp_input(user: UserId, req: InitiateRampRequest) -> InitiateRampInput {
    InitiateRampInput {
        user_id: user,
        amount: req.amount,
        currency: req.currency,
        provider: req.provider,
        linked_bank_account_id: req.linked_bank_account_id,
        metadata: req.metadata.map(Metadata::from_value).unwrap_or_default(),
    }
}

/// `POST /api/v1/wallet/onramp`.
async fn initiate_onramp(
    State(state): State<AppState>,
    key: IdempotencyKey,
    WalletUser(user): WalletUser,
    WithRejection(Json(req), _): WithRejection<Json<InitiateRampRequest>, ApiError>,
) -> Result<Response, ApiError> {
    req.validate()?;

    idempotent(&state, &key, user, "onramp", || async {
        let row = state.wallet.initiate_onramp(ramp_input(user, req)).await?;
        Ok::<_, ApiError>((StatusCode::CREATED, to_body(&RampTransactionResponse::from(row))?))
    })
    .await
}

/// `POST /api/v1/wallet/offramp`.
async fn initiate_offramp(
    State(state): State<AppState>,
    key: IdempotencyKey,
    WalletUser(user): WalletUser,
    WithRejection(Json(req), _): WithRejection<Json<InitiateRampRequest>, ApiError>,
) -> Result<Response, ApiError> {
    req.validate()?;
    if req.linked_bank_account_id.is_none() {
        return Err(ApiError::validation(
            "linkedBankAccountId is required for off-ramp",
        ));
    }

    idempotent(&state, &key, user, "offramp", || async {
        let row = state.wallet.initiate_offramp(ramp_input(user, req)).await?;
        Ok::<_, ApiError>((StatusCode::CREATED, to_body(&RampTransactionResponse::from(row))?))
    })
    .await
}

/// `POST /api/v1/wallet/p2p`.
async fn p2p_transfer(
    State(state): State<AppState>,
    key: IdempotencyKey,
    WalletUser(user): WalletUser,
    WithRejection(Json(req), _): WithRejection<Json<P2pRequest>, ApiError>,
) -> Result<Response, ApiError> {
    req.validate()?;

    idempotent(&state, &key, user, "p2p", || async {
        let receipt = state
            .wallet
            .p2p_transfer(user, req.receiver_id, req.amount, req.currency)
            .await?;
        let balance = receipt.sender_balance;
        let response = TransferResponse {
            transfer_id: receipt.transfer_id.to_string(),
            ledger_transaction_id: receipt.ledger_transaction_id.to_string(),
            amount: req.amount,
            currency: req.currency,
            sender_balance: BalanceResponse {
                amount: balance.amount,
                locked: balance.locked,
                available: balance.amount - balance.locked,
            },
        };
        Ok::<_, ApiError>((StatusCode::CREATED, to_body(&response)?))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{json_body, state};
    use axum::{body::Body, http::Request};
    use rstest::rstest;
    use serde_json::json;
    use tower::ServiceExt;

    fn post(uri: &str, key: Option<&str>, user: Option<&str>, body: &Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(key) = key {
            builder = builder.header("Idempotency-Key", key);
        }
        if let Some(user) = user {
            builder = builder.header("X-User-Id", user);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[rstest]
    #[case("/api/v1/wallet/onramp")]
    #[case("/api/v1/wallet/offramp")]
    #[case("/api/v1/wallet/p2p")]
    #[tokio::test]
    async fn test_missing_idempotency_key(#[case] uri: &str) {
        let app = routes().with_state(state());
        let user = UserId::new().to_string();

        let response = app
            .oneshot(post(uri, None, Some(&user), &json!({})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["message"], "Idempotency-Key header is required");
    }

    #[tokio::test]
    async fn test_missing_user() {
        let app = routes().with_state(state());

        let response = app
            .oneshot(post(
                "/api/v1/wallet/onramp",
                Some("key-1"),
                None,
                &json!({"amount": 100, "provider": "bank"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[rstest]
    #[case(json!({"amount": 0, "provider": "bank"}))]
    #[case(json!({"amount": 100, "provider": ""}))]
    #[case(json!({"amount": 100}))]
    #[case(json!({"amount": 100, "provider": "bank", "surprise": true}))]
    #[tokio::test]
    async fn test_invalid_ramp_body(#[case] body: Value) {
        let app = routes().with_state(state());
        let user = UserId::new().to_string();

        let response = app
            .oneshot(post("/api/v1/wallet/onramp", Some("key-1"), Some(&user), &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_offramp_requires_linked_account() {
        let app = routes().with_state(state());
        let user = UserId::new().to_string();

        let response = app
            .oneshot(post(
                "/api/v1/wallet/offramp",
                Some("key-1"),
                Some(&user),
                &json!({"amount": 100, "provider": "bank"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_database_failure_is_masked() {
        let app = routes().with_state(state());
        let user = UserId::new().to_string();

        let response = app
            .oneshot(post(
                "/api/v1/wallet/p2p",
                Some("key-1"),
                Some(&user),
                &json!({"receiverId": UserId::new(), "amount": 100}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["message"], "Internal server error");
    }
}
