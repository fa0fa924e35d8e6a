//! Error responses.
//!
//! Every failure leaves the API as `{"error": <code>, "message": <text>}`.
//! Server-side failures are logged and their message replaced with a generic
//! one so database details never reach the client.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sea_orm::DbErr;
use serde_json::json;
use tracing::error;

use rampart_core::settlement::PayloadError;
use rampart_db::repositories::{
    DlqError, IdempotencyError, QueueError, SettlementError, WalletError,
};
use rampart_shared::AppError;

/// An error on its way to the client.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Creates an error with an explicit status and code.
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    /// 400 with `VALIDATION_ERROR`.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    /// 401 with `UNAUTHORIZED`.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    /// The response status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// The machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }

    fn from_status(status: u16, code: &'static str, message: String) -> Self {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, code, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = if self.status.is_server_error() {
            error!(code = self.code, error = %self.message, "Request failed");
            match self.status {
                StatusCode::SERVICE_UNAVAILABLE => "Service temporarily unavailable".to_string(),
                _ => "Internal server error".to_string(),
            }
        } else {
            self.message
        };

        (
            self.status,
            Json(json!({
                "error": self.code,
                "message": message
            })),
        )
            .into_response()
    }
}

impl From<AppError> for ApiError {
    fn from(e: AppError) -> Self {
        Self::from_status(e.status_code(), e.error_code(), e.to_string())
    }
}

impl From<DbErr> for ApiError {
    fn from(e: DbErr) -> Self {
        AppError::Database(e.to_string()).into()
    }
}

impl From<WalletError> for ApiError {
    fn from(e: WalletError) -> Self {
        Self::from_status(e.http_status_code(), e.error_code(), e.to_string())
    }
}

impl From<IdempotencyError> for ApiError {
    fn from(e: IdempotencyError) -> Self {
        Self::from_status(e.http_status_code(), e.error_code(), e.to_string())
    }
}

impl From<DlqError> for ApiError {
    fn from(e: DlqError) -> Self {
        Self::from_status(e.http_status_code(), e.error_code(), e.to_string())
    }
}

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        Self::from_status(e.http_status_code(), e.error_code(), e.to_string())
    }
}

impl From<SettlementError> for ApiError {
    fn from(e: SettlementError) -> Self {
        let status = match e {
            SettlementError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.error_code(), e.to_string())
    }
}

impl From<PayloadError> for ApiError {
    fn from(e: PayloadError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, e.error_code(), e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "MALFORMED_PAYLOAD", e.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        Self::validation(e.body_text())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(e: validator::ValidationErrors) -> Self {
        Self::validation(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::json_body;
    use rampart_core::balance::BalanceError;
    use std::time::Duration;

    #[tokio::test]
    async fn test_client_error_keeps_message() {
        let response = ApiError::from(WalletError::SelfTransfer).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json_body(response).await;
        assert_eq!(body["error"], "SELF_TRANSFER");
        assert_eq!(body["message"], "Cannot transfer to yourself");
    }

    #[tokio::test]
    async fn test_server_error_is_masked() {
        let response = ApiError::from(DbErr::Custom("relation secret_table".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = json_body(response).await;
        assert_eq!(body["error"], "DATABASE_ERROR");
        assert_eq!(body["message"], "Internal server error");
    }

    #[test]
    fn test_status_mapping() {
        let insufficient = WalletError::Balance(BalanceError::InsufficientFunds {
            available: 10,
            requested: 20,
        });
        assert_eq!(ApiError::from(insufficient).status(), StatusCode::UNPROCESSABLE_ENTITY);
        let mismatch = ApiError::from(WalletError::Balance(BalanceError::CurrencyMismatch {
            account: "INR".into(),
            requested: "USD".into(),
        }));
        assert_eq!(mismatch.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(mismatch.code(), "CURRENCY_MISMATCH");
        assert_eq!(
            ApiError::from(IdempotencyError::InFlight).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(SettlementError::Timeout(Duration::from_secs(1))).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(QueueError::NoTargetUrl).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
