//! HTTP API layer with Axum routes and middleware.
//!
//! This crate provides:
//! - The provider webhook endpoint (`POST /bankWebhook`)
//! - Wallet initiation routes guarded by the idempotency cache
//! - The bearer-protected admin API for deliveries and the DLQ
//! - Error responses and request extractors

pub mod error;
pub mod extractors;
pub mod middleware;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::header::{AUTHORIZATION, HeaderName};
use sea_orm::DatabaseConnection;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::sensitive_headers::SetSensitiveRequestHeadersLayer;
use tower_http::trace::TraceLayer;

use rampart_db::{
    AuditRepository, DeliveryQueue, DlqStore, IdempotencyRepository, SettlementRepository,
    WalletRepository,
};
use rampart_shared::AppConfig;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: Arc<DatabaseConnection>,
    /// Webhook settlement.
    pub settlement: SettlementRepository,
    /// Ramp initiation and P2P transfers.
    pub wallet: WalletRepository,
    /// Idempotency cache for wallet routes.
    pub idempotency: IdempotencyRepository,
    /// Outbound delivery queue handle.
    pub queue: DeliveryQueue,
    /// Dead-letter queue.
    pub dlq: DlqStore,
    /// Post-commit audit sink.
    pub audit: AuditRepository,
    /// Provider webhook HMAC secret.
    pub webhook_secret: Arc<str>,
    /// Bearer token for `/admin/*`.
    pub admin_token: Arc<str>,
}

impl AppState {
    /// Builds the state from a connection, the loaded config and the queue
    /// handle shared with the worker pool.
    #[must_use]
    pub fn new(db: DatabaseConnection, config: &AppConfig, queue: DeliveryQueue) -> Self {
        Self {
            settlement: SettlementRepository::new(
                db.clone(),
                config.webhook.max_wait(),
                config.webhook.timeout(),
            ),
            wallet: WalletRepository::new(db.clone()),
            idempotency: IdempotencyRepository::new(
                db.clone(),
                Duration::from_secs(config.idempotency.ttl_secs),
            ),
            dlq: DlqStore::new(db.clone(), queue.clone()),
            audit: AuditRepository::new(db.clone()),
            queue,
            webhook_secret: Arc::from(config.webhook.secret.as_str()),
            admin_token: Arc::from(config.admin.token.as_str()),
            db: Arc::new(db),
        }
    }
}

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 256 * 1024;

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    let sensitive = [
        AUTHORIZATION,
        HeaderName::from_static("x-webhook-signature"),
    ];

    routes::router(state.clone())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(SetSensitiveRequestHeadersLayer::new(sensitive))
        .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
        .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_router_sets_request_id() {
        let app = create_router(test_support::state());

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_router_rejects_oversized_body() {
        let app = create_router(test_support::state());
        let body = vec![b'a'; MAX_BODY_BYTES + 1];

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/bankWebhook")
                    .header("content-length", body.len())
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
