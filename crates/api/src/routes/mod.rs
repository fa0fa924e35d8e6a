//! API route definitions.

use axum::{Router, middleware};

use crate::{AppState, middleware::admin_auth_middleware};

pub mod deliveries;
pub mod dlq;
pub mod health;
pub mod wallet;
pub mod webhook;

/// Creates the router: public routes plus the admin API behind the bearer
/// token check.
#[allow(clippy::needless_pass_by_value)]
pub fn router(state: AppState) -> Router<AppState> {
    let admin_routes = Router::new()
        .merge(dlq::routes())
        .merge(deliveries::routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ));

    Router::new()
        .merge(health::routes())
        .merge(webhook::routes())
        .merge(wallet::routes())
        .merge(admin_routes)
}
