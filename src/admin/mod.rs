//! Operator API, mounted under `/admin` when `admin.enabled` is set.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/circuit", get(get_circuit))
        .route("/admin/circuit/reset", post(reset_circuit))
        .route("/admin/bank/failure", put(set_bank_failure))
        .route("/admin/rate-limits", get(get_rate_limits))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}
