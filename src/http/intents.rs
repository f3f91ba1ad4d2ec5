use std::net::SocketAddr;

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::Json;

use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::payments::{PaymentIntentRequest, PaymentIntentResponse};
use crate::security::client_key;

/// `POST /v2/payment-intents`
///
/// The quota check runs before the body is parsed, so malformed requests
/// still count against the client.
pub async fn create_payment_intent(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    payload: Result<Json<PaymentIntentRequest>, JsonRejection>,
) -> Result<Json<PaymentIntentResponse>, ApiError> {
    let client = client_key(&headers, peer, state.config.rate_limit.trust_forwarded_for);
    state.payments.admit(&client)?;

    let Json(request) = payload?;
    let intent = state.payments.process(request).await?;
    Ok(Json(intent))
}
