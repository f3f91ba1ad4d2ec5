use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::http::server::AppState;
use crate::resilience::circuit_breaker::{CircuitSnapshot, CircuitState};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub circuit: CircuitState,
    pub bank_failing: bool,
    pub bank_charges: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BankFailureMode {
    pub failing: bool,
}

#[derive(Serialize)]
pub struct RateLimitStatus {
    pub enabled: bool,
    pub max_requests: u32,
    pub window_secs: u64,
    pub tracked_clients: usize,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        circuit: state.payments.breaker().state(),
        bank_failing: state.bank.is_failing(),
        bank_charges: state.bank.charge_count(),
    })
}

pub async fn get_circuit(State(state): State<AppState>) -> Json<CircuitSnapshot> {
    Json(state.payments.breaker().snapshot())
}

pub async fn reset_circuit(State(state): State<AppState>) -> Json<CircuitSnapshot> {
    let breaker = state.payments.breaker();
    breaker.reset();
    Json(breaker.snapshot())
}

pub async fn set_bank_failure(
    State(state): State<AppState>,
    Json(mode): Json<BankFailureMode>,
) -> Json<BankFailureMode> {
    state.bank.set_failing(mode.failing);
    tracing::warn!(failing = mode.failing, "Bank failure mode changed by operator");
    Json(BankFailureMode {
        failing: state.bank.is_failing(),
    })
}

pub async fn get_rate_limits(State(state): State<AppState>) -> Json<RateLimitStatus> {
    let config = &state.config.rate_limit;
    let tracked_clients = state
        .payments
        .limiter()
        .map(|l| l.tracked_clients())
        .unwrap_or(0);

    Json(RateLimitStatus {
        enabled: config.enabled,
        max_requests: config.max_requests,
        window_secs: config.window_secs,
        tracked_clients,
    })
}
