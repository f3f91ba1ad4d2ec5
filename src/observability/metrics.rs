//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by route, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_rate_limited_total` (counter): quota rejections
//! - `gateway_bank_calls_total` (counter): bank charges by outcome
//! - `gateway_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `gateway_circuit_rejections_total` (counter): fail-fast rejections
//!
//! The recorder is global; until `init_metrics` runs every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(route: &str, status: u16, start: Instant) {
    let status = status.to_string();
    counter!("gateway_requests_total", "route" => route.to_string(), "status" => status.clone())
        .increment(1);
    histogram!("gateway_request_duration_seconds", "route" => route.to_string(), "status" => status)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(route: &str) {
    counter!("gateway_rate_limited_total", "route" => route.to_string()).increment(1);
}

pub fn record_bank_call(outcome: &'static str) {
    counter!("gateway_bank_calls_total", "outcome" => outcome).increment(1);
}

pub fn record_circuit_state(name: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    gauge!("gateway_circuit_state", "breaker" => name.to_string()).set(value);
}

pub fn record_circuit_rejection(name: &str) {
    counter!("gateway_circuit_rejections_total", "breaker" => name.to_string()).increment(1);
}
