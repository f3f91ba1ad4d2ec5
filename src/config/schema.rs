//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the payment gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Circuit breaker guarding the bank.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Simulated bank settings.
    pub bank: BankConfig,

    /// Deprecation headers for the v1 API.
    pub legacy: LegacyConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:5000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting on payment intents.
    pub enabled: bool,

    /// Maximum admitted requests per client within one window.
    pub max_requests: u32,

    /// Length of the rolling window in seconds.
    pub window_secs: u64,

    /// How often idle client windows are purged, in seconds.
    pub sweep_interval_secs: u64,

    /// Key clients by the first `X-Forwarded-For` hop instead of the peer address.
    /// Only enable behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 3,
            window_secs: 10,
            sweep_interval_secs: 60,
            trust_forwarded_for: false,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,

    /// Time the circuit stays open before a trial call is allowed, in seconds.
    pub reset_timeout_secs: u64,
}

impl CircuitBreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout_secs: 10,
        }
    }
}

/// Simulated bank configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BankConfig {
    /// Simulated network latency per charge, in milliseconds.
    pub latency_ms: u64,

    /// Start with every charge failing (toggle at runtime via the admin API).
    pub fail_charges: bool,

    /// Base URL of the bank's customer authorization page.
    pub authorize_url: String,
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            latency_ms: 100,
            fail_charges: false,
            authorize_url: "https://bank.example.com/authorize".to_string(),
        }
    }
}

/// Deprecation metadata advertised on the v1 API.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LegacyConfig {
    /// HTTP-date sent in the `Sunset` header.
    pub sunset: String,

    /// Path of the replacement API, sent in the `Link` header.
    pub successor: String,
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            sunset: "Wed, 31 Dec 2025 23:59:59 GMT".to_string(),
            successor: "/v2/payment-intents".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the /admin routes.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 64 * 1024,
        }
    }
}
