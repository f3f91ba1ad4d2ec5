//! PayFast API gateway library.
//!
//! Payment intents are created through a per-client rate limiter and charged
//! against the bank through a circuit breaker.

pub mod admin;
pub mod bank;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod payments;
pub mod resilience;
pub mod security;

pub use config::schema::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
