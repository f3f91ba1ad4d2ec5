//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Bank charge:
//!     → circuit_breaker.rs (fail fast while open, count consecutive failures)
//!     → BankGateway::charge
//! ```
//!
//! Request deadlines are enforced by the HTTP layer (`TimeoutLayer`).

pub mod circuit_breaker;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitSnapshot, CircuitState};
