//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming payment intent:
//!     → rate_limit.rs (per-client sliding window quota)
//!     → Pass to the payment intent service
//! ```
//!
//! Body size limits are enforced by the HTTP layer (`RequestBodyLimitLayer`).

pub mod rate_limit;

pub use rate_limit::{client_key, RateDecision, RateLimiter};
