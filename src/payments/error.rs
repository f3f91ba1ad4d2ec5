//! Payment domain errors.

use std::time::Duration;

use thiserror::Error;

use crate::bank::BankError;
use crate::resilience::circuit_breaker::CircuitBreakerError;

/// Reasons a payment request did not produce an intent or charge.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The request body is missing or has invalid fields.
    #[error("{0}")]
    Validation(String),

    /// The client exceeded its request quota.
    #[error("Too many requests: limit is {limit} requests per {window_secs} seconds")]
    RateLimited {
        retry_after: Duration,
        limit: u32,
        window_secs: u64,
    },

    /// The bank circuit is open; the bank was not called.
    #[error("Bank service is temporarily unavailable")]
    CircuitOpen { retry_after: Duration },

    /// The bank was called and failed.
    #[error(transparent)]
    Bank(#[from] BankError),
}

impl PaymentError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<CircuitBreakerError<BankError>> for PaymentError {
    fn from(e: CircuitBreakerError<BankError>) -> Self {
        match e {
            CircuitBreakerError::Open { retry_after } => PaymentError::CircuitOpen { retry_after },
            CircuitBreakerError::Inner(e) => PaymentError::Bank(e),
        }
    }
}
