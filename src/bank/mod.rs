//! Outbound bank integration.
//!
//! The gateway only knows the [`BankGateway`] trait; `simulated.rs` provides
//! the stand-in used until a real acquirer is wired up.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod simulated;

pub use simulated::SimulatedBank;

/// Outcome reported by the bank for an accepted charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    Success,
    Failure,
}

/// Result of a charge request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeResult {
    pub transaction_id: String,
    pub status: ChargeStatus,
}

/// Errors raised by a bank call. Every variant counts as a breaker failure.
#[derive(Debug, Clone, Error)]
pub enum BankError {
    /// The bank could not be reached or did not answer in time.
    #[error("Bank API unavailable: {0}")]
    Unavailable(String),

    /// The bank answered but refused the charge.
    #[error("Charge declined: {0}")]
    Declined(String),
}

/// A bank capable of charging an amount in minor currency units.
#[async_trait]
pub trait BankGateway: Send + Sync {
    fn name(&self) -> &'static str;

    async fn charge(&self, amount: i64, currency: &str) -> Result<ChargeResult, BankError>;
}
