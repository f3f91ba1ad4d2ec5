//! Simulated bank used in place of a real acquirer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::bank::{BankError, BankGateway, ChargeResult, ChargeStatus};
use crate::config::BankConfig;

/// Bank stub with fixed latency and a runtime failure switch.
#[derive(Debug)]
pub struct SimulatedBank {
    latency: Duration,
    failing: AtomicBool,
    charges: AtomicU64,
}

impl SimulatedBank {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            failing: AtomicBool::new(false),
            charges: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &BankConfig) -> Self {
        let bank = Self::new(Duration::from_millis(config.latency_ms));
        bank.set_failing(config.fail_charges);
        bank
    }

    /// Make every subsequent charge fail with [`BankError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn is_failing(&self) -> bool {
        self.failing.load(Ordering::SeqCst)
    }

    /// Charges attempted so far, successful or not.
    pub fn charge_count(&self) -> u64 {
        self.charges.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BankGateway for SimulatedBank {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn charge(&self, amount: i64, currency: &str) -> Result<ChargeResult, BankError> {
        self.charges.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;

        if self.is_failing() {
            tracing::warn!(amount, currency, "Simulated bank failure");
            return Err(BankError::Unavailable(
                "Bank API Timeout / Connection Error".to_string(),
            ));
        }

        let transaction_id = format!("txn_{}", rand::thread_rng().gen_range(1000..=9999));
        tracing::debug!(amount, currency, transaction_id = %transaction_id, "Simulated charge succeeded");

        Ok(ChargeResult {
            transaction_id,
            status: ChargeStatus::Success,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_charge_succeeds_after_latency() {
        let bank = SimulatedBank::new(Duration::from_millis(100));
        let started = Instant::now();

        let result = bank.charge(500, "usd").await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_millis(100));
        assert_eq!(result.status, ChargeStatus::Success);
        assert!(result.transaction_id.starts_with("txn_"));
        assert_eq!(result.transaction_id.len(), "txn_1234".len());
        assert_eq!(bank.charge_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_toggle() {
        let bank = SimulatedBank::new(Duration::from_millis(100));
        bank.set_failing(true);

        let err = bank.charge(500, "usd").await.unwrap_err();
        assert!(matches!(err, BankError::Unavailable(_)));

        bank.set_failing(false);
        assert!(bank.charge(500, "usd").await.is_ok());
        assert_eq!(bank.charge_count(), 2);
    }

    #[test]
    fn test_from_config() {
        let config = BankConfig {
            fail_charges: true,
            ..BankConfig::default()
        };
        assert!(SimulatedBank::from_config(&config).is_failing());
    }
}
