//! Payment intent orchestration.
//!
//! ```text
//! request
//!     → rate limiter (per client)      → RateLimited
//!     → validation                     → Validation
//!     → no payment method?             → requires_payment_method
//!     → breaker.execute(bank.charge)   → CircuitOpen | Bank
//!     → requires_action + next_action
//! ```

use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::Rng;
use url::Url;
use uuid::Uuid;

use crate::bank::{BankError, BankGateway, ChargeResult, ChargeStatus};
use crate::observability::metrics;
use crate::payments::error::PaymentError;
use crate::payments::types::{
    Charge, ChargeRequest, NextAction, PaymentIntentRequest, PaymentIntentResponse,
    PaymentIntentStatus, PaymentMethod, RedirectToUrl,
};
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::security::rate_limit::{RateDecision, RateLimiter};

const DEFAULT_CURRENCY: &str = "usd";

/// A request that passed validation.
#[derive(Debug)]
struct ValidatedIntent {
    amount: i64,
    currency: String,
    payment_method: Option<PaymentMethod>,
    return_url: Option<Url>,
}

/// Creates payment intents, charging the bank through the circuit breaker.
#[derive(Clone)]
pub struct PaymentIntentService {
    bank: Arc<dyn BankGateway>,
    breaker: Arc<CircuitBreaker>,
    limiter: Option<Arc<RateLimiter>>,
    authorize_url: Url,
}

impl PaymentIntentService {
    /// `limiter` is `None` when rate limiting is disabled.
    pub fn new(
        bank: Arc<dyn BankGateway>,
        breaker: Arc<CircuitBreaker>,
        limiter: Option<Arc<RateLimiter>>,
        authorize_url: Url,
    ) -> Self {
        Self {
            bank,
            breaker,
            limiter,
            authorize_url,
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.limiter.as_ref()
    }

    /// Quota check followed by [`process`](Self::process).
    pub async fn create_payment_intent(
        &self,
        client_key: &str,
        request: PaymentIntentRequest,
    ) -> Result<PaymentIntentResponse, PaymentError> {
        self.admit(client_key)?;
        self.process(request).await
    }

    /// Count one attempt against `client_key`'s quota.
    pub fn admit(&self, client_key: &str) -> Result<(), PaymentError> {
        let Some(limiter) = &self.limiter else {
            return Ok(());
        };

        match limiter.check(client_key) {
            RateDecision::Allowed { .. } => Ok(()),
            RateDecision::Limited { retry_after } => {
                tracing::warn!(client = %client_key, "Rate limit exceeded");
                metrics::record_rate_limited("payment_intents");
                Err(PaymentError::RateLimited {
                    retry_after,
                    limit: limiter.max_requests(),
                    window_secs: limiter.window().as_secs(),
                })
            }
        }
    }

    /// Validate an admitted request and charge the bank if it names a payment method.
    pub async fn process(
        &self,
        request: PaymentIntentRequest,
    ) -> Result<PaymentIntentResponse, PaymentError> {
        let intent = validate(request)?;
        let id = format!("pi_{}", Uuid::new_v4().simple());
        let client_secret = format!("{}_secret_{}", id, random_token(24));

        tracing::info!(
            intent_id = %id,
            amount = intent.amount,
            currency = %intent.currency,
            "Creating payment intent"
        );

        if intent.payment_method.is_none() {
            return Ok(PaymentIntentResponse {
                id,
                object: "payment_intent".to_string(),
                amount: intent.amount,
                currency: intent.currency,
                client_secret,
                status: PaymentIntentStatus::RequiresPaymentMethod,
                bank_transaction_id: None,
                next_action: None,
            });
        }

        let bank = self.bank.clone();
        let (amount, currency) = (intent.amount, intent.currency.clone());
        let charge = self
            .breaker
            .execute(move || async move { settle_charge(bank.as_ref(), amount, &currency).await })
            .await;

        let charge = match charge {
            Ok(charge) => {
                metrics::record_bank_call("success");
                charge
            }
            Err(e) => {
                let e = PaymentError::from(e);
                match &e {
                    PaymentError::CircuitOpen { .. } => {
                        metrics::record_bank_call("rejected");
                        tracing::warn!(intent_id = %id, "Bank circuit open, failing fast");
                    }
                    other => {
                        metrics::record_bank_call("failure");
                        tracing::error!(
                            intent_id = %id,
                            bank = self.bank.name(),
                            error = %other,
                            "Bank charge failed"
                        );
                    }
                }
                return Err(e);
            }
        };

        let next_action = self.next_action(&charge.transaction_id, intent.return_url.as_ref());

        Ok(PaymentIntentResponse {
            id,
            object: "payment_intent".to_string(),
            amount: intent.amount,
            currency: intent.currency,
            client_secret,
            status: PaymentIntentStatus::RequiresAction,
            bank_transaction_id: Some(charge.transaction_id),
            next_action: Some(next_action),
        })
    }

    fn next_action(&self, transaction_id: &str, return_url: Option<&Url>) -> NextAction {
        let mut url = self.authorize_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(transaction_id);
        }
        if let Some(return_url) = return_url {
            url.query_pairs_mut().append_pair("return_url", return_url.as_str());
        }

        NextAction {
            kind: "redirect_to_url".to_string(),
            redirect_to_url: RedirectToUrl {
                url: url.to_string(),
                return_url: return_url.map(|u| u.to_string()),
            },
        }
    }
}

/// Charge the bank, treating a reported failure status as a declined charge.
async fn settle_charge(
    bank: &dyn BankGateway,
    amount: i64,
    currency: &str,
) -> Result<ChargeResult, BankError> {
    let charge = bank.charge(amount, currency).await?;
    match charge.status {
        ChargeStatus::Success => Ok(charge),
        ChargeStatus::Failure => Err(BankError::Declined(format!(
            "{} bank reported failure for {}",
            bank.name(),
            charge.transaction_id
        ))),
    }
}

fn validate(request: PaymentIntentRequest) -> Result<ValidatedIntent, PaymentError> {
    let amount = validate_amount(request.amount)?;

    let currency = match request.currency {
        None => DEFAULT_CURRENCY.to_string(),
        Some(c) => {
            let c = c.trim().to_ascii_lowercase();
            if c.len() != 3 || !c.chars().all(|ch| ch.is_ascii_alphabetic()) {
                return Err(PaymentError::validation(
                    "currency must be a three-letter ISO code",
                ));
            }
            c
        }
    };

    let payment_method = match request.payment_method {
        Some(PaymentMethod::Id(id)) if id.trim().is_empty() => {
            return Err(PaymentError::validation("payment_method must not be empty"));
        }
        other => other,
    };

    let return_url = request
        .return_url
        .map(|raw| match Url::parse(&raw) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(url),
            _ => Err(PaymentError::validation(
                "return_url must be an absolute http(s) URL",
            )),
        })
        .transpose()?;

    Ok(ValidatedIntent {
        amount,
        currency,
        payment_method,
        return_url,
    })
}

fn validate_amount(amount: Option<i64>) -> Result<i64, PaymentError> {
    match amount {
        None => Err(PaymentError::validation("amount is required")),
        Some(a) if a <= 0 => Err(PaymentError::validation("amount must be a positive integer")),
        Some(a) => Ok(a),
    }
}

/// Handle a deprecated v1 charge. Synchronous and never touches the bank.
pub fn create_legacy_charge(request: ChargeRequest) -> Result<Charge, PaymentError> {
    let amount = validate_amount(request.amount)?;
    tracing::info!(amount, "Processing legacy v1 charge");

    Ok(Charge {
        id: format!("ch_legacy_{}", random_token(12).to_ascii_lowercase()),
        object: "charge".to_string(),
        amount,
        status: "succeeded".to_string(),
        description: "Processed via v1 (Deprecated)".to_string(),
    })
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::SimulatedBank;
    use crate::resilience::circuit_breaker::CircuitState;
    use std::time::Duration;
    use tokio::time::Instant;

    struct Fixture {
        bank: Arc<SimulatedBank>,
        service: PaymentIntentService,
    }

    fn fixture(limiter: Option<RateLimiter>) -> Fixture {
        let bank = Arc::new(SimulatedBank::new(Duration::from_millis(100)));
        let breaker = Arc::new(CircuitBreaker::new("bank", 3, Duration::from_secs(10)));
        let service = PaymentIntentService::new(
            bank.clone(),
            breaker,
            limiter.map(Arc::new),
            Url::parse("https://bank.example.com/authorize").unwrap(),
        );
        Fixture { bank, service }
    }

    fn card_request(amount: i64) -> PaymentIntentRequest {
        PaymentIntentRequest {
            amount: Some(amount),
            payment_method: Some(PaymentMethod::Id("card_1".into())),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_payment_method_skips_bank() {
        let f = fixture(None);
        let request = PaymentIntentRequest {
            amount: Some(1000),
            ..Default::default()
        };

        let intent = f.service.create_payment_intent("c", request).await.unwrap();

        assert_eq!(intent.status, PaymentIntentStatus::RequiresPaymentMethod);
        assert_eq!(intent.object, "payment_intent");
        assert_eq!(intent.currency, "usd");
        assert_eq!(intent.amount, 1000);
        assert!(intent.id.starts_with("pi_"));
        assert!(intent.client_secret.starts_with(&format!("{}_secret_", intent.id)));
        assert!(intent.bank_transaction_id.is_none());
        assert_eq!(f.bank.charge_count(), 0);
        assert_eq!(f.service.breaker().snapshot().failure_count, 0);
        assert_eq!(f.service.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_payment_method_charges_bank() {
        let f = fixture(None);
        let request = PaymentIntentRequest {
            return_url: Some("https://shop.example.com/done?order=7".into()),
            currency: Some("EUR".into()),
            ..card_request(500)
        };

        let intent = f.service.create_payment_intent("c", request).await.unwrap();

        assert_eq!(intent.status, PaymentIntentStatus::RequiresAction);
        assert_eq!(intent.currency, "eur");
        let txn = intent.bank_transaction_id.clone().unwrap();
        assert!(!txn.is_empty());
        assert_eq!(f.bank.charge_count(), 1);

        let action = intent.next_action.unwrap();
        assert_eq!(action.kind, "redirect_to_url");
        let redirect = Url::parse(&action.redirect_to_url.url).unwrap();
        assert_eq!(redirect.path(), format!("/authorize/{}", txn));
        let (key, value) = redirect.query_pairs().next().unwrap();
        assert_eq!(key, "return_url");
        assert_eq!(value, "https://shop.example.com/done?order=7");
        assert_eq!(
            action.redirect_to_url.return_url.as_deref(),
            Some("https://shop.example.com/done?order=7")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_bank_failure_then_circuit_open() {
        let f = fixture(None);
        f.bank.set_failing(true);

        for _ in 0..3 {
            let err = f.service.create_payment_intent("c", card_request(500)).await.unwrap_err();
            assert!(matches!(err, PaymentError::Bank(_)), "unexpected: {err}");
            assert!(err.to_string().contains("Bank API Timeout"));
        }

        let started = Instant::now();
        let err = f.service.create_payment_intent("c", card_request(500)).await.unwrap_err();
        assert!(matches!(err, PaymentError::CircuitOpen { .. }));
        assert_eq!(started.elapsed(), Duration::ZERO, "no gateway latency when open");
        assert_eq!(f.bank.charge_count(), 3);
    }

    /// Accepts every call but reports the charge as failed.
    struct FailureStatusBank;

    #[async_trait::async_trait]
    impl BankGateway for FailureStatusBank {
        fn name(&self) -> &'static str {
            "failure-status"
        }

        async fn charge(&self, _amount: i64, _currency: &str) -> Result<ChargeResult, BankError> {
            Ok(ChargeResult {
                transaction_id: "txn_0001".to_string(),
                status: ChargeStatus::Failure,
            })
        }
    }

    #[tokio::test]
    async fn test_failure_status_counts_as_declined() {
        let breaker = Arc::new(CircuitBreaker::new("bank", 3, Duration::from_secs(10)));
        let service = PaymentIntentService::new(
            Arc::new(FailureStatusBank),
            breaker.clone(),
            None,
            Url::parse("https://bank.example.com/authorize").unwrap(),
        );

        for _ in 0..3 {
            let err = service.create_payment_intent("c", card_request(500)).await.unwrap_err();
            match err {
                PaymentError::Bank(BankError::Declined(msg)) => {
                    assert_eq!(msg, "failure-status bank reported failure for txn_0001")
                }
                other => panic!("expected declined charge, got {other:?}"),
            }
        }

        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.snapshot().failure_count, 3);
        assert!(matches!(
            service.create_payment_intent("c", card_request(500)).await,
            Err(PaymentError::CircuitOpen { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_reset_timeout() {
        let f = fixture(None);
        f.bank.set_failing(true);
        for _ in 0..3 {
            let _ = f.service.create_payment_intent("c", card_request(500)).await;
        }
        f.bank.set_failing(false);

        tokio::time::advance(Duration::from_secs(10)).await;
        let intent = f.service.create_payment_intent("c", card_request(500)).await.unwrap();
        assert_eq!(intent.status, PaymentIntentStatus::RequiresAction);
        assert_eq!(f.service.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_counts_all_attempts() {
        let f = fixture(Some(RateLimiter::new(3, Duration::from_secs(10))));
        f.bank.set_failing(true);

        // Every admitted attempt counts, including ones that fail downstream.
        for _ in 0..3 {
            assert!(f.service.create_payment_intent("10.0.0.9", card_request(500)).await.is_err());
        }

        let err = f
            .service
            .create_payment_intent("10.0.0.9", PaymentIntentRequest { amount: Some(1), ..Default::default() })
            .await
            .unwrap_err();
        match err {
            PaymentError::RateLimited { limit, window_secs, .. } => {
                assert_eq!(limit, 3);
                assert_eq!(window_secs, 10);
            }
            other => panic!("unexpected: {other}"),
        }
        assert_eq!(f.bank.charge_count(), 3);

        assert!(f
            .service
            .create_payment_intent("10.0.0.10", PaymentIntentRequest { amount: Some(1), ..Default::default() })
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_validation() {
        let f = fixture(None);
        let cases = [
            (PaymentIntentRequest::default(), "amount is required"),
            (
                PaymentIntentRequest { amount: Some(0), ..Default::default() },
                "amount must be a positive integer",
            ),
            (
                PaymentIntentRequest { currency: Some("dollars".into()), ..card_request(5) },
                "currency must be a three-letter ISO code",
            ),
            (
                PaymentIntentRequest { payment_method: Some(PaymentMethod::Id(" ".into())), ..card_request(5) },
                "payment_method must not be empty",
            ),
            (
                PaymentIntentRequest { return_url: Some("/relative".into()), ..card_request(5) },
                "return_url must be an absolute http(s) URL",
            ),
        ];

        for (request, message) in cases {
            match f.service.create_payment_intent("c", request).await {
                Err(PaymentError::Validation(m)) => assert_eq!(m, message),
                other => panic!("expected validation error '{message}', got {other:?}"),
            }
        }
        assert_eq!(f.bank.charge_count(), 0);
    }

    #[test]
    fn test_legacy_charge() {
        let charge = create_legacy_charge(ChargeRequest { amount: Some(2500) }).unwrap();
        assert!(charge.id.starts_with("ch_legacy_"));
        assert_eq!(charge.object, "charge");
        assert_eq!(charge.status, "succeeded");

        assert!(matches!(
            create_legacy_charge(ChargeRequest { amount: None }),
            Err(PaymentError::Validation(_))
        ));
    }
}
