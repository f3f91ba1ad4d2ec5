//! Payment intent wire types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of `POST /v2/payment-intents`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentIntentRequest {
    /// Amount in minor currency units. Required; optional here so a missing
    /// field surfaces as a validation error rather than a parse error.
    #[serde(default)]
    pub amount: Option<i64>,

    /// ISO currency code, defaults to "usd".
    #[serde(default)]
    pub currency: Option<String>,

    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,

    /// Where the bank should send the customer after authorization.
    #[serde(default)]
    pub return_url: Option<String>,
}

/// A payment method, either a stored method id (`"card_1"`) or inline details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PaymentMethod {
    Id(String),
    Details(Map<String, Value>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentStatus {
    RequiresPaymentMethod,
    RequiresAction,
}

/// A staged payment, Stripe style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntentResponse {
    pub id: String,
    /// Always `"payment_intent"`.
    pub object: String,
    pub amount: i64,
    pub currency: String,
    pub client_secret: String,
    pub status: PaymentIntentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action: Option<NextAction>,
}

/// What the client must do to complete the payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextAction {
    /// Always `"redirect_to_url"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub redirect_to_url: RedirectToUrl,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedirectToUrl {
    /// Bank authorization page for this transaction.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
}

/// Body of the deprecated `POST /v1/charges`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChargeRequest {
    #[serde(default)]
    pub amount: Option<i64>,
}

/// Synchronous charge returned by the v1 API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Charge {
    pub id: String,
    /// Always `"charge"`.
    pub object: String,
    pub amount: i64,
    pub status: String,
    pub description: String,
}
