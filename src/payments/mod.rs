//! Payment intents and legacy charges.

pub mod error;
pub mod service;
pub mod types;

pub use error::PaymentError;
pub use service::{create_legacy_charge, PaymentIntentService};
pub use types::{
    Charge, ChargeRequest, NextAction, PaymentIntentRequest, PaymentIntentResponse,
    PaymentIntentStatus, PaymentMethod, RedirectToUrl,
};
