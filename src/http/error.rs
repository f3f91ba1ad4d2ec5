//! Errors visible to API clients.
//!
//! Every failure leaving a handler becomes a JSON body
//! `{error, message, code, hint?}` with the matching status code.

use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::payments::PaymentError;

/// Frontend errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed or missing request fields.
    #[error("{0}")]
    Validation(String),

    #[error("Request body is too large")]
    PayloadTooLarge,

    /// The client is over its quota.
    #[error("You are sending requests too quickly. Retry in {} seconds.", retry_after_secs(.retry_after))]
    TooManyRequests {
        retry_after: Duration,
        limit: u32,
        window_secs: u64,
    },

    /// The bank circuit is open.
    #[error("The bank is temporarily unavailable. Retry in {} seconds.", retry_after_secs(.retry_after))]
    ServiceUnavailable { retry_after: Duration },

    /// The bank call itself failed.
    #[error("{0}")]
    BankError(String),

    #[error("The request did not complete in time.")]
    Timeout,

    #[error("Missing or invalid admin credentials")]
    Unauthorized,

    #[error("Endpoint does not exist. Check the URL.")]
    NotFound,

    /// Catch-all for faults that should never happen.
    #[error("An unexpected error occurred on the server.")]
    Internal,
}

/// Representation of an error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BankError(_) => StatusCode::BAD_GATEWAY,
            ApiError::Timeout => StatusCode::REQUEST_TIMEOUT,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error tag.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::PayloadTooLarge => "payload_too_large",
            ApiError::TooManyRequests { .. } => "too_many_requests",
            ApiError::ServiceUnavailable { .. } => "service_unavailable",
            ApiError::BankError(_) => "bank_error",
            ApiError::Timeout => "request_timeout",
            ApiError::Unauthorized => "unauthorized",
            ApiError::NotFound => "not_found",
            ApiError::Internal => "internal_server_error",
        }
    }

    fn hint(&self) -> Option<String> {
        match self {
            ApiError::TooManyRequests {
                limit, window_secs, ..
            } => Some(format!(
                "Rate limit policy: {} requests / {} seconds.",
                limit, window_secs
            )),
            ApiError::ServiceUnavailable { .. } => Some(
                "The circuit breaker is open after repeated bank failures; calls are rejected until it recovers."
                    .to_string(),
            ),
            _ => None,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::TooManyRequests { retry_after, .. }
            | ApiError::ServiceUnavailable { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.kind().to_string(),
            message: self.to_string(),
            code: self.status().as_u16(),
            hint: self.hint(),
        }
    }
}

/// Whole seconds for `Retry-After`, rounded up and never zero.
fn retry_after_secs(d: &Duration) -> u64 {
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    secs.max(1)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), Json(self.body())).into_response();
        if let Some(retry_after) = self.retry_after() {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(retry_after_secs(&retry_after)),
            );
        }
        response
    }
}

impl From<PaymentError> for ApiError {
    fn from(e: PaymentError) -> Self {
        match e {
            PaymentError::Validation(msg) => ApiError::Validation(msg),
            PaymentError::RateLimited {
                retry_after,
                limit,
                window_secs,
            } => ApiError::TooManyRequests {
                retry_after,
                limit,
                window_secs,
            },
            PaymentError::CircuitOpen { retry_after } => ApiError::ServiceUnavailable { retry_after },
            PaymentError::Bank(e) => ApiError::BankError(e.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::Validation(rejection.body_text())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::BankError;

    async fn body_of(response: Response) -> ErrorBody {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_rate_limited_response() {
        let err = ApiError::from(PaymentError::RateLimited {
            retry_after: Duration::from_millis(2_500),
            limit: 3,
            window_secs: 10,
        });
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "3");
        let body = body_of(response).await;
        assert_eq!(body.error, "too_many_requests");
        assert_eq!(body.code, 429);
        assert_eq!(body.hint.as_deref(), Some("Rate limit policy: 3 requests / 10 seconds."));
    }

    #[tokio::test]
    async fn test_circuit_open_response() {
        let response = ApiError::from(PaymentError::CircuitOpen {
            retry_after: Duration::ZERO,
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
        let body = body_of(response).await;
        assert_eq!(body.error, "service_unavailable");
        assert!(body.hint.is_some());
    }

    #[tokio::test]
    async fn test_bank_error_carries_message() {
        let response = ApiError::from(PaymentError::Bank(BankError::Unavailable("timeout".into())))
            .into_response();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
        let body = body_of(response).await;
        assert_eq!(body.error, "bank_error");
        assert_eq!(body.message, "Bank API unavailable: timeout");
        assert_eq!(body.code, 502);
        assert_eq!(body.hint, None);
    }

    #[test]
    fn test_retry_after_rounding() {
        assert_eq!(retry_after_secs(&Duration::ZERO), 1);
        assert_eq!(retry_after_secs(&Duration::from_secs(10)), 10);
        assert_eq!(retry_after_secs(&Duration::from_millis(9_001)), 10);
    }
}
