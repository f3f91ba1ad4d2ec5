//! Deprecated v1 API.
//!
//! Every response under `/v1` advertises its retirement with `Deprecation`,
//! `Sunset` and a `Link` to the successor endpoint.

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::post;
use axum::{Json, Router};

use crate::config::LegacyConfig;
use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::payments::{create_legacy_charge, Charge, ChargeRequest};

const DEPRECATION: HeaderName = HeaderName::from_static("deprecation");
const SUNSET: HeaderName = HeaderName::from_static("sunset");

/// Pre-rendered lifecycle headers.
#[derive(Clone)]
pub struct DeprecationHeaders {
    sunset: Option<HeaderValue>,
    link: Option<HeaderValue>,
}

impl DeprecationHeaders {
    pub fn from_config(config: &LegacyConfig) -> Self {
        let sunset = HeaderValue::from_str(&config.sunset).ok();
        let link =
            HeaderValue::from_str(&format!("<{}>; rel=\"successor-version\"", config.successor)).ok();
        if sunset.is_none() || link.is_none() {
            tracing::warn!("Legacy sunset/successor settings are not valid header values; omitting them");
        }
        Self { sunset, link }
    }
}

pub fn router(config: &LegacyConfig) -> Router<AppState> {
    Router::new()
        .route("/v1/charges", post(create_charge))
        .layer(middleware::from_fn_with_state(
            DeprecationHeaders::from_config(config),
            deprecation_headers,
        ))
}

async fn deprecation_headers(
    State(headers): State<DeprecationHeaders>,
    request: Request<Body>,
    next: Next,
) -> Response {
    tracing::warn!(path = %request.uri().path(), "Deprecated v1 API called");

    let mut response = next.run(request).await;
    let out = response.headers_mut();
    out.insert(DEPRECATION, HeaderValue::from_static("true"));
    if let Some(sunset) = headers.sunset {
        out.insert(SUNSET, sunset);
    }
    if let Some(link) = headers.link {
        out.insert(axum::http::header::LINK, link);
    }
    response
}

/// `POST /v1/charges`
async fn create_charge(
    payload: Result<Json<ChargeRequest>, JsonRejection>,
) -> Result<Json<Charge>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(create_legacy_charge(request)?))
}
