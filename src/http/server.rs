//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the shared breaker, limiter and bank from configuration
//! - Create the Axum router with the v2, legacy v1 and admin routes
//! - Wire up middleware (request ID, tracing, timeout, body limit, panics)
//! - Serve until the shutdown signal fires

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use url::Url;

use crate::admin::setup_admin_router;
use crate::bank::SimulatedBank;
use crate::config::validation::{validate_config, ValidationError};
use crate::config::{ConfigError, GatewayConfig};
use crate::http::error::ApiError;
use crate::http::request::{
    json_error_bodies, propagate_request_id_layer, set_request_id_layer, track_requests,
};
use crate::http::{intents, legacy};
use crate::payments::PaymentIntentService;
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::security::rate_limit::{run_sweeper, RateLimiter};

const BANNER: &str = "PayFast API Gateway is running with Rate Limiting & Circuit Breaker.";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub payments: PaymentIntentService,
    /// Concrete handle on the bank stub, so operators can flip its failure mode.
    pub bank: Arc<SimulatedBank>,
    pub config: Arc<GatewayConfig>,
}

/// HTTP server for the payment gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Validate `config` and build every shared component from it.
    pub fn new(config: GatewayConfig) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        let authorize_url = Url::parse(&config.bank.authorize_url).map_err(|e| {
            ConfigError::Validation(vec![ValidationError {
                field: "bank.authorize_url",
                message: e.to_string(),
            }])
        })?;

        let bank = Arc::new(SimulatedBank::from_config(&config.bank));
        let breaker = Arc::new(CircuitBreaker::from_config("bank", &config.circuit_breaker));
        let limiter = config
            .rate_limit
            .enabled
            .then(|| Arc::new(RateLimiter::from_config(&config.rate_limit)));

        let payments = PaymentIntentService::new(bank.clone(), breaker, limiter, authorize_url);
        let state = AppState {
            payments,
            bank,
            config: Arc::new(config),
        };

        let router = Self::build_router(state.clone());
        Ok(Self { router, state })
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Layers run bottom-up: the request ID is assigned first and the
    /// metrics middleware sees the matched route last.
    #[allow(deprecated)]
    fn build_router(state: AppState) -> Router {
        let config = state.config.clone();

        let mut router = Router::new()
            .route("/", get(root))
            .route("/v2/payment-intents", post(intents::create_payment_intent))
            .route("/payment-intents", post(intents::create_payment_intent))
            .merge(legacy::router(&config.legacy));

        if config.admin.enabled {
            router = router.merge(setup_admin_router(state.clone()));
        }

        router
            .fallback(not_found)
            .with_state(state)
            .layer(middleware::from_fn(track_requests))
            .layer(CatchPanicLayer::custom(handle_panic))
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(middleware::from_fn(json_error_bodies))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let config = &self.state.config;
        tracing::info!(
            address = %addr,
            rate_limit = config.rate_limit.enabled,
            failure_threshold = config.circuit_breaker.failure_threshold,
            reset_timeout_secs = config.circuit_breaker.reset_timeout_secs,
            admin = config.admin.enabled,
            "HTTP server starting"
        );

        if let Some(limiter) = self.state.payments.limiter() {
            tokio::spawn(run_sweeper(
                limiter.clone(),
                Duration::from_secs(config.rate_limit.sweep_interval_secs),
                shutdown.resubscribe(),
            ));
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server received shutdown signal, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// The fully layered router, without connect info.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.state.config
    }
}

/// `GET /`
async fn root() -> &'static str {
    BANNER
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic"
    };
    tracing::error!(panic = %detail, "Handler panicked");
    ApiError::Internal.into_response()
}
