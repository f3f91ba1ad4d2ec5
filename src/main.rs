//! PayFast API gateway.
//!
//! ```text
//!   client ──▶ request id / trace / timeout / body limit
//!                 │
//!                 ▼
//!          rate limiter (per client) ──▶ 429
//!                 │
//!                 ▼
//!          validation ──▶ 400
//!                 │
//!                 ▼
//!          circuit breaker ──▶ 503 ─┐
//!                 │                 │
//!                 ▼                 │
//!            bank.charge ──▶ 502 ───┘ (counts toward the threshold)
//!                 │
//!                 ▼
//!          requires_action + redirect
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use payfast_gateway::config::{load_config, GatewayConfig};
use payfast_gateway::lifecycle::{wait_for_signal, Shutdown};
use payfast_gateway::observability::{logging, metrics};
use payfast_gateway::HttpServer;

#[derive(Parser)]
#[command(name = "payfast-gateway", version)]
#[command(about = "Payment gateway with rate limiting and a bank circuit breaker")]
struct Args {
    /// Path to a TOML config file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "payfast-gateway starting");

    match &args.config {
        Some(path) => tracing::info!(path = %path.display(), "Configuration loaded"),
        None => tracing::info!("No config file given, using defaults"),
    }

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr);
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config)?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        wait_for_signal().await;
        shutdown.trigger();
    });

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
