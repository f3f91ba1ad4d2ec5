//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use payfast_gateway::config::GatewayConfig;
use payfast_gateway::http::HttpServer;
use payfast_gateway::lifecycle::Shutdown;
use tokio::net::TcpListener;

pub const ADMIN_KEY: &str = "test-admin-key";

/// A running gateway on an ephemeral port. Shuts down on drop.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn admin(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(ADMIN_KEY)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Config with a fast bank and the admin API enabled.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.bank.latency_ms = 5;
    config.admin.enabled = true;
    config.admin.api_key = ADMIN_KEY.to_string();
    config
}

pub async fn start_gateway(config: GatewayConfig) -> TestGateway {
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config).unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    TestGateway {
        addr,
        client,
        shutdown,
    }
}
