//! Per-client rate limiting.
//!
//! A sliding log: each client key keeps the instants of its admitted requests
//! and a request is admitted only while fewer than `max_requests` of them fall
//! inside the trailing window. Rejected requests are not logged, so a client
//! hammering the endpoint does not extend its own lockout.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use crate::config::RateLimitConfig;

/// Outcome of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Admitted; `remaining` further requests fit in the current window.
    Allowed { remaining: u32 },
    /// Over quota; the oldest logged request leaves the window after `retry_after`.
    Limited { retry_after: Duration },
}

/// Sliding-window request limiter keyed by client identity.
pub struct RateLimiter {
    windows: DashMap<String, VecDeque<Instant>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests,
            window,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, config.window())
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Check and, if admitted, record one request for `key`.
    pub fn check(&self, key: &str) -> RateDecision {
        let now = Instant::now();
        // The entry guard holds the shard lock, so check-and-record is atomic per key.
        let mut entry = self.windows.entry(key.to_string()).or_default();
        let log = entry.value_mut();
        evict_expired(log, now, self.window);

        if (log.len() as u32) < self.max_requests {
            log.push_back(now);
            RateDecision::Allowed {
                remaining: self.max_requests - log.len() as u32,
            }
        } else {
            let retry_after = log
                .front()
                .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(self.window);
            RateDecision::Limited { retry_after }
        }
    }

    pub fn allow(&self, key: &str) -> bool {
        matches!(self.check(key), RateDecision::Allowed { .. })
    }

    /// Drop clients with no requests left in the window. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, log| {
            evict_expired(log, now, self.window);
            !log.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    /// Number of clients currently holding a window.
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

fn evict_expired(log: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = log.front() {
        if now.duration_since(*oldest) >= window {
            log.pop_front();
        } else {
            break;
        }
    }
}

/// Periodically purge idle client windows until shutdown.
pub async fn run_sweeper(
    limiter: Arc<RateLimiter>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = time::interval(interval);
    // The first tick fires immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let purged = limiter.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, remaining = limiter.tracked_clients(), "Purged idle rate limit windows");
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Rate limit sweeper received shutdown signal, exiting loop");
                break;
            }
        }
    }
}

/// Identify the client for quota purposes.
///
/// Uses the first `X-Forwarded-For` hop when trusted, otherwise the peer IP.
pub fn client_key(headers: &HeaderMap, peer: SocketAddr, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }
    peer.ip().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn limiter() -> RateLimiter {
        RateLimiter::new(3, Duration::from_secs(10))
    }

    #[tokio::test(start_paused = true)]
    async fn test_fourth_request_in_window_is_rejected() {
        let limiter = limiter();

        assert_eq!(limiter.check("10.0.0.1"), RateDecision::Allowed { remaining: 2 });
        assert_eq!(limiter.check("10.0.0.1"), RateDecision::Allowed { remaining: 1 });
        assert_eq!(limiter.check("10.0.0.1"), RateDecision::Allowed { remaining: 0 });
        assert_eq!(
            limiter.check("10.0.0.1"),
            RateDecision::Limited { retry_after: Duration::from_secs(10) }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let limiter = limiter();

        for _ in 0..3 {
            assert!(limiter.allow("c"));
            time::advance(Duration::from_secs(3)).await;
        }
        // t=9: requests at 0, 3, 6 are all still inside the window.
        assert_eq!(
            limiter.check("c"),
            RateDecision::Limited { retry_after: Duration::from_secs(1) }
        );

        // t=10: the request at t=0 has left the window, one slot frees up.
        time::advance(Duration::from_secs(1)).await;
        assert!(limiter.allow("c"));
        assert!(!limiter.allow("c"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejections_do_not_extend_lockout() {
        let limiter = limiter();
        for _ in 0..3 {
            assert!(limiter.allow("c"));
        }
        for _ in 0..5 {
            time::advance(Duration::from_secs(1)).await;
            assert!(!limiter.allow("c"));
        }

        time::advance(Duration::from_secs(5)).await;
        assert_eq!(limiter.check("c"), RateDecision::Allowed { remaining: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let limiter = limiter();
        for _ in 0..3 {
            assert!(limiter.allow("a"));
        }
        assert!(!limiter.allow("a"));
        assert!(limiter.allow("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let limiter = limiter();
        limiter.allow("old");
        time::advance(Duration::from_secs(6)).await;
        limiter.allow("fresh");
        assert_eq!(limiter.tracked_clients(), 2);

        time::advance(Duration::from_secs(5)).await;
        assert_eq!(limiter.purge_expired(), 1);
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_checks_never_exceed_quota() {
        let limiter = Arc::new(limiter());
        let mut tasks = Vec::new();
        for _ in 0..20 {
            let limiter = limiter.clone();
            tasks.push(tokio::spawn(async move { limiter.allow("shared") }));
        }

        let mut admitted = 0;
        for task in tasks {
            if task.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 3);
    }

    #[test]
    fn test_client_key() {
        let peer: SocketAddr = "192.168.1.5:40000".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));

        assert_eq!(client_key(&headers, peer, false), "192.168.1.5");
        assert_eq!(client_key(&headers, peer, true), "203.0.113.7");
        assert_eq!(client_key(&HeaderMap::new(), peer, true), "192.168.1.5");
    }
}
