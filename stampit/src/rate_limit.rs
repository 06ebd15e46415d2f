//! Per-client request limiting for the stamping endpoints.
//!
//! Every client has two sliding windows, a long one and a short burst
//! window. A request is admitted only if both windows have room; admitted
//! requests are recorded in both.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

use crate::config::RateLimitConfig;

/// Client identity used when no forwarding header is present.
pub const ANONYMOUS_CLIENT: &str = "anon";

/// Derive the client identity from an `x-forwarded-for` header value.
pub fn client_key(forwarded_for: Option<&str>) -> String {
    forwarded_for
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or(ANONYMOUS_CLIENT)
        .to_string()
}

/// Request history of the clients, most recent last.
type Windows = HashMap<String, VecDeque<Instant>>;

/// An in-memory sliding window rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Arc<Mutex<Windows>>,
}

impl RateLimiter {
    /// Create a limiter with no recorded requests.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record a request from `client` now, returning whether it is allowed.
    pub async fn check(&self, client: &str) -> bool {
        self.check_at(client, Instant::now()).await
    }

    /// Record a request from `client` at `now`, returning whether it is
    /// allowed. Rejected requests are not recorded.
    pub async fn check_at(&self, client: &str, now: Instant) -> bool {
        let mut windows = self.windows.lock().await;

        // Requests older than the long window can never count again.
        windows.retain(|_, history| {
            prune(history, now, self.config.window);
            !history.is_empty()
        });

        let history = windows.entry(client.to_string()).or_default();
        let in_burst = history
            .iter()
            .filter(|at| now.saturating_duration_since(**at) < self.config.burst_window)
            .count();

        if history.len() >= self.config.window_limit || in_burst >= self.config.burst_limit {
            tracing::debug!(%client, recent = history.len(), in_burst, "request rate limited");
            return false;
        }

        history.push_back(now);
        true
    }

    /// The number of clients with requests inside the long window.
    pub async fn tracked_clients(&self) -> usize {
        self.windows.lock().await.len()
    }
}

fn prune(history: &mut VecDeque<Instant>, now: Instant, window: std::time::Duration) {
    while history
        .front()
        .is_some_and(|at| now.saturating_duration_since(*at) >= window)
    {
        history.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use test_case::test_case;

    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            window: Duration::from_secs(60),
            window_limit: 60,
            burst_window: Duration::from_secs(10),
            burst_limit: 15,
        })
    }

    #[test_case(None => "anon"; "no header")]
    #[test_case(Some("") => "anon"; "empty header")]
    #[test_case(Some("203.0.113.7") => "203.0.113.7"; "single address")]
    #[test_case(Some(" 203.0.113.7 , 10.0.0.1") => "203.0.113.7"; "first of many")]
    fn client_identity(header: Option<&str>) -> String {
        client_key(header)
    }

    #[tokio::test]
    async fn burst_limit_applies_within_ten_seconds() {
        let limiter = limiter();
        let start = Instant::now();

        for i in 0..15 {
            assert!(limiter.check_at("a", start + Duration::from_millis(i * 100)).await);
        }
        assert!(!limiter.check_at("a", start + Duration::from_secs(2)).await);

        // Other clients are unaffected.
        assert!(limiter.check_at("b", start + Duration::from_secs(2)).await);

        // Once the burst window slides past, requests are admitted again.
        assert!(limiter.check_at("a", start + Duration::from_secs(11)).await);
    }

    #[tokio::test]
    async fn window_limit_applies_within_a_minute() {
        let limiter = limiter();
        let start = Instant::now();

        // One request per second stays under the burst limit.
        for i in 0..60 {
            assert!(limiter.check_at("a", start + Duration::from_secs(i)).await);
        }
        assert!(!limiter.check_at("a", start + Duration::from_millis(59_500)).await);
        assert!(limiter.check_at("a", start + Duration::from_secs(61)).await);
    }

    #[tokio::test]
    async fn stale_clients_are_pruned() {
        let limiter = limiter();
        let start = Instant::now();

        assert!(limiter.check_at("a", start).await);
        assert!(limiter.check_at("b", start).await);
        assert_eq!(limiter.tracked_clients().await, 2);

        assert!(limiter.check_at("c", start + Duration::from_secs(120)).await);
        assert_eq!(limiter.tracked_clients().await, 1);
    }
}
