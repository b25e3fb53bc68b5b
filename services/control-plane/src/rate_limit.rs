//! Per-IP sliding-window rate limiting for the pairing endpoints (§4.H).
//! No crate in this stack's dependency tree does this, so it's hand-rolled
//! in the stack's own `Arc<RwLock<HashMap<..>>>` idiom — the same shape
//! `state.rs` uses for every other shared in-memory map.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Clone)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    hits: Arc<RwLock<HashMap<IpAddr, Vec<Instant>>>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            hits: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns `true` if the request is allowed and records it; `false` if
    /// the caller is over the limit for this window.
    pub async fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut hits = self.hits.write().await;
        let entry = hits.entry(ip).or_default();
        entry.retain(|instant| now.duration_since(*instant) < self.window);
        if entry.len() as u32 >= self.max_requests {
            return false;
        }
        entry.push(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))
    }

    #[tokio::test]
    async fn allows_requests_up_to_the_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.check(ip()).await);
        assert!(limiter.check(ip()).await);
        assert!(limiter.check(ip()).await);
        assert!(!limiter.check(ip()).await);
    }

    #[tokio::test]
    async fn different_ips_have_independent_budgets() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))).await);
        assert!(limiter.check(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2))).await);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_recovers_once_the_window_elapses() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check(ip()).await);
        assert!(!limiter.check(ip()).await);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.check(ip()).await);
    }
}
