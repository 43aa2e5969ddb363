//! Rate limiting middleware for API endpoints.

use crate::AppState;
use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Configuration for rate limiting.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u32,
    /// Window duration.
    pub window: Duration,
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,               // 100 requests
            window: Duration::from_secs(60), // per minute
            max_body_size: 1024 * 1024,      // 1 MB max body
        }
    }
}

const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Thread-safe rate limiter using a sliding window per client IP.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    entries: RwLock<HashMap<IpAddr, Vec<Instant>>>,
    last_cleanup: RwLock<Instant>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given configuration.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            last_cleanup: RwLock::new(Instant::now()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check if a request from the given IP should be allowed.
    ///
    /// Returns `true` if allowed, `false` if rate limited.
    pub fn check_request(&self, ip: IpAddr) -> bool {
        self.maybe_cleanup();

        let mut entries = self.entries.write();
        let requests = entries.entry(ip).or_default();

        let cutoff = Instant::now() - self.config.window;
        requests.retain(|t| *t > cutoff);

        if requests.len() >= self.config.max_requests as usize {
            return false;
        }

        requests.push(Instant::now());
        true
    }

    /// Drop IPs whose whole window has expired so the map cannot grow
    /// without bound.
    fn maybe_cleanup(&self) {
        {
            let last = self.last_cleanup.read();
            if last.elapsed() < CLEANUP_INTERVAL {
                return;
            }
        }

        let mut last = self.last_cleanup.write();
        if last.elapsed() < CLEANUP_INTERVAL {
            return;
        }
        *last = Instant::now();

        let cutoff = Instant::now() - self.config.window;
        let mut entries = self.entries.write();
        entries.retain(|_, requests| requests.iter().any(|t| *t > cutoff));
    }
}

/// Error response for rate-limited requests.
#[derive(Debug, serde::Serialize)]
struct RateLimitError {
    error: String,
    code: &'static str,
}

/// Per-IP rate limiting middleware.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.rate_limiter.check_request(addr.ip()) {
        warn!(ip = %addr.ip(), "Rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(RateLimitError {
                error: "Too many requests, slow down".into(),
                code: "RATE_LIMITED",
            }),
        )
            .into_response();
    }

    next.run(request).await
}
