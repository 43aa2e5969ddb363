//! Application state for the API server.

use crate::auth::ApiKeyConfig;
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use mnemo_engine::{Engine, EngineConfig};

/// Shared application state for the API server.
pub struct AppState {
    /// The engine that runs the extract / merge / store / generate flow
    pub engine: Engine,

    /// Optional bearer-token authentication
    pub api_key: Option<ApiKeyConfig>,

    /// Per-IP request limiter
    pub rate_limiter: RateLimiter,

    /// Server start time (for health checks)
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            api_key: None,
            rate_limiter: RateLimiter::new(RateLimitConfig::default()),
            start_time: std::time::Instant::now(),
        }
    }

    /// Create application state from an engine configuration.
    pub fn from_config(config: &EngineConfig) -> mnemo_common::Result<Self> {
        Ok(Self::new(Engine::from_config(config)?))
    }

    /// Enable bearer-token authentication.
    pub fn with_api_key(mut self, config: ApiKeyConfig) -> Self {
        self.api_key = Some(config);
        self
    }

    /// Replace the default rate-limit configuration.
    pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limiter = RateLimiter::new(config);
        self
    }

    /// Get the uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
