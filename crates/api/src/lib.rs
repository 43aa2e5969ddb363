//! HTTP API for Mnemo.
//!
//! This crate exposes the chat, extraction, comparison, and memory
//! management endpoints over HTTP.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /api/v1/personalities` - Available personalities
//! - `POST /api/v1/chat` - Chat turn with memory and personality
//! - `POST /api/v1/extract-memory` - Extract and persist memory
//! - `POST /api/v1/compare` - Compare replies across personalities
//! - `GET /api/v1/memory/{user}` - Read a user's merged memory
//! - `DELETE /api/v1/memory/{user}` - Delete a user's memory
//!
//! # Architecture
//!
//! ```text
//! Client
//!    │
//!    ▼
//! ┌─────────────────┐
//! │   API server    │ ◄── This crate
//! │     (Axum)      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │     Engine      │ ──► │   LLM gateway   │
//! │ extract / merge │     └─────────────────┘
//! │ store / reply   │     ┌─────────────────┐
//! │                 │ ──► │  Memory store   │
//! └─────────────────┘     └─────────────────┘
//! ```

pub mod auth;
pub mod rate_limit;
pub mod routes;
pub mod state;

use axum::{
    extract::{DefaultBodyLimit, Request},
    http::HeaderValue,
    middleware::{self, Next},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use auth::ApiKeyConfig;
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use state::AppState;

/// Create the API router with all routes configured.
pub fn create_router(state: Arc<AppState>, cors_origins: Option<Vec<String>>) -> Router {
    let cors = build_cors_layer(cors_origins);

    let mut router = Router::new()
        // Health check
        .route("/health", get(routes::health))
        // API v1
        .route("/api/v1/personalities", get(routes::personalities))
        .route("/api/v1/chat", post(routes::chat))
        .route("/api/v1/extract-memory", post(routes::extract_memory))
        .route("/api/v1/compare", post(routes::compare))
        .route(
            "/api/v1/memory/{user}",
            get(routes::get_memory).delete(routes::delete_memory),
        )
        // Middleware
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_middleware,
        ))
        .layer(DefaultBodyLimit::max(
            state.rate_limiter.config().max_body_size,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state.clone());

    // Authentication wraps everything else so unauthenticated requests
    // are rejected before any work happens.
    if let Some(api_key) = state.api_key.clone() {
        router = router.layer(middleware::from_fn(
            move |request: Request, next: Next| {
                let config = api_key.clone();
                async move { auth::api_key_auth(config, request, next).await }
            },
        ));
    }

    router
}

fn build_cors_layer(cors_origins: Option<Vec<String>>) -> CorsLayer {
    match cors_origins {
        Some(origins) if !origins.iter().any(|o| o == "*") => {
            let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
        _ => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    }
}

/// Start the API server on the given address.
pub async fn serve(
    state: Arc<AppState>,
    addr: SocketAddr,
    cors_origins: Option<Vec<String>>,
) -> anyhow::Result<()> {
    let router = create_router(state, cors_origins);

    info!(%addr, "Starting Mnemo API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // ConnectInfo is required for IP-based rate limiting.
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
