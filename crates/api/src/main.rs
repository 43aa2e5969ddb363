//! Mnemo API server binary.
//!
//! Usage:
//!   mnemo-api --config config.toml
//!   mnemo-api --port 8080
//!   mnemo-api --port 8080 --bind 0.0.0.0
//!   mnemo-api --store sqlite --db-path ./data/memory.db
//!
//! # Environment Variables
//!
//! - `MNEMO_API_KEY` - API authentication key (recommended)
//! - `MNEMO_BIND_ADDR` - Server bind address (default: 127.0.0.1)
//! - `MNEMO_CORS_ORIGINS` - CORS allowed origins (comma-separated)
//! - `GEMINI_API_KEY` - Gemini API key for extraction/generation
//! - `OPENAI_API_KEY` - OpenAI API key (openai provider)

use mnemo_api::{serve, ApiKeyConfig, AppState};
use mnemo_engine::EngineConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mnemo_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command line arguments (simple for now)
    let args: Vec<String> = std::env::args().collect();
    let mut port: u16 = 8080;
    let mut config_path: Option<String> = None;
    let mut bind_addr: Option<String> = None;
    let mut store_backend: Option<String> = None;
    let mut db_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    port = args[i + 1]
                        .parse()
                        .map_err(|_| anyhow::anyhow!("Invalid port number: {}", args[i + 1]))?;
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    bind_addr = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--store" | "-s" => {
                if i + 1 < args.len() {
                    store_backend = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--db-path" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    store_backend.get_or_insert_with(|| "sqlite".to_string());
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Mnemo API Server");
                println!();
                println!("Usage: mnemo-api [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -p, --port <PORT>      Port to listen on (default: 8080)");
                println!(
                    "  -b, --bind <ADDR>      Bind address (default: 127.0.0.1, env: MNEMO_BIND_ADDR)"
                );
                println!("  -c, --config <FILE>    Path to config.toml file");
                println!("  -s, --store <BACKEND>  Memory store backend: memory | sqlite");
                println!("      --db-path <FILE>   Path to the SQLite database (implies --store sqlite)");
                println!("  -h, --help             Show this help message");
                println!();
                println!("Environment variables:");
                println!("  MNEMO_API_KEY          API authentication key (recommended for production)");
                println!("  MNEMO_BIND_ADDR        Server bind address (overridden by --bind flag)");
                println!("  MNEMO_CORS_ORIGINS     CORS allowed origins (comma-separated)");
                println!("  GEMINI_API_KEY         Gemini API key");
                println!("  OPENAI_API_KEY         OpenAI API key (openai provider)");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    // Determine bind address (CLI flag > env var > default 127.0.0.1)
    let host = bind_addr
        .or_else(|| std::env::var("MNEMO_BIND_ADDR").ok())
        .unwrap_or_else(|| "127.0.0.1".to_string());

    if host == "0.0.0.0" {
        tracing::warn!(
            "Server binding to 0.0.0.0 — this exposes the API to all network interfaces. \
             Ensure authentication is configured (MNEMO_API_KEY) and a firewall is in place."
        );
    }

    let api_key = std::env::var("MNEMO_API_KEY").ok();
    if api_key.is_none() {
        tracing::warn!(
            "MNEMO_API_KEY not set — API will run without authentication. \
             This is acceptable for local development but NOT for production. \
             Set MNEMO_API_KEY to enable bearer token authentication."
        );
    }

    let cors_origins: Option<Vec<String>> = std::env::var("MNEMO_CORS_ORIGINS")
        .ok()
        .map(|s| s.split(',').map(|o| o.trim().to_string()).collect());

    // Load engine configuration
    let mut config = if let Some(path) = config_path {
        tracing::info!(path = %path, "Loading configuration");
        EngineConfig::from_file(&path)?
    } else {
        tracing::info!("Using default configuration");
        EngineConfig::default()
    };

    // CLI flags override the config file's store section
    if let Some(backend) = store_backend {
        config.store.backend = backend;
    }
    if let Some(path) = db_path {
        config.store.db_path = path;
    }

    tracing::info!(
        provider = %config.provider.provider,
        model = %config.provider.model,
        store = %config.store.backend,
        "Initializing engine"
    );

    let mut state = AppState::from_config(&config)?;

    if let Some(key) = api_key {
        state = state.with_api_key(ApiKeyConfig::new(key));
        tracing::info!("API key authentication enabled");
    }

    // Start server
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    serve(Arc::new(state), addr, cors_origins).await?;

    Ok(())
}
