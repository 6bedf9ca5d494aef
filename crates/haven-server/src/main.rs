//! # Haven Server
//!
//! Realtime chat and call signaling server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! haven
//!
//! # Run with environment variables
//! HAVEN_PORT=3001 HAVEN_HOST=0.0.0.0 haven
//! ```
//!
//! Configuration is also read from `haven.toml` if present.

mod config;
mod handlers;
mod history;
mod metrics;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "haven=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Haven server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
