#![cfg(not(tarpaulin_include))]

use service_dashboard::app;
use service_dashboard::config::Config;
use std::env;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the web application
///
/// Reads `.env` if present, sets up logging from `RUST_LOG` (default `info`)
/// and serves the dashboard until the process is stopped.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting service dashboard...");

    let config = Config::from_env()?;
    app::run(config).await
}
