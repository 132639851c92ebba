mod api;
mod config;
mod curriculum;
mod error;
mod profile;
mod progress;
mod subscription;
mod tier;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::parse();

    tracing::info!(
        "Starting tactics-core HTTP server on {}",
        config.addr()
    );
    api::run_http_server(config).await
}
