//! urlpulse - URL availability dashboard server.

use urlpulse::config::ServerConfig;
use urlpulse::db::Store;
use urlpulse::probe::Prober;
use urlpulse::web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("urlpulse=info".parse()?))
        .init();

    // Load configuration; an out-of-range default timeout is a startup error
    let cfg = ServerConfig::load();
    urlpulse::probe::validate_timeout(cfg.default_timeout_secs)?;
    tracing::info!("Starting urlpulse on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    // Shared HTTP prober
    let prober = Prober::new()?;

    // Start web server
    let server = Server::new(cfg, store, prober);
    server.start().await?;

    Ok(())
}
