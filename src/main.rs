#![forbid(unsafe_code)]

use anyhow::Result;
use roomcast::config::ServerConfig;
use roomcast::metrics::ServerMetrics;
use roomcast::room::RoomRegistry;
use roomcast::server::ChatServer;
use roomcast::users::UserStore;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roomcast=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("roomcast - starting server");

    let config = ServerConfig::from_env();
    let port = config.port;

    let registry = Arc::new(RoomRegistry::new(config.max_queue_size));
    let users = Arc::new(UserStore::new());
    let metrics = ServerMetrics::new();

    let server = ChatServer::new(registry, users, metrics, config);

    tokio::select! {
        result = server.serve(port) => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}
