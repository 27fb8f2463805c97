//! Cascade Server
//!
//! Self-hosted API server streaming workflow execution over WebSocket.

use cascade_server::{start_server, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let config = ServerConfig {
        port,
        ..Default::default()
    };

    start_server(config).await
}
