//! # Tutorline Server
//!
//! HTTP and WebSocket front end of the Tutorline chat hub.
//!
//! - REST endpoints for accounts, chat lists and message history
//! - WebSocket ingress that authenticates clients and attaches them to the hub
//! - In-memory or PostgreSQL storage
//! - Prometheus metrics

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod state;
pub mod store;

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::{error, info};
use tutorline_core::{Hub, HubConfig};

pub use crate::config::Config;
pub use crate::state::AppState;
pub use crate::store::Storage;

const HUB_SAMPLE_PERIOD: Duration = Duration::from_secs(5);

/// Serve the application on an already bound listener.
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let app = api::router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if storage cannot be opened or the server fails to start.
pub async fn run(config: Config) -> Result<()> {
    let storage = Storage::open(&config.storage).await?;
    let hub = Hub::spawn(HubConfig::default());

    // Start metrics server if enabled
    if config.metrics.enabled {
        match crate::metrics::start_metrics_server(config.metrics.port) {
            Ok(()) => crate::metrics::spawn_hub_sampler(hub.clone(), HUB_SAMPLE_PERIOD),
            Err(e) => error!("Failed to start metrics server: {}", e),
        }
    }

    let addr = config.bind_addr()?;
    let websocket_path = config.transport.websocket_path.clone();
    let state = AppState::new(config, storage, hub);

    let listener = TcpListener::bind(addr).await?;
    info!("Tutorline server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}{}", addr, websocket_path);

    serve(listener, state).await
}
