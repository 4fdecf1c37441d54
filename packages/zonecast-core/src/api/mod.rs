//! HTTP/WebSocket API layer.
//!
//! Thin handlers that delegate to services. The facade is the only
//! externally visible surface of the bridge: snapshot queries, selection
//! commands, the controller event ingest, hosted images and the event push
//! socket.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast;

use crate::cast::CastService;
use crate::config::Config;
use crate::context::NetworkContext;
use crate::controller::ControllerState;
use crate::events::{BroadcastEvent, BroadcastEventBridge};
use crate::images::ImageStore;

pub mod http;
pub mod ws;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared application state for the API layer.
///
/// A thin wrapper over service references; all business logic lives in the
/// services themselves.
#[derive(Clone)]
pub struct AppState {
    /// Receiver selection and discovery.
    pub cast: Arc<CastService>,
    /// Controller-boundary state and event routing.
    pub controller: Arc<ControllerState>,
    /// Hosted artwork store.
    pub images: Arc<ImageStore>,
    /// Broadcast channel sender for real-time events.
    pub broadcast_tx: broadcast::Sender<BroadcastEvent>,
    /// Event bridge for emitting events to WebSocket clients.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Network configuration (port, advertise IP).
    pub network: NetworkContext,
    /// Application configuration.
    pub config: Arc<Config>,
}

/// Starts the HTTP server on the configured port.
pub async fn start_server(state: AppState) -> Result<(), ServerError> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], state.config.preferred_port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let port = listener.local_addr()?.port();
    state.network.set_port(port);

    log::info!("Server listening on http://0.0.0.0:{}", port);
    let app = http::create_router(state);
    axum::serve(listener, app).await?;
    Ok(())
}
