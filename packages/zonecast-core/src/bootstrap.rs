//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::api::AppState;
use crate::artwork::SupplementalArtClient;
use crate::cast::dispatcher::{spawn_dispatcher, DispatcherConfig, DispatcherHandle};
use crate::cast::registry::DeviceRegistry;
use crate::cast::session::{spawn_session, SessionConfig, SessionControl, SessionHandle};
use crate::cast::transport::TlsTransport;
use crate::cast::CastService;
use crate::config::Config;
use crate::context::NetworkContext;
use crate::controller::ControllerState;
use crate::error::{BridgeError, BridgeResult};
use crate::events::{BroadcastEvent, BroadcastEventBridge, EventEmitter};
use crate::images::{self, ImageStore};
use crate::prefs::PreferencesStore;
use crate::protocol_constants::DEVICE_TTL;

/// Container for all bootstrapped services.
#[derive(Clone)]
pub struct BridgeServices {
    pub cast: Arc<CastService>,
    pub controller: Arc<ControllerState>,
    pub dispatcher: DispatcherHandle,
    pub session: SessionHandle,
    pub images: Arc<ImageStore>,
    pub broadcast_tx: broadcast::Sender<BroadcastEvent>,
    pub event_bridge: Arc<BroadcastEventBridge>,
    pub network: NetworkContext,
    pub config: Arc<Config>,
    /// Cancellation token for graceful shutdown of background tasks.
    pub cancel_token: CancellationToken,
}

impl BridgeServices {
    /// Initiates graceful shutdown: stops the cast session cleanly, then
    /// signals every background task.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] beginning graceful shutdown...");
        self.session.stop_app().await;
        self.session.disconnect().await;
        self.cancel_token.cancel();
        log::info!("[Bootstrap] shutdown complete");
    }

    /// Builds the API layer state over these services.
    #[must_use]
    pub fn app_state(&self) -> AppState {
        AppState {
            cast: Arc::clone(&self.cast),
            controller: Arc::clone(&self.controller),
            images: Arc::clone(&self.images),
            broadcast_tx: self.broadcast_tx.clone(),
            event_bridge: Arc::clone(&self.event_bridge),
            network: self.network.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

/// Bootstraps all application services with their dependencies.
///
/// Wiring order follows the dependency graph: event bridge and shared state
/// first, then the session engine, then the dispatcher and the services that
/// drive it, and finally discovery.
pub fn bootstrap_services(
    config: Config,
    network: NetworkContext,
    prefs_path: &Path,
) -> BridgeResult<BridgeServices> {
    let config = Arc::new(config);

    // Event plumbing: one broadcast channel feeds every WebSocket client.
    let (broadcast_tx, _) = broadcast::channel::<BroadcastEvent>(config.event_channel_capacity);
    let event_bridge = Arc::new(BroadcastEventBridge::with_sender(broadcast_tx.clone()));
    let emitter: Arc<dyn EventEmitter> = event_bridge.clone();

    let cancel_token = CancellationToken::new();
    let prefs = Arc::new(PreferencesStore::open(prefs_path));
    let registry = Arc::new(DeviceRegistry::new(DEVICE_TTL));

    // The session engine owns the receiver link.
    let transport = Arc::new(
        TlsTransport::new().map_err(|e| BridgeError::Internal(e.to_string()))?,
    );
    let session = spawn_session(
        SessionConfig::new(config.app_id.clone(), config.namespace.clone()),
        transport,
        emitter.clone(),
    );

    // Playback events flow through the dispatcher into the session.
    let dispatcher = spawn_dispatcher(DispatcherConfig::default(), Arc::new(session.clone()));

    let cast = CastService::new(
        Arc::clone(&config),
        registry,
        session.clone(),
        Arc::clone(&prefs),
        emitter.clone(),
    );
    cast.start(cancel_token.clone())?;

    let images = Arc::new(ImageStore::new(network.clone()));
    images::spawn_cleanup(Arc::clone(&images), cancel_token.clone());

    let controller = ControllerState::new(
        dispatcher.clone(),
        Arc::new(session.clone()),
        Arc::new(SupplementalArtClient::new()),
        emitter,
        prefs,
    );

    Ok(BridgeServices {
        cast,
        controller,
        dispatcher,
        session,
        images,
        broadcast_tx,
        event_bridge,
        network,
        config,
        cancel_token,
    })
}
