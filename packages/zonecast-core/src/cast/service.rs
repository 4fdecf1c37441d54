//! Receiver selection and discovery orchestration.
//!
//! Ties the registry, the discovery listener, the session engine and the
//! persisted selection together. This is the surface the facade talks to for
//! everything receiver-related.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::discovery::{self, RefreshHandle};
use super::registry::{DeviceAnnouncement, DeviceRegistry, DeviceView};
use super::session::SessionHandle;
use super::types::CastStatus;
use crate::config::Config;
use crate::error::{BridgeError, BridgeResult};
use crate::events::{CastEvent, EventEmitter};
use crate::prefs::PreferencesStore;
use crate::protocol_constants::PURGE_INTERVAL;
use crate::utils::now_millis;

/// Externally visible cast state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CastSnapshot {
    pub devices: Vec<DeviceView>,
    pub selected_device_id: Option<String>,
    pub cast_status: CastStatus,
    pub receiver_url: String,
}

/// Receiver selection and discovery service.
pub struct CastService {
    config: Arc<Config>,
    registry: Arc<DeviceRegistry>,
    session: SessionHandle,
    prefs: Arc<PreferencesStore>,
    emitter: Arc<dyn EventEmitter>,
    selected: RwLock<Option<String>>,
    refresh: Mutex<Option<RefreshHandle>>,
}

impl CastService {
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        registry: Arc<DeviceRegistry>,
        session: SessionHandle,
        prefs: Arc<PreferencesStore>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry,
            session,
            prefs,
            emitter,
            selected: RwLock::new(None),
            refresh: Mutex::new(None),
        })
    }

    /// Starts discovery: the mDNS browse loop and the periodic staleness
    /// sweep. Discovery failures are logged and surfaced, never fatal.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> BridgeResult<()> {
        let daemon = Arc::new(discovery::create_daemon()?);
        let (mut announcements, refresh) = discovery::spawn_browser(daemon, cancel.clone())?;
        *self.refresh.lock() = Some(refresh);

        let service = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(announcement) = announcements.recv().await {
                service.handle_announcement(announcement).await;
            }
        });

        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(PURGE_INTERVAL);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => {
                        if service.registry.purge_stale(Instant::now()) {
                            service.emit_devices();
                        }
                    }
                }
            }
        });

        Ok(())
    }

    async fn handle_announcement(self: &Arc<Self>, announcement: DeviceAnnouncement) {
        let Some(device) = self.registry.register(announcement, Instant::now()) else {
            return;
        };
        self.emit_devices();

        // First sight of the persisted receiver re-selects it, unless the
        // user has already picked something this run.
        let remembered = self.prefs.get().selected_receiver_id;
        let nothing_selected = self.selected.read().is_none();
        if nothing_selected && remembered.as_deref() == Some(device.id.as_str()) {
            log::info!("[Cast] re-selecting remembered receiver '{}'", device.id);
            if let Err(err) = self.select_device(&device.id).await {
                log::warn!("[Cast] remembered selection failed: {}", err);
            }
        }
    }

    /// Selects a receiver: validates it exists, persists the choice and
    /// triggers a connect. Connect failures surface through the event stream,
    /// not this call.
    pub async fn select_device(self: &Arc<Self>, device_id: &str) -> BridgeResult<()> {
        let endpoint = self
            .registry
            .endpoint(device_id)
            .ok_or_else(|| BridgeError::DeviceNotFound(device_id.to_string()))?;

        *self.selected.write() = Some(device_id.to_string());
        self.prefs
            .update(|prefs| prefs.selected_receiver_id = Some(device_id.to_string()));
        self.emit_devices();

        let session = self.session.clone();
        tokio::spawn(async move {
            if let Err(err) = session.connect(endpoint).await {
                log::warn!("[Cast] connect after selection failed: {}", err);
            }
        });
        Ok(())
    }

    /// Re-triggers the discovery query and re-publishes the device list.
    pub fn refresh_discovery(&self) {
        if let Some(refresh) = self.refresh.lock().as_ref() {
            refresh.refresh();
        }
        self.emit_devices();
    }

    /// Devices in discovery order, annotated with the current selection.
    #[must_use]
    pub fn devices(&self) -> Vec<DeviceView> {
        self.registry.list(self.selected.read().as_deref())
    }

    #[must_use]
    pub fn selected_device_id(&self) -> Option<String> {
        self.selected.read().clone()
    }

    #[must_use]
    pub fn status(&self) -> CastStatus {
        self.session.status()
    }

    #[must_use]
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    #[must_use]
    pub fn snapshot(&self) -> CastSnapshot {
        CastSnapshot {
            devices: self.devices(),
            selected_device_id: self.selected_device_id(),
            cast_status: self.status(),
            receiver_url: self.config.receiver_url.clone(),
        }
    }

    fn emit_devices(&self) {
        self.emitter.emit_cast(CastEvent::DevicesChanged {
            devices: self.devices(),
            timestamp: now_millis(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cast::registry::DeviceAnnouncement;
    use crate::cast::session::{spawn_session, SessionConfig};
    use crate::cast::transport::{Connection, Transport};
    use crate::cast::CastError;
    use crate::events::NoopEventEmitter;
    use crate::protocol_constants::DEVICE_TTL;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    /// Transport that accepts every connect and parks the wire.
    struct SilentTransport;

    #[async_trait]
    impl Transport for SilentTransport {
        async fn connect(&self, _address: &str, _port: u16) -> Result<Connection, CastError> {
            let (out_tx, _out_rx) = mpsc::channel(8);
            let (_in_tx, in_rx) = mpsc::channel(8);
            // Leak the far ends so the link stays "up".
            std::mem::forget(_out_rx);
            std::mem::forget(_in_tx);
            Ok(Connection::from_channels(out_tx, in_rx))
        }
    }

    fn service_with_prefs(prefs: Arc<PreferencesStore>) -> Arc<CastService> {
        let emitter: Arc<dyn EventEmitter> = Arc::new(NoopEventEmitter);
        let session = spawn_session(
            SessionConfig::new("APP123", "urn:x-cast:test"),
            Arc::new(SilentTransport),
            emitter.clone(),
        );
        CastService::new(
            Arc::new(Config::default()),
            Arc::new(DeviceRegistry::new(DEVICE_TTL)),
            session,
            prefs,
            emitter,
        )
    }

    fn service() -> Arc<CastService> {
        let dir = tempfile::tempdir().unwrap();
        let prefs = Arc::new(PreferencesStore::open(dir.path().join("prefs.json")));
        service_with_prefs(prefs)
    }

    fn announcement(id: &str) -> DeviceAnnouncement {
        DeviceAnnouncement {
            id: Some(id.to_string()),
            fullname: format!("{id}._googlecast._tcp.local."),
            friendly_name: Some("Kitchen".to_string()),
            addresses: vec!["10.0.0.5".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn selecting_unknown_device_is_rejected() {
        let service = service();
        let result = service.select_device("nope").await;
        assert!(matches!(result, Err(BridgeError::DeviceNotFound(_))));
        assert!(service.selected_device_id().is_none());
    }

    #[tokio::test]
    async fn selection_is_persisted_and_reflected_in_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let prefs_path = dir.path().join("prefs.json");
        let prefs = Arc::new(PreferencesStore::open(&prefs_path));
        let service = service_with_prefs(prefs.clone());

        service
            .registry
            .register(announcement("r1"), Instant::now())
            .unwrap();
        service.select_device("r1").await.unwrap();

        assert_eq!(service.selected_device_id().as_deref(), Some("r1"));
        assert_eq!(
            prefs.get().selected_receiver_id.as_deref(),
            Some("r1")
        );
        let snapshot = service.snapshot();
        assert_eq!(snapshot.devices.len(), 1);
        assert!(snapshot.devices[0].is_selected);
    }

    #[tokio::test]
    async fn remembered_receiver_is_reselected_on_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let prefs_path = dir.path().join("prefs.json");
        let prefs = Arc::new(PreferencesStore::open(&prefs_path));
        prefs.update(|p| p.selected_receiver_id = Some("r1".to_string()));
        let service = service_with_prefs(prefs);

        service.handle_announcement(announcement("r2")).await;
        assert!(service.selected_device_id().is_none());

        service.handle_announcement(announcement("r1")).await;
        assert_eq!(service.selected_device_id().as_deref(), Some("r1"));
    }
}
