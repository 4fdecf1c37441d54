//! Audio-controller boundary.
//!
//! The controller integration (zone discovery, authentication, artwork
//! retrieval) lives outside this process. It pushes its event stream in
//! through the facade; selection commands travel the other way as broadcast
//! events the integration observes. This module keeps the snapshot of what
//! the controller last reported, routes now-playing updates into the
//! dispatcher, and runs best-effort artwork enrichment after the fast path
//! has already been dispatched.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::artwork::{extract_artist_name, merge_artist_images, SupplementalArtClient};
use crate::cast::dispatcher::DispatcherHandle;
use crate::cast::session::SessionControl;
use crate::cast::types::{PlayState, PlaybackPayload};
use crate::error::{BridgeError, BridgeResult};
use crate::events::{ControllerEvent, EventEmitter};
use crate::prefs::PreferencesStore;
use crate::protocol_constants::MAX_ARTIST_IMAGES;
use crate::utils::now_millis;

/// One controller core (an audio server instance).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreSummary {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default = "default_true")]
    pub available: bool,
    #[serde(default)]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// One playback zone on the active core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneSummary {
    pub zone_id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<PlayState>,
}

/// Inbound events from the controller integration.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControllerUpdate {
    /// The set of known cores changed.
    CoresChanged { cores: Vec<CoreSummary> },
    /// The zone list of the active core changed.
    ZonesChanged { zones: Vec<ZoneSummary> },
    /// Playback state or track changed on some zone.
    NowPlayingChanged { payload: PlaybackPayload },
    /// The active core went away; casting stops immediately.
    CoreUnavailable,
}

/// What the controller last reported, plus our zone selection.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerSnapshot {
    pub cores: Vec<CoreSummary>,
    pub zones: Vec<ZoneSummary>,
    pub selected_zone_id: Option<String>,
    pub now_playing: Option<PlaybackPayload>,
    pub last_state: Option<PlayState>,
}

/// Controller-boundary state and event routing.
pub struct ControllerState {
    snapshot: RwLock<ControllerSnapshot>,
    dispatcher: DispatcherHandle,
    session: Arc<dyn SessionControl>,
    artwork: Arc<SupplementalArtClient>,
    emitter: Arc<dyn EventEmitter>,
    prefs: Arc<PreferencesStore>,
}

impl ControllerState {
    #[must_use]
    pub fn new(
        dispatcher: DispatcherHandle,
        session: Arc<dyn SessionControl>,
        artwork: Arc<SupplementalArtClient>,
        emitter: Arc<dyn EventEmitter>,
        prefs: Arc<PreferencesStore>,
    ) -> Arc<Self> {
        let selected_zone_id = prefs.get().selected_zone_id;
        Arc::new(Self {
            snapshot: RwLock::new(ControllerSnapshot {
                selected_zone_id,
                ..Default::default()
            }),
            dispatcher,
            session,
            artwork,
            emitter,
            prefs,
        })
    }

    #[must_use]
    pub fn snapshot(&self) -> ControllerSnapshot {
        self.snapshot.read().clone()
    }

    /// Applies one inbound controller event.
    pub async fn apply(self: &Arc<Self>, update: ControllerUpdate) {
        match update {
            ControllerUpdate::CoresChanged { cores } => {
                self.snapshot.write().cores = cores;
                self.emit_snapshot();
            }
            ControllerUpdate::ZonesChanged { zones } => {
                self.snapshot.write().zones = zones;
                self.emit_snapshot();
            }
            ControllerUpdate::NowPlayingChanged { payload } => {
                self.handle_now_playing(payload).await;
            }
            ControllerUpdate::CoreUnavailable => {
                log::warn!("[Controller] core unavailable, stopping cast");
                {
                    let mut snapshot = self.snapshot.write();
                    snapshot.now_playing = None;
                    snapshot.last_state = None;
                }
                self.session.stop_app().await;
                self.emit_snapshot();
            }
        }
    }

    async fn handle_now_playing(self: &Arc<Self>, payload: PlaybackPayload) {
        // Only the watched zone drives the receiver.
        let selected_zone = self.snapshot.read().selected_zone_id.clone();
        match (&selected_zone, &payload.zone_id) {
            (Some(selected), Some(zone)) if selected != zone => {
                log::trace!("[Controller] ignoring update for unwatched zone {}", zone);
                return;
            }
            (None, _) => {
                log::trace!("[Controller] no zone selected, ignoring playback update");
                return;
            }
            _ => {}
        }

        let (state_changed, track_changed) = {
            let mut snapshot = self.snapshot.write();
            let state_changed = snapshot.last_state != payload.state;
            let track_changed = snapshot
                .now_playing
                .as_ref()
                .map_or(true, |previous| previous.now_playing != payload.now_playing);
            snapshot.last_state = payload.state;
            snapshot.now_playing = Some(payload.clone());
            (state_changed, track_changed)
        };

        self.emitter.emit_controller(ControllerEvent::NowPlayingChanged {
            payload: payload.clone(),
            timestamp: now_millis(),
        });
        if state_changed {
            self.emitter.emit_controller(ControllerEvent::PlayStateChanged {
                state: payload.state,
                timestamp: now_millis(),
            });
        }

        // Fast path first; enrichment re-dispatches later if it finds more.
        self.dispatcher.dispatch_update(payload.clone()).await;
        if track_changed {
            self.maybe_enrich(payload);
        }
    }

    /// Spawns a background supplemental-artwork lookup when the payload
    /// carries fewer artist images than the receiver can rotate through.
    fn maybe_enrich(self: &Arc<Self>, payload: PlaybackPayload) {
        if payload.artist_images.len() >= MAX_ARTIST_IMAGES {
            return;
        }
        let Some(artist) = payload
            .now_playing
            .as_ref()
            .and_then(extract_artist_name)
        else {
            return;
        };

        let state = Arc::clone(self);
        tokio::spawn(async move {
            let needed = MAX_ARTIST_IMAGES - payload.artist_images.len();
            let supplemental = state
                .artwork
                .fetch_supplemental_images(&artist, needed.max(2))
                .await;
            let merged =
                merge_artist_images(&payload.artist_images, &supplemental, MAX_ARTIST_IMAGES);
            if merged.len() <= payload.artist_images.len() {
                return;
            }
            log::info!(
                "[Controller] enriched '{}' with {} supplemental image(s)",
                artist,
                merged.len() - payload.artist_images.len()
            );
            let mut enriched = payload;
            enriched.artist_images = merged;

            // The zone may have changed while we were fetching.
            if state.snapshot.read().selected_zone_id != enriched.zone_id {
                return;
            }
            state.snapshot.write().now_playing = Some(enriched.clone());
            state
                .emitter
                .emit_controller(ControllerEvent::NowPlayingChanged {
                    payload: enriched.clone(),
                    timestamp: now_millis(),
                });
            state.dispatcher.dispatch_update(enriched).await;
        });
    }

    /// Selects the zone to watch. Persisted, validated against the last
    /// reported zone list, and forwarded to the controller integration.
    pub fn select_zone(&self, zone_id: &str) -> BridgeResult<()> {
        {
            let mut snapshot = self.snapshot.write();
            if !snapshot.zones.iter().any(|zone| zone.zone_id == zone_id) {
                return Err(BridgeError::ZoneNotFound(zone_id.to_string()));
            }
            snapshot.selected_zone_id = Some(zone_id.to_string());
        }
        self.prefs
            .update(|prefs| prefs.selected_zone_id = Some(zone_id.to_string()));
        self.emitter.emit_controller(ControllerEvent::SelectZone {
            zone_id: zone_id.to_string(),
            timestamp: now_millis(),
        });
        self.emit_snapshot();
        Ok(())
    }

    /// Makes a core the active one on the controller side.
    pub fn select_core(&self, core_id: &str) -> BridgeResult<()> {
        {
            let snapshot = self.snapshot.read();
            if !snapshot.cores.iter().any(|core| core.id == core_id) {
                return Err(BridgeError::CoreNotFound(core_id.to_string()));
            }
        }
        self.emitter.emit_controller(ControllerEvent::SelectCore {
            core_id: core_id.to_string(),
            timestamp: now_millis(),
        });
        Ok(())
    }

    fn emit_snapshot(&self) {
        self.emitter.emit_controller(ControllerEvent::SnapshotChanged {
            snapshot: self.snapshot(),
            timestamp: now_millis(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cast::dispatcher::{spawn_dispatcher, DispatcherConfig};
    use crate::cast::types::{MessageKind, NowPlaying};
    use crate::cast::CastError;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSession {
        sent: Mutex<Vec<(MessageKind, PlaybackPayload)>>,
        stops: Mutex<usize>,
    }

    #[async_trait]
    impl SessionControl for RecordingSession {
        async fn ensure_launched(&self) -> Result<(), CastError> {
            Ok(())
        }

        async fn send(
            &self,
            kind: MessageKind,
            payload: PlaybackPayload,
        ) -> Result<(), CastError> {
            self.sent.lock().push((kind, payload));
            Ok(())
        }

        async fn stop_app(&self) {
            *self.stops.lock() += 1;
        }
    }

    fn controller_with_zone(
        zone: Option<&str>,
    ) -> (Arc<ControllerState>, Arc<RecordingSession>) {
        let session = Arc::new(RecordingSession::default());
        let dispatcher = spawn_dispatcher(
            DispatcherConfig::default(),
            session.clone() as Arc<dyn SessionControl>,
        );
        let dir = tempfile::tempdir().unwrap();
        let prefs = Arc::new(PreferencesStore::open(dir.path().join("prefs.json")));
        if let Some(zone) = zone {
            prefs.update(|p| p.selected_zone_id = Some(zone.to_string()));
        }
        let state = ControllerState::new(
            dispatcher,
            session.clone(),
            Arc::new(SupplementalArtClient::new()),
            Arc::new(crate::events::NoopEventEmitter),
            prefs,
        );
        (state, session)
    }

    fn playing_payload(zone: &str) -> PlaybackPayload {
        PlaybackPayload {
            zone_id: Some(zone.to_string()),
            state: Some(PlayState::Playing),
            now_playing: Some(NowPlaying {
                artist_image_keys: vec![],
                ..Default::default()
            }),
            // Full lists skip enrichment, keeping these tests offline.
            artist_images: (0..MAX_ARTIST_IMAGES)
                .map(|i| format!("https://img.example/{i}.jpg"))
                .collect(),
            ..Default::default()
        }
    }

    async fn settle() {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    #[tokio::test]
    async fn watched_zone_updates_reach_the_session() {
        let (state, session) = controller_with_zone(Some("z1"));
        state
            .apply(ControllerUpdate::NowPlayingChanged {
                payload: playing_payload("z1"),
            })
            .await;
        settle().await;

        let sent = session.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, MessageKind::NowPlaying);
        assert_eq!(state.snapshot().last_state, Some(PlayState::Playing));
    }

    #[tokio::test]
    async fn unwatched_zone_updates_are_ignored() {
        let (state, session) = controller_with_zone(Some("z1"));
        state
            .apply(ControllerUpdate::NowPlayingChanged {
                payload: playing_payload("z2"),
            })
            .await;
        settle().await;
        assert!(session.sent.lock().is_empty());
        assert!(state.snapshot().now_playing.is_none());
    }

    #[tokio::test]
    async fn no_selected_zone_means_no_forwarding() {
        let (state, session) = controller_with_zone(None);
        state
            .apply(ControllerUpdate::NowPlayingChanged {
                payload: playing_payload("z1"),
            })
            .await;
        settle().await;
        assert!(session.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn core_unavailable_stops_the_cast() {
        let (state, session) = controller_with_zone(Some("z1"));
        state.apply(ControllerUpdate::CoreUnavailable).await;
        assert_eq!(*session.stops.lock(), 1);
        assert!(state.snapshot().now_playing.is_none());
    }

    #[tokio::test]
    async fn zone_selection_validates_against_reported_zones() {
        let (state, _session) = controller_with_zone(None);
        assert!(matches!(
            state.select_zone("z1"),
            Err(BridgeError::ZoneNotFound(_))
        ));

        state
            .apply(ControllerUpdate::ZonesChanged {
                zones: vec![ZoneSummary {
                    zone_id: "z1".into(),
                    display_name: "Kitchen".into(),
                    state: None,
                }],
            })
            .await;
        state.select_zone("z1").unwrap();
        assert_eq!(state.snapshot().selected_zone_id.as_deref(), Some("z1"));
    }

    #[tokio::test]
    async fn core_selection_validates_against_reported_cores() {
        let (state, _session) = controller_with_zone(None);
        assert!(matches!(
            state.select_core("c1"),
            Err(BridgeError::CoreNotFound(_))
        ));

        state
            .apply(ControllerUpdate::CoresChanged {
                cores: vec![CoreSummary {
                    id: "c1".into(),
                    name: "Study".into(),
                    version: None,
                    available: true,
                    is_active: false,
                }],
            })
            .await;
        state.select_core("c1").unwrap();
    }

    #[test]
    fn controller_update_deserializes_from_tagged_json() {
        let update: ControllerUpdate = serde_json::from_str(
            r#"{"type":"nowPlayingChanged","payload":{"zone_id":"z1","state":"playing"}}"#,
        )
        .unwrap();
        match update {
            ControllerUpdate::NowPlayingChanged { payload } => {
                assert_eq!(payload.zone_id.as_deref(), Some("z1"));
                assert_eq!(payload.state, Some(PlayState::Playing));
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }
}
