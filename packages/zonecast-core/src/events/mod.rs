//! Event system for real-time client communication.
//!
//! Domain services emit typed events through the [`EventEmitter`] trait; the
//! [`BroadcastEventBridge`] fans them out to WebSocket subscribers. Emission
//! never blocks on listeners.

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

use crate::cast::registry::DeviceView;
use crate::cast::types::{CastStatus, PlayState, PlaybackPayload};
use crate::controller::ControllerSnapshot;

/// Events broadcast to clients, grouped by domain.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Events from the cast subsystem (devices, session, receiver messages).
    Cast(CastEvent),

    /// Events from the audio-controller boundary.
    Controller(ControllerEvent),
}

/// Events from the cast subsystem.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CastEvent {
    /// The device list changed (registration, eviction or selection).
    DevicesChanged {
        devices: Vec<DeviceView>,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The session status changed.
    StatusChanged {
        status: CastStatus,
        timestamp: u64,
    },
    /// A message arrived on the application custom channel.
    MessageReceived {
        message: serde_json::Value,
        timestamp: u64,
    },
    /// An unrecoverable (or surfaced-only) cast error.
    Error {
        message: String,
        timestamp: u64,
    },
}

/// Events from the audio-controller boundary.
///
/// `SelectCore` / `SelectZone` are the commands the core issues outward: the
/// controller integration observes them on the event stream and acts on the
/// controller's side.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControllerEvent {
    /// The controller snapshot (cores, zones, selection) changed.
    SnapshotChanged {
        snapshot: ControllerSnapshot,
        timestamp: u64,
    },
    /// A now-playing update, as forwarded to the receiver.
    NowPlayingChanged {
        payload: PlaybackPayload,
        timestamp: u64,
    },
    /// The zone transport state changed.
    PlayStateChanged {
        state: Option<PlayState>,
        timestamp: u64,
    },
    /// Outward command: make this core the active one.
    SelectCore {
        #[serde(rename = "coreId")]
        core_id: String,
        timestamp: u64,
    },
    /// Outward command: watch this zone.
    SelectZone {
        #[serde(rename = "zoneId")]
        zone_id: String,
        timestamp: u64,
    },
}

impl From<CastEvent> for BroadcastEvent {
    fn from(event: CastEvent) -> Self {
        BroadcastEvent::Cast(event)
    }
}

impl From<ControllerEvent> for BroadcastEvent {
    fn from(event: ControllerEvent) -> Self {
        BroadcastEvent::Controller(event)
    }
}
