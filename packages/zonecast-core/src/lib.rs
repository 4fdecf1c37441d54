//! Zonecast Core - shared library for the Zonecast bridge.
//!
//! This crate bridges a home audio controller's live playback state to a
//! Google Cast class receiver: it discovers receivers on the local network,
//! maintains a single stateful application session with the selected one,
//! and reliably delivers size-sanitized playback-state messages to it.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cast`]: receiver discovery, device registry, the session state machine,
//!   the playback dispatcher and payload sanitization
//! - [`controller`]: the audio-controller boundary (event ingest, snapshots)
//! - [`events`]: event system for real-time client communication
//! - [`artwork`]: best-effort supplemental artist image lookups
//! - [`images`]: hosted artwork store behind the `/images` endpoint
//! - [`api`]: HTTP/WebSocket facade
//! - [`bootstrap`]: the composition root
//! - [`error`]: centralized error types
//!
//! # Abstraction Traits
//!
//! Two traits decouple the core from its environment:
//!
//! - [`Transport`](cast::transport::Transport): the receiver link, so the
//!   session engine is testable against an in-memory fake
//! - [`EventEmitter`](events::EventEmitter): domain event delivery

#![warn(clippy::all)]

pub mod api;
pub mod artwork;
pub mod bootstrap;
pub mod cast;
pub mod config;
pub mod context;
pub mod controller;
pub mod error;
pub mod events;
pub mod images;
pub mod prefs;
pub mod protocol_constants;
pub mod utils;

// Re-export commonly used types at the crate root
pub use bootstrap::{bootstrap_services, BridgeServices};
pub use cast::{
    CastError, CastService, CastSnapshot, CastStatus, Device, DeviceRegistry, MessageKind,
    PlayState, PlaybackPayload, SessionControl, SessionHandle,
};
pub use config::Config;
pub use context::{IpDetector, LocalIpDetector, NetworkContext, NetworkError};
pub use controller::{ControllerSnapshot, ControllerState, ControllerUpdate};
pub use error::{BridgeError, BridgeResult, ErrorCode};
pub use events::{
    BroadcastEvent, BroadcastEventBridge, CastEvent, ControllerEvent, EventEmitter,
    LoggingEventEmitter, NoopEventEmitter,
};
pub use images::ImageStore;
pub use prefs::{Preferences, PreferencesStore};
pub use utils::now_millis;

// Re-export API types
pub use api::{start_server, AppState, ServerError};
