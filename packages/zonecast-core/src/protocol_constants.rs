//! Protocol-level constants for the Cast wire protocol and core timing policy.
//!
//! Everything here is fixed by the protocol or by deliberate policy choices;
//! user-tunable values live in [`crate::config::Config`].

use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────────
// Cast namespaces and addressing
// ─────────────────────────────────────────────────────────────────────────────

/// Virtual-connection control namespace (CONNECT / CLOSE).
pub const CONNECTION_NAMESPACE: &str = "urn:x-cast:com.google.cast.tp.connection";

/// Receiver control namespace (GET_STATUS / LAUNCH / STOP / RECEIVER_STATUS).
pub const RECEIVER_NAMESPACE: &str = "urn:x-cast:com.google.cast.receiver";

/// Heartbeat namespace (PING / PONG).
pub const HEARTBEAT_NAMESPACE: &str = "urn:x-cast:com.google.cast.tp.heartbeat";

/// Our sender id on every channel.
pub const SENDER_ID: &str = "sender-0";

/// The platform receiver's well-known id.
pub const RECEIVER_ID: &str = "receiver-0";

/// Default port for the Cast TLS endpoint when an announcement omits one.
pub const DEFAULT_RECEIVER_PORT: u16 = 8009;

/// mDNS service type for Cast receivers (trailing dot required by mdns-sd).
pub const CAST_SERVICE_TYPE: &str = "_googlecast._tcp.local.";

// ─────────────────────────────────────────────────────────────────────────────
// Message sizing
// ─────────────────────────────────────────────────────────────────────────────

/// Ceiling for a serialized custom-channel message, conservative under the
/// transport's real frame limit.
pub const MAX_MESSAGE_BYTES: usize = 60 * 1024;

/// Hard cap on a single inbound wire frame; anything larger is a protocol error.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Artist image lists are never grown past this many entries.
pub const MAX_ARTIST_IMAGES: usize = 4;

// ─────────────────────────────────────────────────────────────────────────────
// Timing policy
// ─────────────────────────────────────────────────────────────────────────────

/// Interval between heartbeat PINGs on an open connection.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// How long a LAUNCH request may remain unanswered before it is rejected.
pub const LAUNCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay before reconnect-and-relaunch after an application-channel failure.
pub const RELAUNCH_DELAY: Duration = Duration::from_secs(1);

/// Delay before a plain reconnect after a broken-pipe-class transport failure.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Debounce window for inactive playback states before the cast is stopped.
pub const STOP_DEBOUNCE: Duration = Duration::from_secs(2);

/// Devices not re-announced within this window are evicted from the registry.
pub const DEVICE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Interval of the registry staleness sweep.
pub const PURGE_INTERVAL: Duration = Duration::from_secs(30);

/// Timeout for supplemental artwork lookups; lookups never gate playback.
pub const ARTWORK_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifetime of a hosted image in the image store.
pub const IMAGE_TTL: Duration = Duration::from_secs(60 * 60);

/// Interval of the image store expiry sweep.
pub const IMAGE_CLEANUP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Capacity of the broadcast channel feeding WebSocket clients.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;
