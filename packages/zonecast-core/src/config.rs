//! Application configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the Zonecast bridge.
///
/// All fields have sensible defaults; the receiver application id and custom
/// namespace are the only values most deployments ever change.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    // Server
    /// Preferred port for the HTTP/WS server (0 = auto-allocate).
    pub preferred_port: u16,

    // Receiver application
    /// Application id registered for the display receiver.
    pub app_id: String,

    /// Namespace of the custom data channel to the receiver application.
    pub namespace: String,

    /// Informational URL of the hosted receiver page, passed through in
    /// snapshots for the front end.
    pub receiver_url: String,

    // Events
    /// Capacity of the event broadcast channel.
    pub event_channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_port: 8080,
            app_id: "180705D2".to_string(),
            namespace: "urn:x-cast:io.zonecast.display".to_string(),
            receiver_url: String::new(),
            event_channel_capacity: crate::protocol_constants::EVENT_CHANNEL_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = Config::default();
        assert!(!config.app_id.is_empty());
        assert!(config.namespace.starts_with("urn:x-cast:"));
        assert!(config.event_channel_capacity > 0);
    }
}
