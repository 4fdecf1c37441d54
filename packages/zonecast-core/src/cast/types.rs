//! Shared types for the cast subsystem: session status, playback payloads and
//! the outbound message envelope measured against the transport size ceiling.

use serde::{Deserialize, Serialize};

/// Transport status of the receiver session.
///
/// `Idle` is only re-entered when no device is selected; `Disconnected` is
/// reachable from every other non-idle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CastStatus {
    #[default]
    Idle,
    Connecting,
    Connected,
    AppReady,
    Disconnected,
}

/// Zone transport state as reported by the audio controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    Playing,
    Paused,
    Stopped,
    Loading,
    /// Any state string this bridge does not recognize. Never produced
    /// locally; unknown states are treated as explicit non-playing values.
    #[serde(other)]
    Other,
}

/// Kind tag of a message pushed to the receiver application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    NowPlaying,
    State,
}

/// One block of display text (the controller provides one/two/three-line
/// renderings of the same track).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextLines {
    #[serde(default)]
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line3: Option<String>,
}

/// Track metadata for the currently playing item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NowPlaying {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_line: Option<TextLines>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub two_line: Option<TextLines>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub three_line: Option<TextLines>,
    /// Explicit artist name when the controller provides one; preferred over
    /// parsing it out of the text lines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seek_position: Option<u64>,
    /// Controller-side artwork reference for the album cover.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_key: Option<String>,
    /// Controller-side artwork references for artist portraits.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artist_image_keys: Vec<String>,
}

/// The playback-state event pushed to the receiver.
///
/// Free-form enough to carry whatever the controller reports, structured
/// enough that the sanitizer can trim it field by field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<PlayState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seek_position: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub now_playing: Option<NowPlaying>,
    /// Inline base64 album art (a `data:` URL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
    /// Hosted album art URL (served by our image store).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Artist portrait URLs for the receiver's backdrop rotation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artist_images: Vec<String>,
    /// Opaque primary-output block (volume, source controls) passed through
    /// from the controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
}

impl PlaybackPayload {
    /// True when the payload reports an actively playing zone.
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.state == Some(PlayState::Playing)
    }
}

/// A kind-tagged message as transmitted on the custom channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub payload: PlaybackPayload,
}

impl OutboundMessage {
    /// Serialized size in bytes, as it would go over the wire.
    ///
    /// An unserializable message measures as infinitely large so it can never
    /// pass a size check.
    #[must_use]
    pub fn serialized_len(&self) -> usize {
        serde_json::to_vec(self).map_or(usize::MAX, |bytes| bytes.len())
    }

    /// Converts the message to the JSON value handed to the channel.
    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// The address snapshot the session engine keeps for the selected device.
///
/// Deliberately a copy: the registry exclusively owns [`super::registry::Device`]
/// records and may evict them while a session is still running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEndpoint {
    pub id: String,
    pub address: String,
    pub port: u16,
}
