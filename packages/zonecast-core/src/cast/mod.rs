//! Cast receiver subsystem: discovery, device registry, session management
//! and payload sanitization.
//!
//! The module is organized the way messages flow:
//!
//! - [`discovery`] listens for receiver announcements and feeds [`registry`]
//! - [`dispatcher`] debounces playback events and drives [`session`]
//! - [`session`] owns the transport link and the application handshake
//! - [`sanitize`] shrinks oversized payloads before transmission
//! - [`codec`] / [`transport`] speak the CASTV2 wire format
//! - [`service`] ties selection, persistence and discovery together

use thiserror::Error;

pub mod codec;
pub mod discovery;
pub mod dispatcher;
pub mod registry;
pub mod sanitize;
pub mod service;
pub mod session;
pub mod transport;
pub mod types;

pub use registry::{Device, DeviceRegistry, DeviceView};
pub use service::{CastService, CastSnapshot};
pub use session::{SessionControl, SessionHandle};
pub use types::{CastStatus, DeviceEndpoint, MessageKind, PlayState, PlaybackPayload};

/// Errors raised by the cast subsystem.
///
/// Variants are cloneable so a single failure can resolve every waiter of a
/// deduplicated launch request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CastError {
    /// No receiver has been selected yet.
    #[error("no receiver selected")]
    NoDeviceSelected,

    /// Opening the transport to the receiver failed.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The transport went away under us (broken-pipe class).
    #[error("transport closed: {0}")]
    TransportClosed(String),

    /// The receiver-control channel is not established.
    #[error("receiver channel not established")]
    ReceiverChannelUnavailable,

    /// The application custom channel is not bound.
    #[error("application channel unavailable")]
    AppChannelUnavailable,

    /// The receiver explicitly rejected a launch, or the application vanished.
    #[error("launch rejected: {0}")]
    LaunchRejected(String),

    /// No matching status report arrived within the launch timeout.
    #[error("launch timed out after {0} seconds")]
    LaunchTimeout(u64),

    /// A payload or frame could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// The session engine task is gone.
    #[error("session engine stopped")]
    SessionClosed,
}

/// Automatic recovery action for a failure, per the session recovery policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Disconnect, then reconnect and relaunch the application after a short delay.
    Relaunch,
    /// Disconnect, then plainly reconnect after a longer delay.
    Reconnect,
    /// Surface to observers only; no automatic retry.
    Surface,
}

impl CastError {
    /// Classifies the error for the session engine's recovery policy.
    #[must_use]
    pub fn recovery(&self) -> Recovery {
        match self {
            Self::ReceiverChannelUnavailable | Self::AppChannelUnavailable => Recovery::Relaunch,
            Self::TransportClosed(_) => Recovery::Reconnect,
            _ => Recovery::Surface,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_channel_failures_trigger_relaunch() {
        assert_eq!(CastError::AppChannelUnavailable.recovery(), Recovery::Relaunch);
        assert_eq!(
            CastError::ReceiverChannelUnavailable.recovery(),
            Recovery::Relaunch
        );
    }

    #[test]
    fn broken_pipe_failures_trigger_plain_reconnect() {
        assert_eq!(
            CastError::TransportClosed("EPIPE".into()).recovery(),
            Recovery::Reconnect
        );
    }

    #[test]
    fn other_failures_are_surfaced_only() {
        assert_eq!(CastError::NoDeviceSelected.recovery(), Recovery::Surface);
        assert_eq!(
            CastError::LaunchRejected("busy".into()).recovery(),
            Recovery::Surface
        );
        assert_eq!(CastError::LaunchTimeout(10).recovery(), Recovery::Surface);
    }
}
