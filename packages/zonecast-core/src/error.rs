//! Centralized error types for the Zonecast core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::cast::discovery::DiscoveryError;
use crate::cast::CastError;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

impl ErrorCode for CastError {
    fn code(&self) -> &'static str {
        match self {
            Self::NoDeviceSelected => "no_device_selected",
            Self::Connect(_) => "connect_failed",
            Self::TransportClosed(_) => "transport_closed",
            Self::ReceiverChannelUnavailable => "receiver_channel_unavailable",
            Self::AppChannelUnavailable => "app_channel_unavailable",
            Self::LaunchRejected(_) => "launch_rejected",
            Self::LaunchTimeout(_) => "launch_timeout",
            Self::Codec(_) => "codec_error",
            Self::SessionClosed => "session_closed",
        }
    }
}

impl ErrorCode for DiscoveryError {
    fn code(&self) -> &'static str {
        match self {
            Self::MdnsDaemon(_) => "mdns_daemon_failed",
            Self::Browse(_) => "mdns_browse_failed",
        }
    }
}

/// Application-wide error type for the Zonecast server.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum BridgeError {
    /// Receiver discovery failed (mDNS/network issues).
    #[error("Discovery failed: {0}")]
    Discovery(String),

    /// The cast session failed.
    #[error("Cast session error: {0}")]
    Cast(String),

    /// Requested receiver is not in the registry.
    #[error("Receiver not found: {0}")]
    DeviceNotFound(String),

    /// Requested controller core is unknown.
    #[error("Core not found: {0}")]
    CoreNotFound(String),

    /// Requested zone is unknown.
    #[error("Zone not found: {0}")]
    ZoneNotFound(String),

    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Returns a machine-readable error code for API responses.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Discovery(_) => "discovery_failed",
            Self::Cast(_) => "cast_error",
            Self::DeviceNotFound(_) => "device_not_found",
            Self::CoreNotFound(_) => "core_not_found",
            Self::ZoneNotFound(_) => "zone_not_found",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DeviceNotFound(_) | Self::CoreNotFound(_) | Self::ZoneNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<CastError> for BridgeError {
    fn from(err: CastError) -> Self {
        Self::Cast(err.to_string())
    }
}

impl From<DiscoveryError> for BridgeError {
    fn from(err: DiscoveryError) -> Self {
        Self::Discovery(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_not_found_maps_to_404() {
        let err = BridgeError::DeviceNotFound("r1".into());
        assert_eq!(err.code(), "device_not_found");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_request_maps_to_400() {
        let err = BridgeError::InvalidRequest("missing deviceId".into());
        assert_eq!(err.code(), "invalid_request");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn cast_errors_convert_with_their_message() {
        let err: BridgeError = CastError::LaunchTimeout(10).into();
        assert_eq!(err.code(), "cast_error");
        assert!(err.to_string().contains("10 seconds"));
    }
}
