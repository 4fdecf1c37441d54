//! Network configuration context.
//!
//! Bundles the advertised IP and server port that the image store needs for
//! building URLs the receiver can actually reach. Supports explicit
//! configuration (server deployment) and auto-detection.

use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

/// Network configuration shared across services.
#[derive(Clone)]
pub struct NetworkContext {
    /// Server port (initially the preference, updated once the listener binds).
    port: Arc<RwLock<u16>>,
    /// IP address receivers can reach us at.
    local_ip: Arc<RwLock<String>>,
}

impl NetworkContext {
    /// Creates a `NetworkContext` with an explicitly configured advertise IP.
    #[must_use]
    pub fn explicit(port: u16, advertise_ip: IpAddr) -> Self {
        Self {
            port: Arc::new(RwLock::new(port)),
            local_ip: Arc::new(RwLock::new(advertise_ip.to_string())),
        }
    }

    /// Creates a `NetworkContext` by auto-detecting the local IP.
    pub fn auto_detect(port: u16, detector: Arc<dyn IpDetector>) -> Result<Self, NetworkError> {
        let local_ip = detector.detect()?;
        Ok(Self {
            port: Arc::new(RwLock::new(port)),
            local_ip: Arc::new(RwLock::new(local_ip)),
        })
    }

    /// Creates a `NetworkContext` for testing with a fixed loopback address.
    #[cfg(test)]
    pub(crate) fn for_test() -> Self {
        Self::explicit(8080, IpAddr::V4(std::net::Ipv4Addr::LOCALHOST))
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        *self.port.read()
    }

    #[must_use]
    pub fn local_ip(&self) -> String {
        self.local_ip.read().clone()
    }

    /// Sets the actual bound port once the listener is up.
    pub fn set_port(&self, port: u16) {
        *self.port.write() = port;
    }

    /// Builds an absolute URL for a server-relative path.
    #[must_use]
    pub fn build_url(&self, path: &str) -> String {
        let path = path.strip_prefix('/').unwrap_or(path);
        format!("http://{}:{}/{}", self.local_ip(), self.port(), path)
    }
}

/// Trait for detecting the local IP address.
pub trait IpDetector: Send + Sync {
    /// Detects the local IP address.
    fn detect(&self) -> Result<String, NetworkError>;
}

/// Default IP detector using the system's network interfaces.
#[derive(Debug, Clone, Default)]
pub struct LocalIpDetector;

impl LocalIpDetector {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Convenience constructor returning an `Arc<dyn IpDetector>`.
    #[must_use]
    pub fn arc() -> Arc<dyn IpDetector> {
        Arc::new(Self)
    }
}

impl IpDetector for LocalIpDetector {
    fn detect(&self) -> Result<String, NetworkError> {
        local_ip_address::local_ip()
            .map(|ip| ip.to_string())
            .map_err(|e| NetworkError::Detection(e.to_string()))
    }
}

/// Network-level failures.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("local IP detection failed: {0}")]
    Detection(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_url_joins_host_port_and_path() {
        let network = NetworkContext::for_test();
        assert_eq!(
            network.build_url("/images/abc"),
            "http://127.0.0.1:8080/images/abc"
        );
        assert_eq!(
            network.build_url("images/abc"),
            "http://127.0.0.1:8080/images/abc"
        );
    }

    #[test]
    fn set_port_is_visible_to_later_urls() {
        let network = NetworkContext::for_test();
        network.set_port(9000);
        assert_eq!(network.build_url("/x"), "http://127.0.0.1:9000/x");
    }
}
