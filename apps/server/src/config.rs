//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to.
    /// Override: `ZONECAST_BIND_PORT`
    pub bind_port: u16,

    /// IP address to advertise in hosted image URLs.
    /// This should be the IP that receivers can reach.
    /// If not specified, auto-detection will be attempted.
    /// Override: `ZONECAST_ADVERTISE_IP`
    pub advertise_ip: Option<IpAddr>,

    /// Receiver application id to launch.
    /// Override: `ZONECAST_APP_ID`
    pub app_id: Option<String>,

    /// Custom data channel namespace.
    /// Override: `ZONECAST_NAMESPACE`
    pub namespace: Option<String>,

    /// Informational URL of the hosted receiver page.
    pub receiver_url: Option<String>,

    /// Path of the preferences file (selected zone and receiver).
    /// Override: `ZONECAST_PREFS_PATH`
    pub prefs_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_port: 8080,
            advertise_ip: None,
            app_id: None,
            namespace: None,
            receiver_url: None,
            prefs_path: PathBuf::from("zonecast-prefs.json"),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ZONECAST_BIND_PORT") {
            if let Ok(port) = val.parse() {
                self.bind_port = port;
            }
        }

        if let Ok(val) = std::env::var("ZONECAST_ADVERTISE_IP") {
            if let Ok(ip) = val.parse() {
                self.advertise_ip = Some(ip);
            }
        }

        if let Ok(val) = std::env::var("ZONECAST_APP_ID") {
            if !val.is_empty() {
                self.app_id = Some(val);
            }
        }

        if let Ok(val) = std::env::var("ZONECAST_NAMESPACE") {
            if !val.is_empty() {
                self.namespace = Some(val);
            }
        }

        // ZONECAST_PREFS_PATH is handled by clap via #[arg(env = ...)] in main.rs
    }

    /// Converts to zonecast-core's Config type.
    pub fn to_core_config(&self) -> zonecast_core::Config {
        let mut config = zonecast_core::Config::default();
        config.preferred_port = self.bind_port;
        if let Some(app_id) = &self.app_id {
            config.app_id = app_id.clone();
        }
        if let Some(namespace) = &self.namespace {
            config.namespace = namespace.clone();
        }
        if let Some(receiver_url) = &self.receiver_url {
            config.receiver_url = receiver_url.clone();
        }
        config
    }
}
