//! Receiver registry with freshness tracking and eviction.
//!
//! Announcements upsert devices keyed by their stable id; entries that stop
//! being re-announced are evicted by the staleness sweep. The registry is the
//! exclusive owner of device records: readers only ever get snapshots.

use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;

use super::types::DeviceEndpoint;
use crate::protocol_constants::DEFAULT_RECEIVER_PORT;

/// A discovered receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Stable identifier: the announcement's `id` TXT record, falling back to
    /// the mDNS fullname.
    pub id: String,
    pub name: String,
    pub model: Option<String>,
    pub address: String,
    pub port: u16,
    pub last_seen: Instant,
}

/// A device row as exposed to external consumers, annotated with selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceView {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub address: String,
    pub is_selected: bool,
}

/// A parsed discovery announcement. Fields the announcement omits are
/// inherited from any existing record at registration time.
#[derive(Debug, Clone, Default)]
pub struct DeviceAnnouncement {
    pub id: Option<String>,
    pub fullname: String,
    pub friendly_name: Option<String>,
    pub model: Option<String>,
    pub addresses: Vec<String>,
    pub port: Option<u16>,
}

/// The set of known receivers, ordered by discovery order.
pub struct DeviceRegistry {
    devices: RwLock<Vec<Device>>,
    ttl: Duration,
}

impl DeviceRegistry {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            devices: RwLock::new(Vec::new()),
            ttl,
        }
    }

    /// Upserts a device from an announcement.
    ///
    /// Returns a snapshot of the registered device, or `None` when the
    /// announcement carries no usable address for a previously unknown device.
    pub fn register(&self, announcement: DeviceAnnouncement, now: Instant) -> Option<Device> {
        let id = announcement
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| announcement.fullname.clone());
        if id.is_empty() {
            return None;
        }

        let mut devices = self.devices.write();
        if let Some(existing) = devices.iter_mut().find(|device| device.id == id) {
            if let Some(name) = announcement.friendly_name {
                existing.name = name;
            }
            if let Some(model) = announcement.model {
                existing.model = Some(model);
            }
            if let Some(address) = announcement.addresses.into_iter().next() {
                existing.address = address;
            }
            if let Some(port) = announcement.port.filter(|port| *port != 0) {
                existing.port = port;
            }
            existing.last_seen = now;
            return Some(existing.clone());
        }

        let address = announcement.addresses.into_iter().next()?;
        let device = Device {
            name: announcement
                .friendly_name
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| id.clone()),
            id,
            model: announcement.model,
            address,
            port: announcement
                .port
                .filter(|port| *port != 0)
                .unwrap_or(DEFAULT_RECEIVER_PORT),
            last_seen: now,
        };
        log::info!(
            "[Discovery] registered receiver '{}' ({}) at {}:{}",
            device.name,
            device.id,
            device.address,
            device.port
        );
        devices.push(device.clone());
        Some(device)
    }

    /// Evicts every device whose last announcement is older than the TTL.
    ///
    /// Returns whether anything was removed, so callers know to notify
    /// observers.
    pub fn purge_stale(&self, now: Instant) -> bool {
        let mut devices = self.devices.write();
        let before = devices.len();
        devices.retain(|device| now.duration_since(device.last_seen) <= self.ttl);
        let removed = before - devices.len();
        if removed > 0 {
            log::info!("[Discovery] evicted {} stale receiver(s)", removed);
        }
        removed > 0
    }

    /// Devices in discovery order, annotated with the current selection.
    #[must_use]
    pub fn list(&self, selected: Option<&str>) -> Vec<DeviceView> {
        self.devices
            .read()
            .iter()
            .map(|device| DeviceView {
                id: device.id.clone(),
                name: device.name.clone(),
                model: device.model.clone(),
                address: device.address.clone(),
                is_selected: Some(device.id.as_str()) == selected,
            })
            .collect()
    }

    /// Connect-time address snapshot for one device.
    #[must_use]
    pub fn endpoint(&self, id: &str) -> Option<DeviceEndpoint> {
        self.devices
            .read()
            .iter()
            .find(|device| device.id == id)
            .map(|device| DeviceEndpoint {
                id: device.id.clone(),
                address: device.address.clone(),
                port: device.port,
            })
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.devices.read().iter().any(|device| device.id == id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn announcement(id: &str, name: &str, address: &str) -> DeviceAnnouncement {
        DeviceAnnouncement {
            id: Some(id.to_string()),
            fullname: format!("{id}._googlecast._tcp.local."),
            friendly_name: Some(name.to_string()),
            model: None,
            addresses: vec![address.to_string()],
            port: None,
        }
    }

    #[test]
    fn registers_device_from_announcement() {
        let registry = DeviceRegistry::new(Duration::from_secs(86_400));
        let now = Instant::now();
        registry
            .register(announcement("r1", "Kitchen", "10.0.0.5"), now)
            .unwrap();

        let listed = registry.list(None);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Kitchen");
        assert_eq!(listed[0].address, "10.0.0.5");
        assert!(!listed[0].is_selected);
    }

    #[test]
    fn defaults_port_when_announcement_omits_it() {
        let registry = DeviceRegistry::new(Duration::from_secs(86_400));
        registry
            .register(announcement("r1", "Kitchen", "10.0.0.5"), Instant::now())
            .unwrap();
        assert_eq!(registry.endpoint("r1").unwrap().port, DEFAULT_RECEIVER_PORT);
    }

    #[test]
    fn partial_reannouncement_inherits_known_fields() {
        let registry = DeviceRegistry::new(Duration::from_secs(86_400));
        let now = Instant::now();
        let mut first = announcement("r1", "Kitchen", "10.0.0.5");
        first.model = Some("Chromecast Audio".to_string());
        first.port = Some(8010);
        registry.register(first, now).unwrap();

        // Later announcement without name/model/port keeps the known values.
        let bare = DeviceAnnouncement {
            id: Some("r1".to_string()),
            fullname: "r1._googlecast._tcp.local.".to_string(),
            ..Default::default()
        };
        let updated = registry.register(bare, now + Duration::from_secs(60)).unwrap();
        assert_eq!(updated.name, "Kitchen");
        assert_eq!(updated.model.as_deref(), Some("Chromecast Audio"));
        assert_eq!(updated.address, "10.0.0.5");
        assert_eq!(updated.port, 8010);
        assert_eq!(updated.last_seen, now + Duration::from_secs(60));
    }

    #[test]
    fn falls_back_to_fullname_when_id_missing() {
        let registry = DeviceRegistry::new(Duration::from_secs(86_400));
        let ann = DeviceAnnouncement {
            id: None,
            fullname: "living-room._googlecast._tcp.local.".to_string(),
            addresses: vec!["10.0.0.9".to_string()],
            ..Default::default()
        };
        let device = registry.register(ann, Instant::now()).unwrap();
        assert_eq!(device.id, "living-room._googlecast._tcp.local.");
    }

    #[test]
    fn unknown_device_without_address_is_ignored() {
        let registry = DeviceRegistry::new(Duration::from_secs(86_400));
        let ann = DeviceAnnouncement {
            id: Some("r1".to_string()),
            fullname: "r1._googlecast._tcp.local.".to_string(),
            ..Default::default()
        };
        assert!(registry.register(ann, Instant::now()).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn stale_devices_are_evicted_after_ttl() {
        let ttl = Duration::from_secs(86_400);
        let registry = DeviceRegistry::new(ttl);
        let now = Instant::now();
        registry
            .register(announcement("r1", "Kitchen", "10.0.0.5"), now)
            .unwrap();
        registry
            .register(announcement("r2", "Bedroom", "10.0.0.6"), now)
            .unwrap();

        // Only r2 gets re-announced before the TTL expires.
        let later = now + ttl - Duration::from_secs(60);
        registry
            .register(announcement("r2", "Bedroom", "10.0.0.6"), later)
            .unwrap();

        let removed = registry.purge_stale(now + ttl + Duration::from_secs(1));
        assert!(removed);
        let listed = registry.list(None);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "r2");

        // Nothing more to purge: the report flips to false.
        assert!(!registry.purge_stale(now + ttl + Duration::from_secs(2)));
    }

    #[test]
    fn reannouncement_keeps_id_and_discovery_order() {
        let registry = DeviceRegistry::new(Duration::from_secs(86_400));
        let now = Instant::now();
        registry
            .register(announcement("r1", "Kitchen", "10.0.0.5"), now)
            .unwrap();
        registry
            .register(announcement("r2", "Bedroom", "10.0.0.6"), now)
            .unwrap();
        registry
            .register(
                announcement("r1", "Kitchen Display", "10.0.0.5"),
                now + Duration::from_secs(5),
            )
            .unwrap();

        let listed = registry.list(Some("r2"));
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "r1");
        assert_eq!(listed[0].name, "Kitchen Display");
        assert!(!listed[0].is_selected);
        assert!(listed[1].is_selected);
    }
}
