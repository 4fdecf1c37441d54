//! mDNS discovery of Cast receivers.
//!
//! Browses `_googlecast._tcp.local.` continuously and turns resolved services
//! into [`DeviceAnnouncement`]s for the registry. Uses resolved record data
//! (IPs from SRV/A answers) rather than string parsing, and prefers IPv4 since
//! receivers bind their TLS endpoint there.
//!
//! Discovery never blocks, and is never blocked by, the session engine: it
//! runs on its own task and only ever produces announcements.

use std::collections::HashMap;
use std::sync::Arc;

use mdns_sd::{ResolvedService, ScopedIp, ServiceDaemon, ServiceEvent};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::registry::DeviceAnnouncement;
use crate::protocol_constants::CAST_SERVICE_TYPE;

/// Discovery failures. Non-fatal: the browse loop logs and keeps going where
/// it can, and the rest of the system works off whatever the registry holds.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("mDNS daemon failed: {0}")]
    MdnsDaemon(String),
    #[error("mDNS browse failed: {0}")]
    Browse(String),
}

/// Creates the shared mDNS daemon. Call once and reuse; the daemon owns a
/// background thread.
pub fn create_daemon() -> Result<ServiceDaemon, DiscoveryError> {
    ServiceDaemon::new().map_err(|e| DiscoveryError::MdnsDaemon(e.to_string()))
}

/// Handle for re-triggering the discovery query.
#[derive(Clone)]
pub struct RefreshHandle {
    refresh: mpsc::Sender<()>,
}

impl RefreshHandle {
    /// Requests a browse restart. Coalesces when one is already queued.
    pub fn refresh(&self) {
        let _ = self.refresh.try_send(());
    }
}

/// Spawns the browse loop.
///
/// Resolved announcements arrive on the returned receiver; the loop ends when
/// `cancel` fires or the consumer goes away.
pub fn spawn_browser(
    daemon: Arc<ServiceDaemon>,
    cancel: CancellationToken,
) -> Result<(mpsc::Receiver<DeviceAnnouncement>, RefreshHandle), DiscoveryError> {
    let receiver = daemon
        .browse(CAST_SERVICE_TYPE)
        .map_err(|e| DiscoveryError::Browse(e.to_string()))?;
    let (announce_tx, announce_rx) = mpsc::channel(32);
    let (refresh_tx, mut refresh_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        let mut events = receiver;
        log::info!("[Discovery] browsing for cast receivers");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = refresh_rx.recv() => {
                    log::info!("[Discovery] manual refresh requested");
                    if let Err(err) = daemon.stop_browse(CAST_SERVICE_TYPE) {
                        log::warn!("[Discovery] stop-browse failed: {:?}", err);
                    }
                    match daemon.browse(CAST_SERVICE_TYPE) {
                        Ok(fresh) => events = fresh,
                        Err(err) => log::warn!("[Discovery] re-browse failed: {:?}", err),
                    }
                }
                event = events.recv_async() => match event {
                    Ok(ServiceEvent::ServiceResolved(info)) => {
                        if let Some(announcement) = announcement_from_resolved(&info) {
                            if announce_tx.send(announcement).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        log::warn!("[Discovery] browse channel closed: {:?}", err);
                        break;
                    }
                },
            }
        }
        if let Err(err) = daemon.stop_browse(CAST_SERVICE_TYPE) {
            log::debug!("[Discovery] stop-browse on shutdown failed: {:?}", err);
        }
    });

    Ok((announce_rx, RefreshHandle { refresh: refresh_tx }))
}

/// Extracts an announcement from a resolved service record.
fn announcement_from_resolved(info: &ResolvedService) -> Option<DeviceAnnouncement> {
    let mut txt = HashMap::new();
    for property in info.txt_properties.iter() {
        txt.insert(
            property.key().to_string(),
            property.val_str().to_string(),
        );
    }

    // IPv4 first, any remaining addresses after.
    let mut addresses: Vec<String> = info
        .addresses
        .iter()
        .filter_map(|addr| match addr {
            ScopedIp::V4(v4) => Some(v4.addr().to_string()),
            _ => None,
        })
        .collect();
    addresses.extend(info.addresses.iter().filter_map(|addr| match addr {
        ScopedIp::V4(_) => None,
        other => Some(other.to_ip_addr().to_string()),
    }));

    build_announcement(&info.fullname, info.port, &txt, addresses)
}

/// Pure assembly of an announcement from raw record data.
fn build_announcement(
    fullname: &str,
    port: u16,
    txt: &HashMap<String, String>,
    addresses: Vec<String>,
) -> Option<DeviceAnnouncement> {
    if addresses.is_empty() {
        return None;
    }
    Some(DeviceAnnouncement {
        id: txt.get("id").cloned(),
        fullname: fullname.to_string(),
        friendly_name: txt.get("fn").cloned(),
        model: txt.get("md").cloned(),
        addresses,
        port: (port > 0).then_some(port),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txt(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn builds_announcement_from_txt_records() {
        let ann = build_announcement(
            "Kitchen-abc123._googlecast._tcp.local.",
            8009,
            &txt(&[("id", "r1"), ("fn", "Kitchen"), ("md", "Chromecast")]),
            vec!["10.0.0.5".to_string()],
        )
        .unwrap();
        assert_eq!(ann.id.as_deref(), Some("r1"));
        assert_eq!(ann.friendly_name.as_deref(), Some("Kitchen"));
        assert_eq!(ann.model.as_deref(), Some("Chromecast"));
        assert_eq!(ann.port, Some(8009));
        assert_eq!(ann.addresses, vec!["10.0.0.5"]);
    }

    #[test]
    fn missing_txt_fields_stay_unset() {
        let ann = build_announcement(
            "mystery._googlecast._tcp.local.",
            0,
            &txt(&[]),
            vec!["10.0.0.7".to_string()],
        )
        .unwrap();
        assert!(ann.id.is_none());
        assert!(ann.friendly_name.is_none());
        assert!(ann.model.is_none());
        assert!(ann.port.is_none());
        assert_eq!(ann.fullname, "mystery._googlecast._tcp.local.");
    }

    #[test]
    fn record_without_addresses_is_dropped() {
        assert!(build_announcement(
            "ghost._googlecast._tcp.local.",
            8009,
            &txt(&[("id", "r9")]),
            vec![],
        )
        .is_none());
    }
}
