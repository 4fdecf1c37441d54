//! Hosted artwork store.
//!
//! Payloads reference album art and artist portraits by URL; this component
//! holds the bytes behind those URLs for a bounded lifetime. It is an
//! explicit instance constructed once at bootstrap and passed to whoever
//! needs it, never a process-wide global.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::context::NetworkContext;
use crate::protocol_constants::{IMAGE_CLEANUP_INTERVAL, IMAGE_TTL};

/// Reference to a stored image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub id: String,
    pub url: String,
}

#[derive(Clone)]
struct ImageEntry {
    id: String,
    cache_key: String,
    bytes: Bytes,
    content_type: String,
    expires_at: Instant,
}

/// In-memory image cache with TTL-based expiry.
pub struct ImageStore {
    network: NetworkContext,
    ttl: Duration,
    by_cache_key: DashMap<String, ImageEntry>,
    /// Secondary index: image id -> cache key.
    by_id: DashMap<String, String>,
}

impl ImageStore {
    #[must_use]
    pub fn new(network: NetworkContext) -> Self {
        Self::with_ttl(network, IMAGE_TTL)
    }

    #[must_use]
    pub fn with_ttl(network: NetworkContext, ttl: Duration) -> Self {
        Self {
            network,
            ttl,
            by_cache_key: DashMap::new(),
            by_id: DashMap::new(),
        }
    }

    /// Stores (or refreshes) an image under a cache key and returns its URL.
    pub fn save(
        &self,
        cache_key: &str,
        bytes: Bytes,
        content_type: &str,
        now: Instant,
    ) -> StoredImage {
        let expires_at = now + self.ttl;
        if let Some(mut entry) = self.by_cache_key.get_mut(cache_key) {
            entry.bytes = bytes;
            entry.content_type = content_type.to_string();
            entry.expires_at = expires_at;
            return StoredImage {
                id: entry.id.clone(),
                url: self.url_for(&entry.id),
            };
        }

        let id = Uuid::new_v4().simple().to_string();
        let entry = ImageEntry {
            id: id.clone(),
            cache_key: cache_key.to_string(),
            bytes,
            content_type: content_type.to_string(),
            expires_at,
        };
        self.by_cache_key.insert(cache_key.to_string(), entry);
        self.by_id.insert(id.clone(), cache_key.to_string());
        StoredImage {
            url: self.url_for(&id),
            id,
        }
    }

    /// Looks up a live entry by cache key.
    #[must_use]
    pub fn get_by_cache_key(&self, cache_key: &str, now: Instant) -> Option<StoredImage> {
        let entry = self.by_cache_key.get(cache_key)?;
        if entry.expires_at <= now {
            let id = entry.id.clone();
            drop(entry);
            self.remove(cache_key, &id);
            return None;
        }
        Some(StoredImage {
            id: entry.id.clone(),
            url: self.url_for(&entry.id),
        })
    }

    /// Fetches image bytes and content type for serving, by public id.
    #[must_use]
    pub fn get_by_id(&self, id: &str, now: Instant) -> Option<(Bytes, String)> {
        let cache_key = self.by_id.get(id)?.value().clone();
        let entry = self.by_cache_key.get(&cache_key)?;
        if entry.expires_at <= now {
            drop(entry);
            self.remove(&cache_key, id);
            return None;
        }
        Some((entry.bytes.clone(), entry.content_type.clone()))
    }

    /// Removes every expired entry; returns how many were dropped.
    pub fn cleanup(&self, now: Instant) -> usize {
        let expired: Vec<(String, String)> = self
            .by_cache_key
            .iter()
            .filter(|entry| entry.expires_at <= now)
            .map(|entry| (entry.cache_key.clone(), entry.id.clone()))
            .collect();
        for (cache_key, id) in &expired {
            self.remove(cache_key, id);
        }
        expired.len()
    }

    fn remove(&self, cache_key: &str, id: &str) {
        self.by_cache_key.remove(cache_key);
        self.by_id.remove(id);
    }

    fn url_for(&self, id: &str) -> String {
        self.network.build_url(&format!("/images/{id}"))
    }
}

/// Spawns the periodic expiry sweep for a store.
pub fn spawn_cleanup(store: Arc<ImageStore>, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(IMAGE_CLEANUP_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {
                    let dropped = store.cleanup(Instant::now());
                    if dropped > 0 {
                        log::debug!("[Images] expired {} image(s)", dropped);
                    }
                }
            }
        }
    });
}
