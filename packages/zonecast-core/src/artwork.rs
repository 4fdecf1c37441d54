//! Supplemental artist artwork lookups.
//!
//! Best-effort enrichment of artist image lists from public catalog APIs.
//! Lookups are timeout-bounded, never error past this boundary (an empty
//! list is the failure mode), and run only after an initial payload has
//! already been dispatched.

use std::collections::HashSet;

use reqwest::Client;
use serde::Deserialize;

use crate::cast::types::NowPlaying;
use crate::protocol_constants::ARTWORK_TIMEOUT;

const DEEZER_ENDPOINT: &str = "https://api.deezer.com/search/artist";
const ITUNES_ENDPOINT: &str = "https://itunes.apple.com/search";

/// Known placeholder image markers to filter out of provider results.
const PLACEHOLDER_MARKERS: &[&str] = &[
    "artist/default-",
    "artist/000000",
    "artwork/default",
    "no-artwork",
    "placeholder",
    "avatar-default",
    "user-default",
    "audiodefault.png",
    "musicdefault.png",
    // iTunes serves a known placeholder under this hash and an empty artwork path.
    "bb7f14996b4e42ffbb76ea0e97c971de",
    "/0/0/0/0/",
];

/// Client for supplemental artist image lookups.
pub struct SupplementalArtClient {
    http: Client,
}

impl Default for SupplementalArtClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SupplementalArtClient {
    #[must_use]
    pub fn new() -> Self {
        let http = Client::builder()
            .timeout(ARTWORK_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");
        Self { http }
    }

    /// Wraps an existing (pooled) client.
    #[must_use]
    pub fn with_client(http: Client) -> Self {
        Self { http }
    }

    /// Fetches up to `desired` artist image URLs, deduplicated across
    /// providers. Returns an empty list on any failure.
    pub async fn fetch_supplemental_images(&self, artist: &str, desired: usize) -> Vec<String> {
        if artist.is_empty() || desired == 0 {
            return Vec::new();
        }
        log::debug!(
            "[Artwork] fetching up to {} image(s) for '{}'",
            desired,
            artist
        );

        let mut seen = HashSet::new();
        let mut results = Vec::new();
        let mut add_all = |urls: Vec<String>, results: &mut Vec<String>| {
            for url in urls {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    continue;
                }
                if seen.insert(url.clone()) {
                    results.push(url);
                }
            }
        };

        let (deezer, itunes) = tokio::join!(
            self.fetch_deezer(artist, desired * 3),
            self.fetch_itunes(artist, desired * 4),
        );
        add_all(deezer, &mut results);
        add_all(itunes, &mut results);

        // Compound credits rarely match a catalog entry; fall back to the
        // first couple of individual artists.
        if results.len() < desired && artist.contains(['/', ',', '&', ';']) {
            let individuals: Vec<&str> = artist
                .split(['/', ',', '&', ';'])
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .take(2)
                .collect();
            for name in individuals {
                if results.len() >= desired {
                    break;
                }
                let (deezer, itunes) =
                    tokio::join!(self.fetch_deezer(name, 3), self.fetch_itunes(name, 4));
                add_all(deezer, &mut results);
                add_all(itunes, &mut results);
            }
        }

        results.truncate(desired);
        log::debug!("[Artwork] returning {} unique image(s)", results.len());
        results
    }

    async fn fetch_deezer(&self, artist: &str, limit: usize) -> Vec<String> {
        #[derive(Deserialize)]
        struct DeezerResponse {
            #[serde(default)]
            data: Vec<DeezerArtist>,
        }
        #[derive(Deserialize)]
        struct DeezerArtist {
            picture_xl: Option<String>,
            picture_big: Option<String>,
            picture_medium: Option<String>,
            picture: Option<String>,
        }

        let response = self
            .http
            .get(DEEZER_ENDPOINT)
            .query(&[("q", artist), ("limit", &limit.to_string())])
            .send()
            .await;
        let payload: DeezerResponse = match decode(response).await {
            Ok(payload) => payload,
            Err(err) => {
                log::warn!("[Artwork] Deezer lookup failed: {}", err);
                return Vec::new();
            }
        };

        payload
            .data
            .into_iter()
            .filter_map(|entry| {
                entry
                    .picture_xl
                    .or(entry.picture_big)
                    .or(entry.picture_medium)
                    .or(entry.picture)
            })
            .filter(|url| !is_placeholder_image(url))
            .collect()
    }

    async fn fetch_itunes(&self, artist: &str, limit: usize) -> Vec<String> {
        #[derive(Deserialize)]
        struct ItunesResponse {
            #[serde(default)]
            results: Vec<ItunesEntry>,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct ItunesEntry {
            artwork_url100: Option<String>,
            artwork_url60: Option<String>,
        }

        let response = self
            .http
            .get(ITUNES_ENDPOINT)
            .query(&[
                ("term", artist),
                ("entity", "musicTrack"),
                ("limit", &limit.to_string()),
            ])
            .send()
            .await;
        let payload: ItunesResponse = match decode(response).await {
            Ok(payload) => payload,
            Err(err) => {
                log::warn!("[Artwork] iTunes lookup failed: {}", err);
                return Vec::new();
            }
        };

        payload
            .results
            .into_iter()
            .filter_map(|entry| entry.artwork_url100.or(entry.artwork_url60))
            .map(|url| url.replace("100x100", "1000x1000").replace("60x60", "1000x1000"))
            .filter(|url| !is_placeholder_image(url))
            .collect()
    }
}

async fn decode<T: serde::de::DeserializeOwned>(
    response: Result<reqwest::Response, reqwest::Error>,
) -> Result<T, String> {
    let response = response.map_err(|e| e.to_string())?;
    let response = response.error_for_status().map_err(|e| e.to_string())?;
    response.json().await.map_err(|e| e.to_string())
}

/// Filters provider results that are known placeholders rather than real
/// artist imagery.
fn is_placeholder_image(url: &str) -> bool {
    let lowered = url.to_ascii_lowercase();
    if PLACEHOLDER_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
    {
        return true;
    }
    // Very short URLs are invariably generic stand-ins.
    url.len() < 50
}

/// Extracts the primary artist from track metadata.
///
/// Prefers the explicit artist field over second-line text (which may name a
/// composer); compound credits collapse to the first artist.
#[must_use]
pub fn extract_artist_name(now_playing: &NowPlaying) -> Option<String> {
    let name = now_playing
        .artist
        .clone()
        .or_else(|| {
            now_playing
                .three_line
                .as_ref()
                .and_then(|lines| lines.line2.clone())
        })
        .or_else(|| {
            now_playing
                .two_line
                .as_ref()
                .and_then(|lines| lines.line2.clone())
        })
        .or_else(|| {
            now_playing
                .one_line
                .as_ref()
                .and_then(|lines| lines.line2.clone())
        })?;

    let name = match name.split_once(" / ") {
        Some((primary, _)) => primary.trim().to_string(),
        None => name,
    };
    (!name.is_empty()).then_some(name)
}

/// Merges supplemental URLs into an existing list, deduplicating and keeping
/// at most `max` entries. The existing order is preserved.
#[must_use]
pub fn merge_artist_images(existing: &[String], supplemental: &[String], max: usize) -> Vec<String> {
    let mut merged: Vec<String> = existing.iter().filter(|url| !url.is_empty()).cloned().collect();
    merged.truncate(max);
    for url in supplemental {
        if merged.len() >= max {
            break;
        }
        if url.is_empty() || merged.contains(url) {
            continue;
        }
        merged.push(url.clone());
    }
    merged
}
