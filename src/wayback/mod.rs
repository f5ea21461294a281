//! Snapshot resolver: recover an anchor post id from an archived listing.
//!
//! Post ids are stable while page numbers drift, so an id near the target
//! moment is a better search seed than the moment itself. The Wayback Machine
//! "closest snapshot" API gives us a historical copy of the gallery's front
//! page, and the newest post on that copy is the anchor.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::constants::ARCHIVE_TIMESTAMP_FORMAT;
use crate::fetch::browser_client;
use crate::gallery::{is_allowed_host, GalleryRef, ListingBases};
use crate::listing::parse_list_page;

/// Best-effort source of anchor post ids.
#[async_trait]
pub trait SnapshotResolver: Send + Sync {
    /// Newest post id on an archived copy of the gallery near `at`, if one is usable.
    async fn resolve_anchor(&self, gallery: &GalleryRef, at: DateTime<Utc>) -> Option<u64>;
}

#[derive(Debug, Default, Deserialize)]
struct AvailabilityResponse {
    #[serde(default)]
    archived_snapshots: ArchivedSnapshots,
}

#[derive(Debug, Default, Deserialize)]
struct ArchivedSnapshots {
    closest: Option<ClosestSnapshot>,
}

#[derive(Debug, Deserialize)]
struct ClosestSnapshot {
    timestamp: String,
    url: String,
    #[serde(default = "default_available")]
    available: bool,
}

fn default_available() -> bool {
    true
}

/// Wayback Machine backed resolver.
pub struct WaybackResolver {
    client: Client,
    api_url: String,
    bases: ListingBases,
    max_skew: TimeDelta,
}

impl WaybackResolver {
    /// Create a resolver from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: browser_client(config.request_timeout)?,
            api_url: config.archive_api_url.clone(),
            bases: ListingBases::new(&config.major_base_url, &config.minor_base_url),
            max_skew: config.snapshot_max_skew,
        })
    }

    async fn try_resolve(&self, gallery: &GalleryRef, at: DateTime<Utc>) -> Result<Option<u64>> {
        let listing_url = self.bases.gallery_url(gallery);
        let timestamp = at.format(ARCHIVE_TIMESTAMP_FORMAT).to_string();
        let check_url = format!(
            "{}?url={}&timestamp={timestamp}",
            self.api_url,
            urlencoding::encode(&listing_url)
        );

        let response = self
            .client
            .get(&check_url)
            .send()
            .await
            .context("Failed to query snapshot availability")?;

        if !response.status().is_success() {
            debug!(status = %response.status(), "Snapshot availability lookup failed");
            return Ok(None);
        }

        let availability: AvailabilityResponse = response
            .json()
            .await
            .context("Failed to parse snapshot availability")?;

        let Some(closest) = availability
            .archived_snapshots
            .closest
            .filter(|c| c.available)
        else {
            debug!(gallery = %gallery, "No archived snapshot");
            return Ok(None);
        };

        let Some(snapshot_at) = parse_archive_timestamp(&closest.timestamp) else {
            debug!(timestamp = %closest.timestamp, "Unparsable snapshot timestamp");
            return Ok(None);
        };

        if !within_skew(snapshot_at, at, self.max_skew) {
            debug!(gallery = %gallery, snapshot = %snapshot_at, target = %at, "Snapshot too far from target");
            return Ok(None);
        }

        if !is_archive_url(&closest.url, &self.api_url) {
            warn!(gallery = %gallery, snapshot = %closest.url, "Snapshot URL is not on the archive host");
            return Ok(None);
        }

        let html = self
            .client
            .get(&closest.url)
            .send()
            .await
            .context("Failed to fetch archived listing")?
            .error_for_status()
            .context("Archived listing returned an error status")?
            .text()
            .await
            .context("Failed to read archived listing")?;

        let anchor = parse_list_page(&html).iter().map(|p| p.id).max();
        if let Some(id) = anchor {
            info!(gallery = %gallery, snapshot = %closest.url, anchor = id, "Resolved anchor from snapshot");
        }
        Ok(anchor)
    }
}

#[async_trait]
impl SnapshotResolver for WaybackResolver {
    async fn resolve_anchor(&self, gallery: &GalleryRef, at: DateTime<Utc>) -> Option<u64> {
        match self.try_resolve(gallery, at).await {
            Ok(anchor) => anchor,
            Err(e) => {
                warn!(gallery = %gallery, "Snapshot lookup failed: {e:#}");
                None
            }
        }
    }
}

/// Parse a 14-digit archive timestamp (always UTC).
fn parse_archive_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw.trim(), ARCHIVE_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Whether `snapshot_url` is served by the archive behind `api_url` (same host or a subdomain).
fn is_archive_url(snapshot_url: &str, api_url: &str) -> bool {
    let host_of = |raw: &str| {
        url::Url::parse(raw)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
    };
    match (host_of(snapshot_url), host_of(api_url)) {
        (Some(snapshot), Some(api)) => is_allowed_host(&snapshot, &[api]),
        _ => false,
    }
}

fn within_skew(snapshot_at: DateTime<Utc>, target: DateTime<Utc>, max_skew: TimeDelta) -> bool {
    (snapshot_at - target).abs() <= max_skew
}
