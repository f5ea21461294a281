//! Gallery identity, listing URL validation and migration numbering.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::error::HarvestError;

/// Trailing migration number on a gallery id, e.g. `stockus3`.
static MIGRATION_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*\D)(\d+)$").expect("valid migration regex"));

/// Path form of a single post URL, e.g. `/board/stock/12345`.
static POST_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/board/[^/]+/(\d+)").expect("valid post path regex"));

/// A gallery on the upstream site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GalleryRef {
    /// Raw community identifier, possibly ending in a migration number.
    pub gallery_id: String,
    /// Minor galleries are listed under a different base path.
    pub is_minor: bool,
}

impl GalleryRef {
    #[must_use]
    pub fn new(gallery_id: impl Into<String>, is_minor: bool) -> Self {
        Self {
            gallery_id: gallery_id.into(),
            is_minor,
        }
    }

    /// Build a gallery reference from a user supplied listing or post URL.
    ///
    /// The host must be one of `allowed_hosts` (or a subdomain of one) so the
    /// engine cannot be pointed at arbitrary servers.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the URL is malformed, the host is not
    /// allowed, or there is no `id` query parameter.
    pub fn from_listing_url(listing_url: &str, allowed_hosts: &[String]) -> Result<Self, HarvestError> {
        let url = parse_allowed_url(listing_url, allowed_hosts)?;

        let gallery_id = url
            .query_pairs()
            .find(|(key, _)| key == "id")
            .map(|(_, value)| value.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or(HarvestError::MissingGalleryId)?;

        let host = url.host_str().unwrap_or_default();
        let is_minor = host.contains("mgallery") || url.path().contains("mgallery");

        Ok(Self::new(gallery_id, is_minor))
    }

    /// The gallery this one was migrated from, if the id carries a migration number above 1.
    #[must_use]
    pub fn predecessor(&self) -> Option<Self> {
        let caps = MIGRATION_SUFFIX.captures(&self.gallery_id)?;
        let name = caps.get(1)?.as_str();
        let digits = caps.get(2)?.as_str();
        let number: u64 = digits.parse().ok()?;
        if number <= 1 {
            return None;
        }
        // Zero-padded numbers keep their width: stock010 -> stock009
        let width = if digits.starts_with('0') { digits.len() } else { 0 };
        Some(Self::new(
            format!("{name}{:0width$}", number - 1),
            self.is_minor,
        ))
    }
}

impl std::fmt::Display for GalleryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_minor {
            write!(f, "{} (minor)", self.gallery_id)
        } else {
            f.write_str(&self.gallery_id)
        }
    }
}

/// Base listing paths for the two gallery classes.
#[derive(Debug, Clone)]
pub struct ListingBases {
    pub major: String,
    pub minor: String,
}

impl ListingBases {
    #[must_use]
    pub fn new(major: impl Into<String>, minor: impl Into<String>) -> Self {
        Self {
            major: major.into(),
            minor: minor.into(),
        }
    }

    fn base_for(&self, gallery: &GalleryRef) -> &str {
        if gallery.is_minor {
            &self.minor
        } else {
            &self.major
        }
    }

    /// URL of the gallery's front listing, without a page number.
    #[must_use]
    pub fn gallery_url(&self, gallery: &GalleryRef) -> String {
        format!(
            "{}?id={}",
            self.base_for(gallery),
            urlencoding::encode(&gallery.gallery_id)
        )
    }

    /// URL of one numbered listing page.
    #[must_use]
    pub fn page_url(&self, gallery: &GalleryRef, page: u64) -> String {
        format!("{}&page={page}", self.gallery_url(gallery))
    }
}

/// Pull a post number out of a single-post URL (`no` parameter or `/board/<id>/<no>` path).
#[must_use]
pub fn post_id_from_url(raw: &str) -> Option<u64> {
    let url = Url::parse(raw).ok()?;
    if let Some(no) = url
        .query_pairs()
        .find(|(key, _)| key == "no")
        .and_then(|(_, value)| value.trim().parse().ok())
    {
        return Some(no);
    }
    POST_PATH
        .captures(url.path())
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn parse_allowed_url(raw: &str, allowed_hosts: &[String]) -> Result<Url, HarvestError> {
    let url = Url::parse(raw.trim()).map_err(|e| HarvestError::InvalidUrl(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(HarvestError::InvalidUrl(format!(
            "unsupported scheme {}",
            url.scheme()
        )));
    }
    let host = url
        .host_str()
        .ok_or_else(|| HarvestError::InvalidUrl("missing host".to_string()))?
        .to_ascii_lowercase();
    if !is_allowed_host(&host, allowed_hosts) {
        return Err(HarvestError::DisallowedHost(host));
    }
    Ok(url)
}

/// Check a host against the allow-list: exact match or a subdomain of an entry.
pub(crate) fn is_allowed_host(host: &str, allowed_hosts: &[String]) -> bool {
    allowed_hosts.iter().any(|allowed| {
        let allowed = allowed.trim_start_matches('.');
        host == allowed || host.ends_with(&format!(".{allowed}"))
    })
}
