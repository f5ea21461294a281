use thiserror::Error;

/// Terminal outcomes of a locate-and-harvest request that are surfaced to the caller.
///
/// Upstream fetch failures and malformed pages never show up here: they are
/// downgraded to "no information" for the page in question.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HarvestError {
    #[error("invalid listing URL: {0}")]
    InvalidUrl(String),
    #[error("host is not an allowed gallery host: {0}")]
    DisallowedHost(String),
    #[error("listing URL has no gallery id")]
    MissingGalleryId,
    #[error("a target time or a target post id is required")]
    MissingTarget,
    #[error("invalid target time: {0}")]
    InvalidTime(String),
    #[error("invalid request parameter: {0}")]
    InvalidParameter(String),
    #[error("no posts found in range for {gallery_id} after {hops} gallery attempt(s)")]
    NotFound { gallery_id: String, hops: u32 },
}

impl HarvestError {
    /// Whether this error was raised before any network activity.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::NotFound { .. })
    }
}
