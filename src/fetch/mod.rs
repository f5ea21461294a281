//! Upstream listing fetch.
//!
//! The locator and harvester only see the [`PageSource`] trait, so they can be
//! driven by the real site or by a synthetic in-memory gallery.

#[cfg(test)]
pub(crate) mod memory;

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, REFERER};
use reqwest::Client;
use tracing::debug;

use crate::config::Config;
use crate::constants::{BROWSER_ACCEPT, BROWSER_USER_AGENT, ONSITE_REFERER};
use crate::gallery::{GalleryRef, ListingBases};
use crate::listing::{parse_list_page, PageInfo, PostRecord};

/// Source of numbered listing pages, newest first.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch and parse one listing page into posts, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure or a non-2xx response.
    async fn fetch_page(&self, gallery: &GalleryRef, page: u64) -> Result<Vec<PostRecord>>;

    /// Range summary of one page. Fetch failures collapse to an empty summary.
    async fn page_info(&self, gallery: &GalleryRef, page: u64) -> PageInfo {
        match self.fetch_page(gallery, page).await {
            Ok(posts) => PageInfo::from_posts(&posts),
            Err(e) => {
                debug!(gallery = %gallery, page, "No page info: {e:#}");
                PageInfo::default()
            }
        }
    }
}

/// Fetches listing pages from the live site.
#[derive(Debug, Clone)]
pub struct HttpPageSource {
    client: Client,
    bases: ListingBases,
}

impl HttpPageSource {
    /// Build a page source from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self> {
        let client = browser_client(config.request_timeout)?;
        let bases = ListingBases::new(&config.major_base_url, &config.minor_base_url);
        Ok(Self { client, bases })
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_page(&self, gallery: &GalleryRef, page: u64) -> Result<Vec<PostRecord>> {
        let url = self.bases.page_url(gallery, page);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch listing page {page}"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("Listing page {page} returned status {status}");
        }

        let html = response
            .text()
            .await
            .context("Failed to read listing body")?;

        let posts = parse_list_page(&html);
        debug!(gallery = %gallery, page, posts = posts.len(), "Fetched listing page");
        Ok(posts)
    }
}

/// HTTP client that presents itself as an on-site desktop browser.
///
/// # Errors
///
/// Returns an error if the client cannot be built.
pub fn browser_client(timeout: Duration) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
    headers.insert(REFERER, HeaderValue::from_static(ONSITE_REFERER));

    Client::builder()
        .timeout(timeout)
        .user_agent(BROWSER_USER_AGENT)
        .default_headers(headers)
        .build()
        .context("Failed to create HTTP client")
}
