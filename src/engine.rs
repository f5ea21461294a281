//! Locate-and-harvest engine with gallery migration.
//!
//! A request names a gallery and a target (a moment, a post id, or both).
//! Each attempt locates a starting page, harvests back to the window start
//! and filters to the window. When an attempt finds nothing and the gallery
//! id ends in a migration number, the previous numbered gallery is tried,
//! up to the hop cap.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{Config, EngineLimits};
use crate::error::HarvestError;
use crate::fetch::{HttpPageSource, PageSource};
use crate::gallery::{post_id_from_url, GalleryRef};
use crate::harvester::{harvest, TimeWindow};
use crate::listing::{parse_exact_time, PostRecord};
use crate::locator::{locate_by_post_id, locate_by_time, search_bracket, SearchBracket, SearchTarget};
use crate::wayback::{SnapshotResolver, WaybackResolver};

/// Extra formats accepted for a caller supplied target time (browser datetime inputs).
const MINUTE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"];

/// What the caller wants harvested.
#[derive(Debug, Clone, Default)]
pub struct HarvestRequest {
    /// Gallery listing URL, or a single post URL carrying the gallery id.
    pub listing_url: String,
    pub target_start: Option<DateTime<Utc>>,
    /// Defaults to `target_start + duration`.
    pub target_end: Option<DateTime<Utc>>,
    pub duration: Option<TimeDelta>,
    /// Falls back to a post number found in `listing_url`.
    pub target_post_id: Option<u64>,
    /// Skip locating on the first attempt and start harvesting here.
    pub start_page: Option<u64>,
}

/// Posts found in the window, oldest first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestResponse {
    pub posts: Vec<PostRecord>,
    pub count: usize,
    pub resolved_gallery_id: String,
}

/// Decision taken after one gallery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HopDecision {
    Done,
    Retry(GalleryRef),
    GiveUp,
}

/// Migration state transition after attempt number `hop` (zero based).
#[must_use]
pub fn next_hop(gallery: &GalleryRef, hop: u32, found_posts: bool, max_hops: u32) -> HopDecision {
    if found_posts {
        return HopDecision::Done;
    }
    if hop.saturating_add(1) >= max_hops {
        return HopDecision::GiveUp;
    }
    gallery
        .predecessor()
        .map_or(HopDecision::GiveUp, HopDecision::Retry)
}

/// Validated request.
#[derive(Debug, Clone)]
struct Plan {
    gallery: GalleryRef,
    window: Option<TimeWindow>,
    anchor_at: Option<DateTime<Utc>>,
    duration: TimeDelta,
    post_id: Option<u64>,
    start_page: Option<u64>,
}

pub struct HarvestEngine {
    source: Arc<dyn PageSource>,
    snapshots: Option<Arc<dyn SnapshotResolver>>,
    limits: EngineLimits,
    allowed_hosts: Vec<String>,
    source_offset: FixedOffset,
    default_duration: TimeDelta,
}

impl HarvestEngine {
    /// Engine over an arbitrary page source, without snapshot resolution.
    #[must_use]
    pub fn new(source: Arc<dyn PageSource>, config: &Config) -> Self {
        Self {
            source,
            snapshots: None,
            limits: config.limits.clone(),
            allowed_hosts: config.allowed_hosts.clone(),
            source_offset: config.source_offset,
            default_duration: config.default_duration,
        }
    }

    #[must_use]
    pub fn with_snapshot_resolver(mut self, resolver: Arc<dyn SnapshotResolver>) -> Self {
        self.snapshots = Some(resolver);
        self
    }

    /// Engine against the live site, with the Wayback resolver when enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let engine = Self::new(Arc::new(HttpPageSource::new(config)?), config);
        if config.snapshot_enabled {
            Ok(engine.with_snapshot_resolver(Arc::new(WaybackResolver::new(config)?)))
        } else {
            Ok(engine)
        }
    }

    /// Offset in which the upstream renders exact times.
    #[must_use]
    pub fn source_offset(&self) -> FixedOffset {
        self.source_offset
    }

    /// Find the request's window and return every post in it.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any network activity if the request
    /// is unusable, and [`HarvestError::NotFound`] when no attempt found posts
    /// in the window.
    pub async fn locate_and_harvest(
        &self,
        request: &HarvestRequest,
    ) -> Result<HarvestResponse, HarvestError> {
        let plan = self.plan(request)?;
        info!(
            gallery = %plan.gallery,
            window = ?plan.window,
            post_id = ?plan.post_id,
            "Starting harvest"
        );

        let mut gallery = plan.gallery.clone();
        let mut window = plan.window;
        let mut hop = 0u32;

        loop {
            let posts = self.attempt(&gallery, hop == 0, &plan, &mut window).await;

            if window.is_none() {
                warn!(gallery = %gallery, "Could not resolve a time window from the target post");
                return Err(HarvestError::NotFound {
                    gallery_id: plan.gallery.gallery_id.clone(),
                    hops: hop + 1,
                });
            }

            match next_hop(&gallery, hop, !posts.is_empty(), self.limits.max_hops) {
                HopDecision::Done => {
                    info!(gallery = %gallery, posts = posts.len(), hops = hop + 1, "Harvest complete");
                    return Ok(HarvestResponse {
                        count: posts.len(),
                        posts,
                        resolved_gallery_id: gallery.gallery_id,
                    });
                }
                HopDecision::Retry(previous) => {
                    info!(from = %gallery, to = %previous, hop = hop + 1, "Nothing in range; trying previous gallery");
                    gallery = previous;
                    hop += 1;
                }
                HopDecision::GiveUp => {
                    info!(gallery = %gallery, hops = hop + 1, "Nothing in range after exhausting history");
                    return Err(HarvestError::NotFound {
                        gallery_id: plan.gallery.gallery_id.clone(),
                        hops: hop + 1,
                    });
                }
            }
        }
    }

    fn plan(&self, request: &HarvestRequest) -> Result<Plan, HarvestError> {
        let gallery = GalleryRef::from_listing_url(&request.listing_url, &self.allowed_hosts)?;
        let post_id = request
            .target_post_id
            .or_else(|| post_id_from_url(&request.listing_url));

        let duration = request.duration.unwrap_or(self.default_duration);
        if duration < TimeDelta::zero() {
            return Err(HarvestError::InvalidTime("duration is negative".to_string()));
        }

        let window = match request.target_start {
            Some(start) => {
                let start_local = self.to_local(start);
                let end_local = match request.target_end {
                    Some(end) => self.to_local(end),
                    None => start_local.checked_add_signed(duration).ok_or_else(|| {
                        HarvestError::InvalidTime("window end out of range".to_string())
                    })?,
                };
                if end_local < start_local {
                    return Err(HarvestError::InvalidTime(
                        "window ends before it starts".to_string(),
                    ));
                }
                Some(TimeWindow {
                    start: start_local,
                    end: end_local,
                })
            }
            None => None,
        };

        if window.is_none() && post_id.is_none() {
            return Err(HarvestError::MissingTarget);
        }
        if request.start_page == Some(0) {
            return Err(HarvestError::InvalidParameter(
                "startPage must be at least 1".to_string(),
            ));
        }

        Ok(Plan {
            gallery,
            window,
            anchor_at: request.target_start,
            duration,
            post_id,
            start_page: request.start_page,
        })
    }

    /// One gallery attempt: locate, pause, harvest, filter.
    async fn attempt(
        &self,
        gallery: &GalleryRef,
        first_hop: bool,
        plan: &Plan,
        window: &mut Option<TimeWindow>,
    ) -> Vec<PostRecord> {
        let start_page = if first_hop {
            self.first_start_page(gallery, plan, window).await
        } else {
            // Anchors from another gallery mean nothing here
            match *window {
                Some(w) => locate_by_time(self.source.as_ref(), gallery, w.end, &self.limits).await,
                None => return Vec::new(),
            }
        };

        let Some(window) = *window else {
            return Vec::new();
        };

        sleep(self.limits.batch_delay).await;

        let outcome = harvest(self.source.as_ref(), gallery, start_page, &window, &self.limits).await;
        let exhausted = outcome.exhausted;
        let posts = outcome.into_window(&window);
        debug!(gallery = %gallery, start_page, exhausted, in_range = posts.len(), "Attempt finished");
        posts
    }

    async fn first_start_page(
        &self,
        gallery: &GalleryRef,
        plan: &Plan,
        window: &mut Option<TimeWindow>,
    ) -> u64 {
        if let Some(page) = plan.start_page {
            if window.is_none() {
                *window = self
                    .window_from_page(gallery, page, plan.post_id, plan.duration)
                    .await;
            }
            return page;
        }

        let anchor = match plan.post_id {
            Some(id) => Some(id),
            None => self.snapshot_anchor(gallery, plan.anchor_at).await,
        };

        match (anchor, *window) {
            (Some(id), _) => self.locate_from_anchor(gallery, id, plan.duration, window).await,
            (None, Some(w)) => {
                locate_by_time(self.source.as_ref(), gallery, w.end, &self.limits).await
            }
            (None, None) => 1,
        }
    }

    async fn snapshot_anchor(&self, gallery: &GalleryRef, at: Option<DateTime<Utc>>) -> Option<u64> {
        let resolver = self.snapshots.as_ref()?;
        resolver.resolve_anchor(gallery, at?).await
    }

    /// Locate by anchor id, then narrow to the page holding the window end.
    ///
    /// Posts newer than the anchor but inside the window sit on pages at or
    /// above the anchor's, so the window end is searched within `1..=anchor page`.
    async fn locate_from_anchor(
        &self,
        gallery: &GalleryRef,
        anchor_id: u64,
        duration: TimeDelta,
        window: &mut Option<TimeWindow>,
    ) -> u64 {
        let source = self.source.as_ref();
        let anchor_page = locate_by_post_id(source, gallery, anchor_id, &self.limits).await;

        if window.is_none() {
            *window = self
                .window_from_page(gallery, anchor_page, Some(anchor_id), duration)
                .await;
        }

        match *window {
            Some(w) if anchor_page > 1 => {
                let bracket = SearchBracket {
                    lower_page: 1,
                    upper_page: anchor_page,
                };
                search_bracket(source, gallery, SearchTarget::Time(w.end), bracket).await
            }
            _ => anchor_page,
        }
    }

    /// Window starting at the target post's exact time (or the page's oldest post).
    async fn window_from_page(
        &self,
        gallery: &GalleryRef,
        page: u64,
        post_id: Option<u64>,
        duration: TimeDelta,
    ) -> Option<TimeWindow> {
        let posts = match self.source.fetch_page(gallery, page).await {
            Ok(posts) => posts,
            Err(e) => {
                warn!(gallery = %gallery, page, "Cannot read target post time: {e:#}");
                return None;
            }
        };

        let exact = post_id.and_then(|id| posts.iter().find(|p| p.id == id));
        if exact.is_none() {
            debug!(gallery = %gallery, page, ?post_id, "Target post not on page; using oldest post");
        }
        let start = exact
            .or_else(|| posts.iter().min_by_key(|p| p.timestamp))?
            .timestamp;

        Some(TimeWindow {
            start,
            end: start.checked_add_signed(duration)?,
        })
    }

    fn to_local(&self, at: DateTime<Utc>) -> NaiveDateTime {
        at.with_timezone(&self.source_offset).naive_local()
    }
}

/// Parse a caller supplied target time.
///
/// RFC 3339 values carry their own offset; naive values are read in the
/// upstream's local time.
///
/// # Errors
///
/// Returns [`HarvestError::InvalidTime`] if no format matches.
pub fn parse_target_time(raw: &str, source_offset: FixedOffset) -> Result<DateTime<Utc>, HarvestError> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }

    parse_exact_time(raw)
        .or_else(|| {
            MINUTE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        })
        .and_then(|naive| naive.and_local_timezone(source_offset).single())
        .map(|at| at.with_timezone(&Utc))
        .ok_or_else(|| HarvestError::InvalidTime(raw.to_string()))
}
