//! Bracket locator: find the listing page holding a post id or a moment.
//!
//! Pages are newest first, so ids and times decrease as the page number grows.
//! The search probes exponentially deeper pages (10, 100, ...) until it
//! overshoots the target, then binary searches the bracket it found.
//!
//! Pages drift deeper while the search runs as new posts arrive. Nothing here
//! corrects for that; the harvester's range filter recovers correctness as
//! long as the returned page is at or before the target.

use chrono::NaiveDateTime;
use tracing::{debug, info};

use crate::config::EngineLimits;
use crate::fetch::PageSource;
use crate::gallery::GalleryRef;
use crate::listing::PageInfo;

/// Number of exponential probing rounds before giving up on growth.
const MAX_PROBE_ROUNDS: u32 = 20;

/// What the locator is looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchTarget {
    PostId(u64),
    Time(NaiveDateTime),
}

/// Where a target sits relative to one page's range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    /// The page yielded nothing to compare against.
    Unknown,
    /// Target is newer than everything on the page (it lives on a lower page number).
    Newer,
    Within,
    /// Target is older than everything on the page (it lives deeper).
    Older,
}

impl SearchTarget {
    fn place(self, info: &PageInfo) -> Placement {
        match self {
            Self::PostId(id) => placement(id, info.min_id, info.max_id),
            Self::Time(at) => placement(at, info.min_date, info.max_date),
        }
    }
}

impl std::fmt::Display for SearchTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PostId(id) => write!(f, "post #{id}"),
            Self::Time(at) => write!(f, "{at}"),
        }
    }
}

fn placement<T: Ord>(target: T, min: Option<T>, max: Option<T>) -> Placement {
    match (min, max) {
        (Some(min), Some(max)) => {
            if target > max {
                Placement::Newer
            } else if target < min {
                Placement::Older
            } else {
                Placement::Within
            }
        }
        _ => Placement::Unknown,
    }
}

/// Page interval straddling the target.
///
/// `lower_page` is at or newer than the target; `upper_page` is older than
/// the target or past the end of the gallery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchBracket {
    pub lower_page: u64,
    pub upper_page: u64,
}

/// Outcome of the exponential probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Probe {
    Hit(u64),
    Bracket(SearchBracket),
}

/// Locate the page holding a post id.
pub async fn locate_by_post_id(
    source: &dyn PageSource,
    gallery: &GalleryRef,
    post_id: u64,
    limits: &EngineLimits,
) -> u64 {
    locate_page(source, gallery, SearchTarget::PostId(post_id), limits).await
}

/// Locate the page holding a moment, in the upstream's local time.
pub async fn locate_by_time(
    source: &dyn PageSource,
    gallery: &GalleryRef,
    at: NaiveDateTime,
    limits: &EngineLimits,
) -> u64 {
    locate_page(source, gallery, SearchTarget::Time(at), limits).await
}

/// Locate the page whose range holds `target`.
///
/// Never fails: when no page brackets the target exactly, the deepest page
/// seen that is still newer than the target is returned, and page 1 is the
/// last resort.
pub async fn locate_page(
    source: &dyn PageSource,
    gallery: &GalleryRef,
    target: SearchTarget,
    limits: &EngineLimits,
) -> u64 {
    let first = source.page_info(gallery, 1).await;
    match target.place(&first) {
        Placement::Older => {}
        placement => {
            debug!(gallery = %gallery, target = %target, ?placement, "Target is on page 1");
            return 1;
        }
    }

    let page = match probe(source, gallery, target, limits.probe_ceiling).await {
        Probe::Hit(page) => page,
        Probe::Bracket(bracket) => search_bracket(source, gallery, target, bracket).await,
    };

    info!(gallery = %gallery, target = %target, page, "Located page");
    page
}

/// Probe pages 10, 100, 1000, ... until one is past the target.
async fn probe(
    source: &dyn PageSource,
    gallery: &GalleryRef,
    target: SearchTarget,
    ceiling: u64,
) -> Probe {
    let mut lower_page = 1;

    for round in 1..=MAX_PROBE_ROUNDS {
        let page = 10u64.saturating_pow(round).min(ceiling);
        if page <= lower_page {
            break;
        }

        let info = source.page_info(gallery, page).await;
        debug!(gallery = %gallery, page, count = info.count, "Probed page");

        match target.place(&info) {
            Placement::Within => return Probe::Hit(page),
            Placement::Unknown | Placement::Newer => {
                return Probe::Bracket(SearchBracket {
                    lower_page,
                    upper_page: page,
                });
            }
            Placement::Older => lower_page = page,
        }

        if page == ceiling {
            break;
        }
    }

    // Still older than the deepest page we allow ourselves to probe
    debug!(gallery = %gallery, ceiling, "Probe ceiling reached");
    Probe::Bracket(SearchBracket {
        lower_page,
        upper_page: lower_page.saturating_mul(2),
    })
}

/// Binary search a bracket for the page holding `target`.
///
/// Returns the first exact hit. Without one, returns the deepest page known
/// to be newer than the target, falling back to `bracket.lower_page`.
pub async fn search_bracket(
    source: &dyn PageSource,
    gallery: &GalleryRef,
    target: SearchTarget,
    bracket: SearchBracket,
) -> u64 {
    debug_assert!(
        bracket.lower_page >= 1 && bracket.lower_page <= bracket.upper_page,
        "inverted search bracket {bracket:?}"
    );

    let mut low = bracket.lower_page;
    let mut high = bracket.upper_page;
    let mut best = bracket.lower_page;

    while low <= high {
        let mid = low + (high - low) / 2;
        let info = source.page_info(gallery, mid).await;

        match target.place(&info) {
            Placement::Within => return mid,
            Placement::Older => {
                best = mid;
                low = mid + 1;
            }
            Placement::Newer | Placement::Unknown => high = mid - 1,
        }
    }

    debug!(gallery = %gallery, target = %target, page = best, "No exact page; using nearest newer page");
    best
}
