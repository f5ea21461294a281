//! Batch harvester: walk deeper from a located page until the window start is covered.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use futures_util::future::join_all;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::EngineLimits;
use crate::fetch::PageSource;
use crate::gallery::GalleryRef;
use crate::listing::PostRecord;

/// Inclusive time window in the upstream's local wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    #[must_use]
    pub fn contains(&self, at: NaiveDateTime) -> bool {
        self.start <= at && at <= self.end
    }
}

/// Raw result of one harvest pass.
#[derive(Debug, Clone, Default)]
pub struct HarvestOutcome {
    /// Every record fetched, unfiltered and possibly duplicated.
    pub posts: Vec<PostRecord>,
    /// A page reached back to (or past) the window start.
    pub reached_start: bool,
    /// A whole batch came back empty: the gallery ends above this depth.
    pub exhausted: bool,
    pub pages_fetched: u64,
}

impl HarvestOutcome {
    /// Deduplicated, window-filtered, time-ordered posts.
    #[must_use]
    pub fn into_window(self, window: &TimeWindow) -> Vec<PostRecord> {
        finalize_posts(self.posts, window)
    }
}

/// Fetch pages `start_page, start_page + 1, ...` in concurrent batches.
///
/// Every page of a batch is awaited before the stop conditions are checked,
/// and batches never overlap. Failed pages count as empty.
pub async fn harvest(
    source: &dyn PageSource,
    gallery: &GalleryRef,
    start_page: u64,
    window: &TimeWindow,
    limits: &EngineLimits,
) -> HarvestOutcome {
    let batch_size = limits.batch_size.max(1) as u64;
    let last_page = start_page.saturating_add(limits.max_pages.saturating_sub(1));

    let mut outcome = HarvestOutcome::default();
    let mut batch_start = start_page;

    while batch_start <= last_page {
        let batch_end = batch_start
            .saturating_add(batch_size - 1)
            .min(last_page);

        if batch_start != start_page {
            sleep(limits.batch_delay).await;
        }

        debug!(gallery = %gallery, from = batch_start, to = batch_end, "Fetching batch");

        let pages: Vec<u64> = (batch_start..=batch_end).collect();
        let results = join_all(pages.iter().map(|&page| source.fetch_page(gallery, page))).await;
        outcome.pages_fetched += pages.len() as u64;

        let mut batch_records = 0;
        for (page, result) in pages.into_iter().zip(results) {
            let records = match result {
                Ok(records) => records,
                Err(e) => {
                    warn!(gallery = %gallery, page, "Listing page unavailable: {e:#}");
                    continue;
                }
            };

            if records
                .iter()
                .map(|p| p.timestamp)
                .min()
                .is_some_and(|oldest| oldest <= window.start)
            {
                debug!(gallery = %gallery, page, "Reached window start");
                outcome.reached_start = true;
            }

            batch_records += records.len();
            outcome.posts.extend(records);
        }

        if outcome.reached_start {
            break;
        }
        if batch_records == 0 {
            debug!(gallery = %gallery, page = batch_start, "Empty batch; gallery exhausted");
            outcome.exhausted = true;
            break;
        }

        batch_start = batch_end + 1;
    }

    info!(
        gallery = %gallery,
        start_page,
        pages = outcome.pages_fetched,
        posts = outcome.posts.len(),
        reached_start = outcome.reached_start,
        exhausted = outcome.exhausted,
        "Harvest finished"
    );
    outcome
}

/// Deduplicate by id (last seen wins), keep the window, sort ascending by time.
#[must_use]
pub fn finalize_posts(posts: Vec<PostRecord>, window: &TimeWindow) -> Vec<PostRecord> {
    let mut by_id: HashMap<u64, PostRecord> = HashMap::with_capacity(posts.len());
    for post in posts {
        by_id.insert(post.id, post);
    }

    let mut relevant: Vec<PostRecord> = by_id
        .into_values()
        .filter(|p| window.contains(p.timestamp))
        .collect();
    relevant.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
    relevant
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::fetch::memory::{base_time, paginate, post, MemoryPageSource};
    use crate::locator::locate_by_time;

    const GALLERY: &str = "stock";

    fn gallery() -> GalleryRef {
        GalleryRef::new(GALLERY, false)
    }

    fn limits(batch_size: usize, max_pages: u64) -> EngineLimits {
        EngineLimits {
            batch_size,
            max_pages,
            batch_delay: std::time::Duration::ZERO,
            ..EngineLimits::default()
        }
    }

    #[tokio::test]
    async fn test_three_page_scenario() {
        // Posts #1..#30, one minute apart; #1 is the oldest, on page 3
        let pages = paginate(1, 30, 10, base_time(), TimeDelta::minutes(1));
        let source = MemoryPageSource::new().with_gallery(GALLERY, pages.clone());

        let ts = |n: usize| base_time() + TimeDelta::minutes(n as i64 - 1);
        let window = TimeWindow {
            start: ts(25),
            end: ts(29),
        };

        let start_page = locate_by_time(&source, &gallery(), window.end, &limits(5, 100)).await;
        assert_eq!(start_page, 1);

        let outcome = harvest(&source, &gallery(), start_page, &window, &limits(5, 100)).await;
        assert!(outcome.reached_start);
        assert!(!outcome.exhausted);

        let ids: Vec<u64> = outcome.into_window(&window).iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![25, 26, 27, 28, 29]);
    }

    #[tokio::test]
    async fn test_window_spanning_pages() {
        let pages = paginate(1, 30, 10, base_time(), TimeDelta::minutes(1));
        let source = MemoryPageSource::new().with_gallery(GALLERY, pages);

        let window = TimeWindow {
            start: base_time() + TimeDelta::minutes(4),
            end: base_time() + TimeDelta::minutes(14),
        };
        let start_page = locate_by_time(&source, &gallery(), window.end, &limits(1, 100)).await;
        assert_eq!(start_page, 2);

        let outcome = harvest(&source, &gallery(), start_page, &window, &limits(1, 100)).await;
        assert!(outcome.reached_start);
        assert_eq!(outcome.pages_fetched, 2);

        let ids: Vec<u64> = outcome.into_window(&window).iter().map(|p| p.id).collect();
        assert_eq!(ids, (5..=15).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_whole_batch_completes_after_target_found() {
        let pages = paginate(1, 100, 10, base_time(), TimeDelta::minutes(1));
        let source = MemoryPageSource::new().with_gallery(GALLERY, pages);

        // Start is on page 1 but the batch of 4 still fetches pages 1..=4
        let window = TimeWindow {
            start: base_time() + TimeDelta::minutes(95),
            end: base_time() + TimeDelta::minutes(99),
        };
        let outcome = harvest(&source, &gallery(), 1, &window, &limits(4, 100)).await;
        assert!(outcome.reached_start);
        assert_eq!(outcome.pages_fetched, 4);
        assert_eq!(source.requested_pages().len(), 4);
    }

    #[tokio::test]
    async fn test_exhausted_when_batch_empty() {
        let pages = paginate(1, 30, 10, base_time(), TimeDelta::minutes(1));
        let source = MemoryPageSource::new().with_gallery(GALLERY, pages);

        // Older than the whole gallery
        let window = TimeWindow {
            start: base_time() - TimeDelta::days(2),
            end: base_time() - TimeDelta::days(1),
        };
        let outcome = harvest(&source, &gallery(), 1, &window, &limits(2, 100)).await;
        assert!(!outcome.reached_start);
        assert!(outcome.exhausted);
        // Pages 1-2, then 3-4, then 5-6 is empty
        assert_eq!(outcome.pages_fetched, 6);
        assert_eq!(outcome.posts.len(), 30);
        assert!(outcome.into_window(&window).is_empty());
    }

    #[tokio::test]
    async fn test_single_failed_page_does_not_end_harvest() {
        let pages = paginate(1, 60, 10, base_time(), TimeDelta::minutes(1));
        let source = MemoryPageSource::new()
            .with_gallery(GALLERY, pages)
            .with_failing_page(2);

        let window = TimeWindow {
            start: base_time(),
            end: base_time() + TimeDelta::minutes(59),
        };
        let outcome = harvest(&source, &gallery(), 1, &window, &limits(2, 100)).await;
        assert!(outcome.reached_start);
        assert!(!outcome.exhausted);
        // Page 2's posts (41..=50) are lost, everything else survives
        let kept = outcome.into_window(&window);
        assert_eq!(kept.len(), 50);
        assert!(kept.iter().all(|p| !(41..=50).contains(&p.id)));
    }

    #[tokio::test]
    async fn test_page_ceiling_bounds_work() {
        let pages = paginate(1, 500, 10, base_time(), TimeDelta::minutes(1));
        let source = MemoryPageSource::new().with_gallery(GALLERY, pages);

        let window = TimeWindow {
            start: base_time() - TimeDelta::days(1),
            end: base_time() + TimeDelta::days(1),
        };
        let outcome = harvest(&source, &gallery(), 3, &window, &limits(3, 7)).await;
        assert!(!outcome.reached_start);
        assert!(!outcome.exhausted);
        assert_eq!(outcome.pages_fetched, 7);
        assert_eq!(source.requested_pages().iter().max(), Some(&9));
    }

    #[test]
    fn test_dedup_keeps_last_seen() {
        let at = base_time();
        let mut edited = post(7, at);
        edited.title = "edited".to_string();

        let posts = vec![post(7, at), post(8, at + TimeDelta::minutes(1)), edited.clone()];
        let window = TimeWindow {
            start: at,
            end: at + TimeDelta::minutes(1),
        };
        let result = finalize_posts(posts, &window);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0], edited);
    }

    #[test]
    fn test_overlapping_pages_merge_to_unique_ids() {
        let pages = paginate(1, 20, 10, base_time(), TimeDelta::minutes(1));
        let mut posts = pages[0].clone();
        posts.extend(pages[0].clone());
        posts.extend(pages[1].clone());

        let window = TimeWindow {
            start: base_time(),
            end: base_time() + TimeDelta::hours(1),
        };
        let result = finalize_posts(posts, &window);
        let ids: Vec<u64> = result.iter().map(|p| p.id).collect();
        assert_eq!(ids, (1..=20).collect::<Vec<_>>());
    }

    #[test]
    fn test_range_filter_is_inclusive_and_exact() {
        let posts: Vec<PostRecord> = (0..20)
            .map(|i| post(i, base_time() + TimeDelta::seconds(i as i64 * 30)))
            .collect();
        let window = TimeWindow {
            start: base_time() + TimeDelta::seconds(60),
            end: base_time() + TimeDelta::seconds(300),
        };

        let result = finalize_posts(posts.clone(), &window);
        assert!(result.iter().all(|p| window.contains(p.timestamp)));
        let expected = posts.iter().filter(|p| window.contains(p.timestamp)).count();
        assert_eq!(result.len(), expected);
        assert_eq!(result.first().map(|p| p.id), Some(2));
        assert_eq!(result.last().map(|p| p.id), Some(10));
    }
}
