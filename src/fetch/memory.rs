//! Synthetic in-memory galleries for tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeDelta};

use super::PageSource;
use crate::gallery::GalleryRef;
use crate::listing::{parse_exact_time, PostRecord};

/// Gallery pages keyed by gallery id. Page 1 is index 0; each page is oldest first.
#[derive(Default)]
pub struct MemoryPageSource {
    galleries: HashMap<String, Vec<Vec<PostRecord>>>,
    failing_pages: HashSet<u64>,
    fetches: AtomicUsize,
    requested: Mutex<Vec<u64>>,
}

impl MemoryPageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gallery(mut self, gallery_id: &str, pages: Vec<Vec<PostRecord>>) -> Self {
        self.galleries.insert(gallery_id.to_string(), pages);
        self
    }

    /// Make a page number fail like a non-2xx response, in every gallery.
    pub fn with_failing_page(mut self, page: u64) -> Self {
        self.failing_pages.insert(page);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn requested_pages(&self) -> Vec<u64> {
        self.requested.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PageSource for MemoryPageSource {
    async fn fetch_page(&self, gallery: &GalleryRef, page: u64) -> Result<Vec<PostRecord>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requested) = self.requested.lock() {
            requested.push(page);
        }
        if self.failing_pages.contains(&page) {
            bail!("synthetic failure on page {page}");
        }
        let pages = self
            .galleries
            .get(&gallery.gallery_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok(page
            .checked_sub(1)
            .and_then(|i| pages.get(i as usize))
            .cloned()
            .unwrap_or_default())
    }
}

pub fn base_time() -> NaiveDateTime {
    parse_exact_time("2024-03-01 12:00:00").expect("valid time")
}

pub fn post(id: u64, timestamp: NaiveDateTime) -> PostRecord {
    PostRecord {
        id,
        title: format!("post {id}"),
        author: "ㅇㅇ".to_string(),
        ip: Some("1.2".to_string()),
        uid: None,
        timestamp,
        display_time: timestamp.format("%H:%M").to_string(),
    }
}

/// Posts `first_id..first_id + total` one `step` apart from `start`, paginated newest first.
pub fn paginate(
    first_id: u64,
    total: u64,
    per_page: usize,
    start: NaiveDateTime,
    step: TimeDelta,
) -> Vec<Vec<PostRecord>> {
    let mut all: Vec<PostRecord> = (0..total)
        .map(|i| post(first_id + i, start + step * i as i32))
        .collect();
    all.reverse();
    all.chunks(per_page)
        .map(|chunk| {
            let mut page = chunk.to_vec();
            page.reverse();
            page
        })
        .collect()
}
