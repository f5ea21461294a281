use chrono::NaiveDateTime;

use super::parser::PostRecord;

/// Range summary of one listing page, used as the search oracle.
///
/// All bounds are `None` when the page yielded no valid posts (past the end
/// of the gallery, or the fetch failed). That means "no information", not
/// "the target is smaller" or "larger".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageInfo {
    pub min_id: Option<u64>,
    pub max_id: Option<u64>,
    pub min_date: Option<NaiveDateTime>,
    pub max_date: Option<NaiveDateTime>,
    pub count: usize,
}

impl PageInfo {
    /// Summarize a parsed page.
    #[must_use]
    pub fn from_posts(posts: &[PostRecord]) -> Self {
        Self {
            min_id: posts.iter().map(|p| p.id).min(),
            max_id: posts.iter().map(|p| p.id).max(),
            min_date: posts.iter().map(|p| p.timestamp).min(),
            max_date: posts.iter().map(|p| p.timestamp).max(),
            count: posts.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
