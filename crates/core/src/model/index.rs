//! Pagination records: the collection index and page slices.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::bookmark::Bookmark;

/// Metadata describing a persisted page set.
///
/// Regenerated whenever its page set is rewritten, never patched piecemeal.
/// `count` always equals the summed length of the referenced pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionIndex {
    pub count: usize,
    pub total_pages: usize,
    pub page_size: usize,
    pub checksum: String,
    pub last_fetched_at: DateTime<Utc>,
    pub last_attempted_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl CollectionIndex {
    pub fn new(count: usize, page_size: usize, checksum: String, now: DateTime<Utc>) -> Self {
        Self {
            count,
            total_pages: total_pages(count, page_size),
            page_size,
            checksum,
            last_fetched_at: now,
            last_attempted_at: now,
            last_modified: now,
        }
    }
}

/// One page of a collection. Page numbers start at 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub page: usize,
    pub total_pages: usize,
    pub items: Vec<Bookmark>,
}

impl Page {
    pub fn empty(page: usize, total_pages: usize) -> Self {
        Self { page, total_pages, items: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// `ceil(count / page_size)`; zero pages for an empty collection.
pub fn total_pages(count: usize, page_size: usize) -> usize {
    if page_size == 0 { 0 } else { count.div_ceil(page_size) }
}

/// Split a collection into pages of at most `page_size` items, in order.
pub fn paginate(bookmarks: &[Bookmark], page_size: usize) -> Vec<Page> {
    if page_size == 0 {
        return Vec::new();
    }
    let total = total_pages(bookmarks.len(), page_size);
    bookmarks
        .chunks(page_size)
        .enumerate()
        .map(|(idx, chunk)| Page { page: idx + 1, total_pages: total, items: chunk.to_vec() })
        .collect()
}

/// Slice a single page out of an in-memory collection.
///
/// Out-of-range page numbers yield an empty page.
pub fn page_of(bookmarks: &[Bookmark], page: usize, page_size: usize) -> Page {
    let total = total_pages(bookmarks.len(), page_size);
    if page == 0 || page > total {
        return Page::empty(page, total);
    }
    let start = (page - 1) * page_size;
    let end = (start + page_size).min(bookmarks.len());
    Page { page, total_pages: total, items: bookmarks[start..end].to_vec() }
}
