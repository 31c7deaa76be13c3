//! Tier-1 in-process cache.
//!
//! Holds the last known collection plus any pages and indices read from
//! the store, each with its own TTL. Replacing the collection drops the
//! derived entries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tidemark_core::model::{Bookmark, CollectionIndex, Page};
use tokio::sync::RwLock;

/// Page cache key; `tag: None` is the global collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub tag: Option<String>,
    pub page: usize,
}

impl PageKey {
    pub fn global(page: usize) -> Self {
        Self { tag: None, page }
    }

    pub fn tag(slug: &str, page: usize) -> Self {
        Self { tag: Some(slug.to_string()), page }
    }
}

struct Cached<T> {
    value: T,
    stored_at: Instant,
}

impl<T> Cached<T> {
    fn new(value: T) -> Self {
        Self { value, stored_at: Instant::now() }
    }

    fn fresh(&self, ttl: Duration) -> bool {
        self.stored_at.elapsed() <= ttl
    }
}

/// In-memory TTL cache shared by all readers of one engine.
pub struct MemoryCache {
    ttl: Duration,
    collection: RwLock<Option<Cached<Arc<Vec<Bookmark>>>>>,
    pages: RwLock<HashMap<PageKey, Cached<Page>>>,
    indices: RwLock<HashMap<Option<String>, Cached<CollectionIndex>>>,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            collection: RwLock::new(None),
            pages: RwLock::new(HashMap::new()),
            indices: RwLock::new(HashMap::new()),
        }
    }

    pub async fn collection(&self) -> Option<Arc<Vec<Bookmark>>> {
        let guard = self.collection.read().await;
        guard.as_ref().filter(|c| c.fresh(self.ttl)).map(|c| c.value.clone())
    }

    /// Replace the cached collection and drop everything derived from the
    /// previous one.
    pub async fn set_collection(&self, bookmarks: Arc<Vec<Bookmark>>, index: Option<CollectionIndex>) {
        *self.collection.write().await = Some(Cached::new(bookmarks));
        self.pages.write().await.clear();
        let mut indices = self.indices.write().await;
        indices.clear();
        if let Some(index) = index {
            indices.insert(None, Cached::new(index));
        }
    }

    pub async fn page(&self, key: &PageKey) -> Option<Page> {
        let pages = self.pages.read().await;
        pages.get(key).filter(|c| c.fresh(self.ttl)).map(|c| c.value.clone())
    }

    /// Cache a page, evicting expired entries first.
    pub async fn set_page(&self, key: PageKey, page: Page) {
        let mut pages = self.pages.write().await;
        pages.retain(|_, c| c.fresh(self.ttl));
        pages.insert(key, Cached::new(page));
    }

    pub async fn index(&self, tag: Option<&str>) -> Option<CollectionIndex> {
        let indices = self.indices.read().await;
        indices
            .get(&tag.map(str::to_string))
            .filter(|c| c.fresh(self.ttl))
            .map(|c| c.value.clone())
    }

    pub async fn set_index(&self, tag: Option<&str>, index: CollectionIndex) {
        let mut indices = self.indices.write().await;
        indices.retain(|_, c| c.fresh(self.ttl));
        indices.insert(tag.map(str::to_string), Cached::new(index));
    }

    /// Drop only tag pages and tag indices.
    pub async fn clear_tags(&self) {
        self.pages.write().await.retain(|k, _| k.tag.is_none());
        self.indices.write().await.retain(|k, _| k.is_none());
    }

    #[cfg(test)]
    pub(crate) async fn page_entries(&self) -> usize {
        self.pages.read().await.len()
    }

    pub async fn clear(&self) {
        *self.collection.write().await = None;
        self.pages.write().await.clear();
        self.indices.write().await.clear();
    }
}
