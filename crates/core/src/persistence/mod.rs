//! Paginated persistence of bookmark collections.
//!
//! A write lays down the full manifest, then the index, then every page, and
//! finally removes pages beyond the new page count. A failed write aborts the
//! remaining steps and surfaces `Error::PersistFailed`.
//!
//! The index goes out first with an empty checksum and is stamped with the
//! real one only after every page landed. An interrupted write therefore
//! never matches a later fingerprint, and the next refresh rewrites it.
//!
//! Reads treat a missing key as "no data". Any other store failure on read
//! is logged and also reported as "no data" so callers can try another tier.

mod tags;

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use tags::{TagCount, rank_tags};

use crate::Error;
use crate::checksum::fingerprint;
use crate::model::{Bookmark, CollectionIndex, Page, paginate};
use crate::store::keys::page_number_of;
use crate::store::{KeyLayout, ObjectStore, PutOptions};

/// Reads and writes collection records under one key prefix.
#[derive(Clone)]
pub struct Persistence {
    store: Arc<dyn ObjectStore>,
    keys: KeyLayout,
    page_size: usize,
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence")
            .field("prefix", &self.keys.prefix())
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl Persistence {
    pub fn new(store: Arc<dyn ObjectStore>, keys: KeyLayout, page_size: usize) -> Self {
        Self { store, keys, page_size }
    }

    pub fn keys(&self) -> &KeyLayout {
        &self.keys
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Persist the full collection: manifest, index, pages, then orphan cleanup.
    ///
    /// # Errors
    ///
    /// `Error::PersistFailed` naming the first key that could not be written.
    pub async fn write_collection(&self, bookmarks: &[Bookmark]) -> Result<CollectionIndex, Error> {
        let fp = fingerprint(bookmarks);
        let index = CollectionIndex::new(fp.count, self.page_size, fp.checksum, Utc::now());

        self.write_json(&self.keys.manifest(), bookmarks).await?;
        self.write_page_set(&self.keys.index(), &self.keys.pages_prefix(), &index, bookmarks, |n| {
            self.keys.page(n)
        })
        .await?;

        tracing::info!(count = index.count, pages = index.total_pages, "collection persisted");
        Ok(index)
    }

    /// Write an index and its pages, index first, then prune stale pages.
    pub(crate) async fn write_page_set(
        &self, index_key: &str, pages_prefix: &str, index: &CollectionIndex, bookmarks: &[Bookmark],
        page_key: impl Fn(usize) -> String,
    ) -> Result<(), Error> {
        let pending = CollectionIndex { checksum: String::new(), ..index.clone() };
        self.write_json(index_key, &pending).await?;
        for page in paginate(bookmarks, self.page_size) {
            self.write_json(&page_key(page.page), &page).await?;
        }
        self.write_json(index_key, index).await?;
        self.prune_pages(pages_prefix, index.total_pages).await;
        Ok(())
    }

    /// Remove page objects numbered above `total_pages`.
    ///
    /// Best effort: a leftover page is never referenced by the index.
    async fn prune_pages(&self, pages_prefix: &str, total_pages: usize) {
        let keys = match self.store.list(pages_prefix).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(prefix = %pages_prefix, error = %e, "could not list pages for cleanup");
                return;
            }
        };

        for key in keys {
            if page_number_of(&key).is_some_and(|n| n > total_pages) {
                match self.store.delete(&key).await {
                    Ok(_) => tracing::debug!(key = %key, "removed orphan page"),
                    Err(e) => tracing::warn!(key = %key, error = %e, "could not remove orphan page"),
                }
            }
        }
    }

    pub async fn read_manifest(&self) -> Option<Vec<Bookmark>> {
        self.read_json(&self.keys.manifest()).await
    }

    pub async fn read_index(&self) -> Option<CollectionIndex> {
        self.read_json(&self.keys.index()).await
    }

    pub async fn read_page(&self, page: usize) -> Option<Page> {
        self.read_json(&self.keys.page(page)).await
    }

    /// Refresh the index timestamps without touching any page.
    ///
    /// Used when a refresh finds the upstream collection unchanged.
    pub async fn touch_index(&self) -> Result<Option<CollectionIndex>, Error> {
        let Some(mut index) = self.read_index().await else {
            return Ok(None);
        };
        let now = Utc::now();
        index.last_fetched_at = now;
        index.last_attempted_at = now;
        self.write_json(&self.keys.index(), &index).await?;
        Ok(Some(index))
    }

    /// Clear the stored checksum so the next refresh rewrites everything.
    ///
    /// Used when a dependent write (tag sets) failed after the main page set
    /// landed. Best effort; returns the index as now stored.
    pub async fn mark_incomplete(&self) -> Option<CollectionIndex> {
        let mut index = self.read_index().await?;
        index.checksum.clear();
        match self.write_json(&self.keys.index(), &index).await {
            Ok(()) => Some(index),
            Err(e) => {
                tracing::warn!(error = %e, "could not mark collection incomplete");
                None
            }
        }
    }

    /// Stamp `lastAttemptedAt` after a failed refresh. Best effort.
    pub async fn record_attempt(&self) {
        let Some(mut index) = self.read_index().await else {
            return;
        };
        index.last_attempted_at = Utc::now();
        if let Err(e) = self.write_json(&self.keys.index(), &index).await {
            tracing::warn!(error = %e, "could not record refresh attempt");
        }
    }

    /// Delete every record under the collection prefix except locks.
    ///
    /// Returns the number of keys removed.
    pub async fn delete_all(&self) -> Result<usize, Error> {
        let locks = self.keys.locks_prefix();
        let keys = self.store.list(&self.keys.root_prefix()).await?;
        let mut removed = 0;
        for key in keys.iter().filter(|k| !k.starts_with(&locks)) {
            if self.store.delete(key).await? {
                removed += 1;
            }
        }
        tracing::info!(removed, "persisted collection invalidated");
        Ok(removed)
    }

    pub(crate) async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), Error> {
        let body = serde_json::to_vec(value)
            .map_err(|e| Error::PersistFailed { key: key.to_string(), reason: e.to_string() })?;

        self.store.put(key, body, PutOptions::json()).await.map_err(|e| {
            tracing::error!(key = %key, error = %e, "persist write failed");
            Error::PersistFailed { key: key.to_string(), reason: e.to_string() }
        })?;
        Ok(())
    }

    pub(crate) async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let object = match self.store.get(key).await {
            Ok(Some(object)) => object,
            Ok(None) => {
                tracing::debug!(key = %key, "not persisted");
                return None;
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "store read failed, treating as empty");
                return None;
            }
        };

        match serde_json::from_slice(&object.body) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "stored record is unreadable, treating as empty");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::checksum::has_changed;
    use crate::testing::{CountingStore, collection};
    use crate::store::SqliteStore;

    async fn persistence(page_size: usize) -> (Persistence, Arc<CountingStore<SqliteStore>>) {
        let store = Arc::new(CountingStore::new(SqliteStore::open_in_memory().await.unwrap()));
        let persistence = Persistence::new(store.clone(), KeyLayout::new("bookmarks"), page_size);
        (persistence, store)
    }

    #[tokio::test]
    async fn test_write_and_read_collection() {
        let (persistence, _) = persistence(20).await;
        let items = collection(50);
        let index = persistence.write_collection(&items).await.unwrap();
        assert_eq!(index.count, 50);
        assert_eq!(index.total_pages, 3);

        let stored = persistence.read_index().await.unwrap();
        assert_eq!(stored, index);

        let mut total = 0;
        for n in 1..=stored.total_pages {
            let page = persistence.read_page(n).await.unwrap();
            assert_eq!(page.page, n);
            total += page.items.len();
        }
        assert_eq!(total, stored.count);
        assert_eq!(persistence.read_page(3).await.unwrap().items.len(), 10);
        assert_eq!(persistence.read_manifest().await.unwrap(), items);
    }

    #[tokio::test]
    async fn test_shrinking_collection_prunes_pages() {
        let (persistence, store) = persistence(10).await;
        persistence.write_collection(&collection(35)).await.unwrap();
        assert!(persistence.read_page(4).await.is_some());

        persistence.write_collection(&collection(12)).await.unwrap();
        assert!(persistence.read_page(2).await.is_some());
        assert!(persistence.read_page(3).await.is_none());
        assert!(persistence.read_page(4).await.is_none());
        assert_eq!(store.inner.list("bookmarks/pages/").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_write_failure_is_surfaced() {
        let (persistence, store) = persistence(10).await;
        store.fail_puts.store(true, Ordering::SeqCst);

        let err = persistence.write_collection(&collection(5)).await.unwrap_err();
        assert!(matches!(err, Error::PersistFailed { ref key, .. } if key == "bookmarks/manifest.json"));
        assert!(persistence.read_index().await.is_none());
    }

    #[tokio::test]
    async fn test_interrupted_page_write_leaves_unmatched_index() {
        let (persistence, store) = persistence(20).await;
        persistence.write_collection(&collection(30)).await.unwrap();

        store.fail_puts_matching(Some("pages/page-2.json"));
        let items = collection(50);
        let err = persistence.write_collection(&items).await.unwrap_err();
        assert!(matches!(err, Error::PersistFailed { ref key, .. } if key == "bookmarks/pages/page-2.json"));

        let stored = persistence.read_index().await.unwrap();
        assert_eq!(stored.count, 50);
        assert!(stored.checksum.is_empty());
        assert!(has_changed(&fingerprint(&items), Some(&stored)));

        store.fail_puts_matching(None);
        let index = persistence.write_collection(&items).await.unwrap();
        assert_eq!(persistence.read_index().await.unwrap().checksum, index.checksum);
        let mut total = 0;
        for n in 1..=index.total_pages {
            total += persistence.read_page(n).await.unwrap().items.len();
        }
        assert_eq!(total, index.count);
    }

    #[tokio::test]
    async fn test_mark_incomplete() {
        let (persistence, _) = persistence(10).await;
        let items = collection(5);
        persistence.write_collection(&items).await.unwrap();

        let marked = persistence.mark_incomplete().await.unwrap();
        assert!(marked.checksum.is_empty());
        assert!(has_changed(&fingerprint(&items), persistence.read_index().await.as_ref()));
    }

    #[tokio::test]
    async fn test_read_failure_is_empty() {
        let (persistence, store) = persistence(10).await;
        persistence.write_collection(&collection(5)).await.unwrap();
        store.fail_reads.store(true, Ordering::SeqCst);

        assert!(persistence.read_index().await.is_none());
        assert!(persistence.read_manifest().await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_empty() {
        let (persistence, store) = persistence(10).await;
        store.put("bookmarks/index.json", b"{broken".to_vec(), PutOptions::json()).await.unwrap();
        assert!(persistence.read_index().await.is_none());
    }

    #[tokio::test]
    async fn test_touch_index_writes_no_pages() {
        let (persistence, store) = persistence(10).await;
        let written = persistence.write_collection(&collection(15)).await.unwrap();
        store.reset();

        let touched = persistence.touch_index().await.unwrap().unwrap();
        assert_eq!(touched.checksum, written.checksum);
        assert_eq!(touched.last_modified, written.last_modified);
        assert!(touched.last_fetched_at >= written.last_fetched_at);
        assert_eq!(store.puts_matching("/pages/"), 0);
        assert_eq!(store.total_puts(), 1);
    }

    #[tokio::test]
    async fn test_touch_without_index() {
        let (persistence, _) = persistence(10).await;
        assert!(persistence.touch_index().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_all_keeps_lock() {
        let (persistence, store) = persistence(10).await;
        persistence.write_collection(&collection(15)).await.unwrap();
        store.put("bookmarks/locks/refresh.lock", b"{}".to_vec(), PutOptions::overwrite()).await.unwrap();

        let removed = persistence.delete_all().await.unwrap();
        assert_eq!(removed, 4);
        assert!(persistence.read_manifest().await.is_none());
        assert!(store.get("bookmarks/locks/refresh.lock").await.unwrap().is_some());
    }
}
