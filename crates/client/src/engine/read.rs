//! Tiered read path.
//!
//! Every read tries, in order: the in-process memory cache, the persisted
//! records in the object store, then (if the caller allows it) a refresh
//! from upstream. Store failures on read degrade to the next tier; they are
//! never returned to the caller.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tidemark_core::Error;
use tidemark_core::checksum::fingerprint;
use tidemark_core::model::{Bookmark, CollectionIndex, Page, page_of, slugify};
use tidemark_core::persistence::rank_tags;

use super::Engine;
use super::enrich::PersistenceMode;
use super::memory::PageKey;
use super::stats::bump;

/// Options for [`Engine::get_collection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionOptions {
    /// Never reach upstream, even if nothing is persisted.
    #[serde(default)]
    pub skip_upstream: bool,
    /// Keep `previewImageUrl` on returned bookmarks.
    #[serde(default = "default_true")]
    pub include_images: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CollectionOptions {
    fn default() -> Self {
        Self { skip_upstream: false, include_images: true }
    }
}

/// What [`Engine::invalidate`] clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidateScope {
    /// This process's memory cache only.
    Memory,
    /// Memory tag entries and every persisted tag set.
    Tags,
    /// Memory plus every persisted record except the lock.
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidateReport {
    pub scope: InvalidateScope,
    pub keys_removed: usize,
}

/// A tag in the current collection and whether it has a persisted set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagSummary {
    pub slug: String,
    pub name: String,
    pub count: usize,
    pub cached: bool,
}

fn strip_images(bookmarks: &[Bookmark]) -> Arc<Vec<Bookmark>> {
    let stripped = bookmarks
        .iter()
        .cloned()
        .map(|mut b| {
            b.preview_image_url = None;
            b
        })
        .collect();
    Arc::new(stripped)
}

fn tag_members(bookmarks: &[Bookmark], slug: &str) -> Vec<Bookmark> {
    bookmarks.iter().filter(|b| b.has_tag(slug)).cloned().collect()
}

fn tag_slug(tag: &str) -> Result<String, Error> {
    let slug = slugify(tag);
    if slug.is_empty() {
        return Err(Error::InvalidInput("tag must not be empty".into()));
    }
    Ok(slug)
}

fn check_page(page: usize) -> Result<(), Error> {
    if page == 0 {
        return Err(Error::InvalidInput("page numbers start at 1".into()));
    }
    Ok(())
}

impl Engine {
    /// The full collection from the fastest tier that has it.
    ///
    /// Returns an empty collection when nothing is available and upstream
    /// is skipped or lock-contended.
    ///
    /// # Errors
    ///
    /// Only when an upstream refresh was attempted, failed, and nothing had
    /// ever been persisted.
    pub async fn get_collection(&self, options: CollectionOptions) -> Result<Arc<Vec<Bookmark>>, Error> {
        let collection = self.load_collection(options.skip_upstream).await?;
        if options.include_images {
            Ok(collection)
        } else {
            Ok(strip_images(&collection))
        }
    }

    async fn load_collection(&self, skip_upstream: bool) -> Result<Arc<Vec<Bookmark>>, Error> {
        if let Some(collection) = self.memory.collection().await {
            bump(&self.stats.memory_hits);
            return Ok(collection);
        }

        if let Some(collection) = self.read_persisted_collection().await {
            return Ok(collection);
        }

        if skip_upstream {
            tracing::debug!("nothing persisted and upstream skipped");
            return Ok(Arc::new(Vec::new()));
        }

        match self.refresh_with(false, PersistenceMode::Background).await? {
            Some(collection) => Ok(collection),
            // Another instance holds the lock; it may have persisted meanwhile.
            None => Ok(self.read_persisted_collection().await.unwrap_or_default()),
        }
    }

    /// Manifest read shared by concurrent callers.
    async fn read_persisted_collection(&self) -> Option<Arc<Vec<Bookmark>>> {
        let (collection, _) = self
            .read_flight
            .run(|| async {
                let manifest = Arc::new(self.persistence.read_manifest().await?);
                bump(&self.stats.store_reads);
                self.memory.set_collection(manifest.clone(), None).await;
                Some(manifest)
            })
            .await;
        collection
    }

    async fn global_index(&self) -> Option<CollectionIndex> {
        if let Some(index) = self.memory.index(None).await {
            return Some(index);
        }
        let index = self.persistence.read_index().await?;
        bump(&self.stats.store_reads);
        self.memory.set_index(None, index.clone()).await;
        Some(index)
    }

    async fn tag_index(&self, slug: &str) -> Option<CollectionIndex> {
        if let Some(index) = self.memory.index(Some(slug)).await {
            return Some(index);
        }
        let index = self.persistence.read_tag_index(slug).await?;
        bump(&self.stats.store_reads);
        self.memory.set_index(Some(slug), index.clone()).await;
        Some(index)
    }

    /// One page of the collection. Pages past the end are empty.
    ///
    /// # Errors
    ///
    /// `Error::InvalidInput` for page 0; otherwise as [`Engine::get_collection`].
    pub async fn get_page(&self, page: usize) -> Result<Page, Error> {
        check_page(page)?;
        let page_size = self.config.page_size;
        let key = PageKey::global(page);

        if let Some(collection) = self.memory.collection().await {
            bump(&self.stats.memory_hits);
            return Ok(page_of(&collection, page, page_size));
        }
        if let Some(cached) = self.memory.page(&key).await {
            bump(&self.stats.memory_hits);
            return Ok(cached);
        }

        if let Some(index) = self.global_index().await {
            if page > index.total_pages {
                return Ok(Page::empty(page, index.total_pages));
            }
            if let Some(stored) = self.persistence.read_page(page).await {
                bump(&self.stats.store_reads);
                self.memory.set_page(key, stored.clone()).await;
                return Ok(stored);
            }
            tracing::debug!(page, "indexed page missing, falling back to manifest");
        }

        let collection = self.load_collection(false).await?;
        Ok(page_of(&collection, page, page_size))
    }

    /// One page of the bookmarks carrying `tag` (a slug or display name).
    ///
    /// Tags outside the persisted top-N are served by filtering the full
    /// collection.
    ///
    /// # Errors
    ///
    /// `Error::InvalidInput` for page 0 or an empty tag; otherwise as
    /// [`Engine::get_collection`].
    pub async fn get_tag_page(&self, tag: &str, page: usize) -> Result<Page, Error> {
        check_page(page)?;
        let slug = tag_slug(tag)?;
        let page_size = self.config.page_size;
        let key = PageKey::tag(&slug, page);

        if let Some(cached) = self.memory.page(&key).await {
            bump(&self.stats.memory_hits);
            return Ok(cached);
        }

        if let Some(index) = self.tag_index(&slug).await {
            if page > index.total_pages {
                return Ok(Page::empty(page, index.total_pages));
            }
            if let Some(stored) = self.persistence.read_tag_page(&slug, page).await {
                bump(&self.stats.store_reads);
                self.memory.set_page(key, stored.clone()).await;
                return Ok(stored);
            }
        }

        tracing::debug!(tag = %slug, page, "no persisted tag set, filtering collection");
        let collection = self.load_collection(false).await?;
        let filtered = page_of(&tag_members(&collection, &slug), page, page_size);
        // Unknown tags are caller-controlled; only pages with members are cached.
        if !filtered.is_empty() {
            self.memory.set_page(key, filtered.clone()).await;
        }
        Ok(filtered)
    }

    /// The global collection index, computed from the collection if none is
    /// persisted.
    pub async fn get_index(&self) -> Result<CollectionIndex, Error> {
        if let Some(index) = self.global_index().await {
            return Ok(index);
        }
        let collection = self.load_collection(false).await?;
        Ok(self.computed_index(&collection))
    }

    /// Index of one tag's collection, persisted or computed.
    pub async fn get_tag_index(&self, tag: &str) -> Result<CollectionIndex, Error> {
        let slug = tag_slug(tag)?;
        if let Some(index) = self.tag_index(&slug).await {
            return Ok(index);
        }
        let collection = self.load_collection(false).await?;
        let index = self.computed_index(&tag_members(&collection, &slug));
        self.memory.set_index(Some(&slug), index.clone()).await;
        Ok(index)
    }

    fn computed_index(&self, bookmarks: &[Bookmark]) -> CollectionIndex {
        let fp = fingerprint(bookmarks);
        CollectionIndex::new(fp.count, self.config.page_size, fp.checksum, Utc::now())
    }

    /// Tags of the current collection, most used first.
    ///
    /// Reads only persisted data; never triggers a refresh.
    pub async fn tags(&self) -> Result<Vec<TagSummary>, Error> {
        let collection = self.load_collection(true).await?;
        let cached = self.persistence.list_cached_tags().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "could not list cached tags");
            Vec::new()
        });

        Ok(rank_tags(&collection)
            .into_iter()
            .map(|t| {
                let cached = cached.contains(&t.slug);
                TagSummary { slug: t.slug, name: t.name, count: t.count, cached }
            })
            .collect())
    }

    /// Drop cached state.
    ///
    /// # Errors
    ///
    /// Store failures while deleting persisted records.
    pub async fn invalidate(&self, scope: InvalidateScope) -> Result<InvalidateReport, Error> {
        let keys_removed = match scope {
            InvalidateScope::Memory => {
                self.memory.clear().await;
                0
            }
            InvalidateScope::Tags => {
                self.memory.clear_tags().await;
                self.persistence.delete_tags().await?
            }
            InvalidateScope::All => {
                self.memory.clear().await;
                self.persistence.delete_all().await?
            }
        };

        tracing::info!(?scope, keys_removed, "cache invalidated");
        Ok(InvalidateReport { scope, keys_removed })
    }
}
