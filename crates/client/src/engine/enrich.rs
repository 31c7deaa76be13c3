//! Preview image enrichment.
//!
//! Each bookmark gets at most one preview image, picked by priority:
//!
//! 1. An image already hosted in the object store (from this payload or the
//!    previous manifest, if the bookmark has not changed since)
//! 2. The source's dedicated preview asset
//! 3. The source's screenshot asset, when enabled
//! 4. An external preview URL
//!
//! Images not yet hosted are copied into the store under a deterministic
//! key, so a second run finds the copy and skips the upload.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tidemark_core::Error;
use tidemark_core::model::Bookmark;
use tidemark_core::store::hash::image_idempotency_key;
use tidemark_core::store::{ObjectStore, PutOptions, PutOutcome};

use super::queue::ImageQueue;
use super::stats::{EngineStats, bump};
use crate::fetch::ImageFetcher;
use crate::upstream::BookmarkSource;

/// How images selected for copying are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceMode {
    /// Upload before the enriched bookmark is returned.
    Blocking,
    /// Hand uploads to the background queue and keep the external URL.
    Background,
}

/// Where a bookmark's preview image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    Hosted,
    Asset,
    Screenshot,
    External,
    None,
}

impl ImageSource {
    /// Source tag used in image keys.
    pub fn tag(self) -> &'static str {
        match self {
            ImageSource::Hosted => "hosted",
            ImageSource::Asset => "asset",
            ImageSource::Screenshot => "screenshot",
            ImageSource::External => "og",
            ImageSource::None => "none",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageOutcome {
    /// An already hosted URL was kept.
    Reused,
    /// The image was uploaded by this call.
    Persisted,
    /// The key was already populated.
    CacheHit,
    /// Handed to the background worker.
    Queued,
    /// Nothing to do, or the background queue refused the job.
    Skipped,
    Failed,
}

/// Per-bookmark record of what enrichment did.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichmentResult {
    pub bookmark_id: String,
    pub source: ImageSource,
    pub outcome: ImageOutcome,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOrigin {
    Asset(String),
    External(String),
}

/// A copy-into-store request keyed by its idempotency key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageJob {
    pub key: String,
    pub origin: ImageOrigin,
}

/// Fetches images and writes them into the object store.
pub struct ImagePersister {
    store: Arc<dyn ObjectStore>,
    source: Arc<dyn BookmarkSource>,
    fetcher: Arc<dyn ImageFetcher>,
    base_url: String,
    stats: Arc<EngineStats>,
}

impl ImagePersister {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        source: Arc<dyn BookmarkSource>,
        fetcher: Arc<dyn ImageFetcher>,
        base_url: impl Into<String>,
        stats: Arc<EngineStats>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { store, source, fetcher, base_url, stats }
    }

    /// Public URL of a stored image.
    pub fn hosted_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    pub fn is_hosted(&self, url: &str) -> bool {
        url.starts_with(&format!("{}/images/", self.base_url))
    }

    pub async fn exists(&self, key: &str) -> Result<bool, Error> {
        Ok(self.store.head(key).await?.is_some())
    }

    /// Copy the job's image into the store unless the key already exists.
    ///
    /// Failures are returned, not counted; callers decide how to record them.
    pub async fn persist(&self, job: &ImageJob) -> Result<ImageOutcome, Error> {
        if self.exists(&job.key).await? {
            bump(&self.stats.image_cache_hits);
            return Ok(ImageOutcome::CacheHit);
        }

        let image = match &job.origin {
            ImageOrigin::Asset(id) => self.source.fetch_asset(id).await?,
            ImageOrigin::External(url) => self.fetcher.fetch_image(url).await?,
        };

        let options = PutOptions::create_only().with_content_type(image.content_type.clone());
        match self.store.put(&job.key, image.bytes.to_vec(), options).await? {
            PutOutcome::Written => {
                bump(&self.stats.images_persisted);
                Ok(ImageOutcome::Persisted)
            }
            PutOutcome::AlreadyExists => {
                bump(&self.stats.image_cache_hits);
                Ok(ImageOutcome::CacheHit)
            }
        }
    }

    pub(crate) fn stats(&self) -> &EngineStats {
        &self.stats
    }
}

enum Selection {
    Hosted(String),
    Copy { source: ImageSource, job: ImageJob, external: Option<String> },
    None,
}

/// Runs the enrichment pass over a collection.
pub struct Enricher {
    persister: Arc<ImagePersister>,
    queue: ImageQueue,
    screenshot_fallback: bool,
    delay: Duration,
}

impl Enricher {
    pub fn new(persister: Arc<ImagePersister>, queue: ImageQueue, screenshot_fallback: bool, delay: Duration) -> Self {
        Self { persister, queue, screenshot_fallback, delay }
    }

    fn select(&self, bookmark: &Bookmark, previous: Option<&Bookmark>) -> Selection {
        if let Some(url) = bookmark.preview_image_url.as_deref().filter(|u| self.persister.is_hosted(u)) {
            return Selection::Hosted(url.to_string());
        }
        if let Some(prev) = previous.filter(|p| p.source_updated_at >= bookmark.source_updated_at)
            && let Some(url) = prev.preview_image_url.as_deref().filter(|u| self.persister.is_hosted(u))
        {
            return Selection::Hosted(url.to_string());
        }

        if let Some(asset_id) = bookmark.image_asset_id() {
            return Selection::Copy {
                source: ImageSource::Asset,
                job: ImageJob {
                    key: image_idempotency_key(asset_id, ImageSource::Asset.tag()),
                    origin: ImageOrigin::Asset(asset_id.to_string()),
                },
                external: None,
            };
        }

        if self.screenshot_fallback
            && let Some(asset_id) = bookmark.screenshot_asset_id()
        {
            return Selection::Copy {
                source: ImageSource::Screenshot,
                job: ImageJob {
                    key: image_idempotency_key(asset_id, ImageSource::Screenshot.tag()),
                    origin: ImageOrigin::Asset(asset_id.to_string()),
                },
                external: None,
            };
        }

        let external = bookmark
            .preview_image_url
            .as_deref()
            .or(bookmark.content_image_url())
            .map(str::trim)
            .filter(|u| !u.is_empty());
        if let Some(url) = external {
            let stable_id = format!("{}\n{}", bookmark.id, url);
            return Selection::Copy {
                source: ImageSource::External,
                job: ImageJob {
                    key: image_idempotency_key(&stable_id, ImageSource::External.tag()),
                    origin: ImageOrigin::External(url.to_string()),
                },
                external: Some(url.to_string()),
            };
        }

        Selection::None
    }

    async fn enrich_one(
        &self,
        bookmark: &mut Bookmark,
        previous: Option<&Bookmark>,
        mode: PersistenceMode,
    ) -> Result<EnrichmentResult, Error> {
        let (source, outcome) = match self.select(bookmark, previous) {
            Selection::Hosted(url) => {
                bookmark.preview_image_url = Some(url);
                (ImageSource::Hosted, ImageOutcome::Reused)
            }
            Selection::None => (ImageSource::None, ImageOutcome::Skipped),
            Selection::Copy { source, job, external } => match mode {
                PersistenceMode::Blocking => {
                    let outcome = self.persister.persist(&job).await?;
                    bookmark.preview_image_url = Some(self.persister.hosted_url(&job.key));
                    (source, outcome)
                }
                PersistenceMode::Background => {
                    if self.persister.exists(&job.key).await? {
                        bump(&self.persister.stats().image_cache_hits);
                        bookmark.preview_image_url = Some(self.persister.hosted_url(&job.key));
                        (source, ImageOutcome::CacheHit)
                    } else {
                        let outcome =
                            if self.queue.enqueue(job) { ImageOutcome::Queued } else { ImageOutcome::Skipped };
                        bookmark.preview_image_url = external;
                        (source, outcome)
                    }
                }
            },
        };

        Ok(EnrichmentResult {
            bookmark_id: bookmark.id.clone(),
            source,
            outcome,
            url: bookmark.preview_image_url.clone(),
        })
    }

    /// Enrich `bookmarks` in order, one at a time.
    ///
    /// `previous` is the last persisted manifest; hosted images recorded
    /// there are reused for bookmarks that have not changed. A failure on one
    /// bookmark keeps it as fetched and moves on.
    pub async fn enrich(
        &self,
        bookmarks: Vec<Bookmark>,
        previous: &[Bookmark],
        mode: PersistenceMode,
    ) -> (Vec<Bookmark>, Vec<EnrichmentResult>) {
        let previous: HashMap<&str, &Bookmark> = previous.iter().map(|b| (b.id.as_str(), b)).collect();
        let total = bookmarks.len();
        let mut enriched = Vec::with_capacity(total);
        let mut results = Vec::with_capacity(total);

        for (position, bookmark) in bookmarks.into_iter().enumerate() {
            let mut candidate = bookmark.clone();
            let prev = previous.get(bookmark.id.as_str()).copied();
            let result = match self.enrich_one(&mut candidate, prev, mode).await {
                Ok(result) => {
                    enriched.push(candidate);
                    result
                }
                Err(e) => {
                    bump(&self.persister.stats().images_failed);
                    tracing::warn!(id = %bookmark.id, error = %e, "image enrichment failed, keeping bookmark as fetched");
                    let result = EnrichmentResult {
                        bookmark_id: bookmark.id.clone(),
                        source: ImageSource::None,
                        outcome: ImageOutcome::Failed,
                        url: bookmark.preview_image_url.clone(),
                    };
                    enriched.push(bookmark);
                    result
                }
            };

            let touched_network = !matches!(result.outcome, ImageOutcome::Reused)
                && !matches!(result.source, ImageSource::None);
            results.push(result);

            if touched_network && !self.delay.is_zero() && position + 1 < total {
                tokio::time::sleep(self.delay).await;
            }
        }

        let count = |o: ImageOutcome| results.iter().filter(|r| r.outcome == o).count();
        tracing::info!(
            total,
            reused = count(ImageOutcome::Reused),
            persisted = count(ImageOutcome::Persisted),
            cache_hits = count(ImageOutcome::CacheHit),
            queued = count(ImageOutcome::Queued),
            failed = count(ImageOutcome::Failed),
            ?mode,
            "enrichment pass complete"
        );

        (enriched, results)
    }
}
