//! The sync engine: refresh orchestration, enrichment and the tiered read path.
//!
//! An [`Engine`] owns every piece of per-process state (memory cache,
//! single-flight slots, the local refresh guard and background tasks), so
//! several engines can share one object store in the same process, as
//! separate instances of a fleet would.
//!
//! ### Lifecycle
//!
//! - `Engine::new` wires the components; nothing runs yet
//! - `start` spawns the stale-lock sweeper and the image worker
//! - `stop` cancels both; in-flight operations finish on their own
//! - `start` after `stop` brings both back on the same image queue

pub mod enrich;
pub mod flight;
pub mod memory;
pub mod queue;
mod read;
mod refresh;
pub mod stats;

#[cfg(test)]
pub(crate) mod fakes;

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tidemark_core::model::Bookmark;
use tidemark_core::store::{KeyLayout, ObjectStore};
use tidemark_core::{AppConfig, Error, LockManager, Persistence, SweepHandle};
use tokio::task::JoinHandle;

pub use enrich::{EnrichmentResult, ImageOutcome, ImageSource, PersistenceMode};
pub use read::{CollectionOptions, InvalidateReport, InvalidateScope, TagSummary};
pub use stats::{EngineStats, StatsSnapshot};

use self::enrich::{Enricher, ImagePersister};
use self::flight::SingleFlight;
use self::memory::MemoryCache;
use self::queue::{ImageQueue, ImageWorker};
use crate::fetch::ImageFetcher;
use crate::upstream::BookmarkSource;

/// Shared by every waiter of one refresh.
type RefreshResult = Result<Option<Arc<Vec<Bookmark>>>, Arc<Error>>;

/// Engine settings, usually derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub key_prefix: String,
    pub page_size: usize,
    pub lock_ttl: Duration,
    pub lock_sweep_interval: Duration,
    pub memory_ttl: Duration,
    pub tag_cache_enabled: bool,
    pub tag_cache_top_n: usize,
    pub force_refresh_enabled: bool,
    pub enrich_images: bool,
    pub screenshot_fallback: bool,
    pub enrichment_delay: Duration,
    /// Prefix of hosted image URLs; empty yields store-relative URLs.
    pub image_base_url: String,
    pub image_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_app(&AppConfig::default())
    }
}

impl EngineConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            key_prefix: config.key_prefix.clone(),
            page_size: config.page_size,
            lock_ttl: config.lock_ttl(),
            lock_sweep_interval: config.lock_sweep_interval(),
            memory_ttl: config.memory_cache_ttl(),
            tag_cache_enabled: config.tag_cache_enabled,
            tag_cache_top_n: config.tag_cache_top_n,
            force_refresh_enabled: config.force_refresh_enabled,
            enrich_images: config.enrich_images,
            screenshot_fallback: config.screenshot_fallback,
            enrichment_delay: config.enrichment_delay(),
            image_base_url: config.image_base_url().unwrap_or_default().to_string(),
            image_queue_capacity: config.image_queue_capacity,
        }
    }
}

struct Lifecycle {
    image_worker: ImageWorker,
    worker: Option<JoinHandle<()>>,
    sweeper: Option<SweepHandle>,
}

/// Bookmark sync engine for one process.
pub struct Engine {
    config: EngineConfig,
    persistence: Persistence,
    lock: LockManager,
    source: Arc<dyn BookmarkSource>,
    memory: MemoryCache,
    persister: Arc<ImagePersister>,
    enricher: Enricher,
    stats: Arc<EngineStats>,
    refreshing: AtomicBool,
    refresh_flight: SingleFlight<RefreshResult>,
    forced_flight: SingleFlight<RefreshResult>,
    read_flight: SingleFlight<Option<Arc<Vec<Bookmark>>>>,
    lifecycle: Mutex<Lifecycle>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("prefix", &self.config.key_prefix)
            .field("owner", &self.lock.owner_id())
            .finish()
    }
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn ObjectStore>,
        source: Arc<dyn BookmarkSource>,
        fetcher: Arc<dyn ImageFetcher>,
    ) -> Self {
        let stats = Arc::new(EngineStats::default());
        let persistence = Persistence::new(store.clone(), KeyLayout::new(&config.key_prefix), config.page_size);
        let lock = LockManager::new(store.clone());
        let persister = Arc::new(ImagePersister::new(
            store,
            source.clone(),
            fetcher,
            config.image_base_url.clone(),
            stats.clone(),
        ));
        let (queue, image_worker) = ImageQueue::bounded(config.image_queue_capacity, stats.clone());
        let enricher = Enricher::new(persister.clone(), queue, config.screenshot_fallback, config.enrichment_delay);

        let memory = MemoryCache::new(config.memory_ttl);

        tracing::debug!(owner = %lock.owner_id(), prefix = %config.key_prefix, "engine created");

        Self {
            config,
            persistence,
            lock,
            source,
            memory,
            persister,
            enricher,
            stats,
            refreshing: AtomicBool::new(false),
            refresh_flight: SingleFlight::new(),
            forced_flight: SingleFlight::new(),
            read_flight: SingleFlight::new(),
            lifecycle: Mutex::new(Lifecycle { image_worker, worker: None, sweeper: None }),
        }
    }

    /// Spawn background tasks. Calling it again while running is a no-op.
    pub fn start(&self) {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);

        if lifecycle.sweeper.is_none() {
            let key = self.persistence.keys().lock();
            lifecycle.sweeper = Some(self.lock.spawn_sweeper(key, self.config.lock_sweep_interval));
        }
        if lifecycle.worker.as_ref().is_none_or(JoinHandle::is_finished) {
            lifecycle.worker = Some(lifecycle.image_worker.spawn(self.persister.clone()));
        }

        tracing::info!(owner = %self.lock.owner_id(), "engine started");
    }

    /// Cancel background tasks. The job the image worker was running is lost
    /// and a later refresh re-selects it; jobs still queued wait for the next
    /// `start`.
    pub fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sweeper) = lifecycle.sweeper.take() {
            sweeper.stop();
        }
        if let Some(worker) = lifecycle.worker.take() {
            worker.abort();
        }
        tracing::info!(owner = %self.lock.owner_id(), "engine stopped");
    }

    pub fn is_running(&self) -> bool {
        let lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        lifecycle.sweeper.as_ref().is_some_and(SweepHandle::is_running)
            && lifecycle.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn persistence(&self) -> &Persistence {
        &self.persistence
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let lifecycle = self.lifecycle.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(worker) = lifecycle.worker.take() {
            worker.abort();
        }
        if let Some(sweeper) = lifecycle.sweeper.take() {
            sweeper.stop();
        }
    }
}
