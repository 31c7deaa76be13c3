//! Refresh orchestration.
//!
//! A refresh cycle runs lock → fetch → validate → change check → enrich →
//! persist, releasing the distributed lock on every exit. Concurrent callers
//! in this process share one cycle. A cycle that fails after taking the lock
//! answers with the last persisted manifest when one exists.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tidemark_core::Error;
use tidemark_core::checksum::{fingerprint, has_changed};
use tidemark_core::model::{Bookmark, validate_collection};

use super::enrich::PersistenceMode;
use super::stats::bump;
use super::{Engine, RefreshResult};

/// Clears the local refresh guard when the cycle ends, however it ends.
struct GuardReset<'a>(&'a AtomicBool);

impl Drop for GuardReset<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Engine {
    /// Refresh from upstream and persist, uploading images inline.
    ///
    /// Returns `Ok(None)` when another instance holds the refresh lock, or
    /// when a refresh of the other kind (forced vs. normal) is already
    /// running here. `force` bypasses change detection if enabled in config.
    ///
    /// # Errors
    ///
    /// Only when the cycle failed and no persisted manifest exists to fall
    /// back on.
    pub async fn refresh(&self, force: bool) -> Result<Option<Arc<Vec<Bookmark>>>, Error> {
        self.refresh_with(force, PersistenceMode::Blocking).await
    }

    pub(crate) async fn refresh_with(
        &self,
        force: bool,
        mode: PersistenceMode,
    ) -> Result<Option<Arc<Vec<Bookmark>>>, Error> {
        if force && !self.config.force_refresh_enabled {
            tracing::debug!("force refresh disabled, running a normal refresh");
        }
        let force = force && self.config.force_refresh_enabled;
        let flight = if force { &self.forced_flight } else { &self.refresh_flight };

        let (result, leader) = flight.run(|| self.guarded_refresh(force, mode)).await;
        if !leader {
            tracing::debug!(force, "joined in-flight refresh");
        }
        result.map_err(Error::Shared)
    }

    async fn guarded_refresh(&self, force: bool, mode: PersistenceMode) -> RefreshResult {
        if self.refreshing.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            bump(&self.stats.local_guard_denied);
            tracing::debug!("refresh already running in this process");
            return Ok(None);
        }
        let _reset = GuardReset(&self.refreshing);

        self.locked_refresh(force, mode).await.map_err(Arc::new)
    }

    async fn locked_refresh(&self, force: bool, mode: PersistenceMode) -> Result<Option<Arc<Vec<Bookmark>>>, Error> {
        let lock_key = self.persistence.keys().lock();

        match self.lock.try_acquire(&lock_key, self.config.lock_ttl).await {
            Ok(true) => {}
            Ok(false) => {
                bump(&self.stats.lock_denied);
                tracing::info!(key = %lock_key, "refresh lock held by another instance");
                return Ok(None);
            }
            Err(e) => {
                bump(&self.stats.lock_denied);
                tracing::warn!(key = %lock_key, error = %e, "could not acquire refresh lock");
                return Ok(None);
            }
        }

        let start = Instant::now();
        let outcome = self.run_cycle(force, mode).await;

        if let Err(e) = self.lock.release(&lock_key).await {
            tracing::warn!(key = %lock_key, error = %e, "could not release refresh lock");
        }

        match outcome {
            Ok(collection) => {
                tracing::info!(
                    count = collection.len(),
                    force,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "refresh complete"
                );
                Ok(Some(collection))
            }
            Err(e) => {
                bump(&self.stats.refresh_failures);
                self.persistence.record_attempt().await;

                match self.persistence.read_manifest().await {
                    Some(manifest) => {
                        bump(&self.stats.fallbacks_served);
                        tracing::warn!(error = %e, count = manifest.len(), "refresh failed, serving last persisted manifest");
                        Ok(Some(Arc::new(manifest)))
                    }
                    None => {
                        tracing::error!(error = %e, "refresh failed with nothing persisted to fall back on");
                        Err(e)
                    }
                }
            }
        }
    }

    async fn run_cycle(&self, force: bool, mode: PersistenceMode) -> Result<Arc<Vec<Bookmark>>, Error> {
        let fetched = self.source.fetch_all().await?;
        validate_collection(&fetched)?;
        let fp = fingerprint(&fetched);

        if !force {
            let index = self.persistence.read_index().await;
            if !has_changed(&fp, index.as_ref())
                && let Some(manifest) = self.persistence.read_manifest().await
            {
                let index = match self.persistence.touch_index().await {
                    Ok(touched) => touched,
                    Err(e) => {
                        tracing::warn!(error = %e, "could not stamp unchanged index");
                        index
                    }
                };
                bump(&self.stats.refreshes_skipped_unchanged);
                tracing::info!(count = fp.count, checksum = %fp.checksum, "collection unchanged, reusing persisted manifest");

                let collection = Arc::new(manifest);
                self.memory.set_collection(collection.clone(), index).await;
                return Ok(collection);
            }
        }

        let bookmarks = if self.config.enrich_images {
            bump(&self.stats.enrichment_runs);
            let previous = self.persistence.read_manifest().await.unwrap_or_default();
            let (enriched, _) = self.enricher.enrich(fetched, &previous, mode).await;
            enriched
        } else {
            fetched
        };

        let mut index = self.persistence.write_collection(&bookmarks).await?;

        if self.config.tag_cache_enabled
            && let Err(e) = self.persistence.write_tag_collections(&bookmarks, self.config.tag_cache_top_n).await
        {
            tracing::warn!(error = %e, "tag collections not persisted, next refresh rewrites the collection");
            if let Some(marked) = self.persistence.mark_incomplete().await {
                index = marked;
            }
        }

        bump(&self.stats.refreshes_run);
        let collection = Arc::new(bookmarks);
        self.memory.set_collection(collection.clone(), Some(index)).await;
        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use tidemark_core::lock::LockEntry;
    use tidemark_core::store::{ObjectStore, PutOptions};
    use tidemark_core::testing::{CountingStore, bookmark, collection};
    use tidemark_core::{LockManager, SqliteStore};

    use super::*;
    use crate::engine::EngineConfig;
    use crate::engine::fakes::{FakeFetcher, FakeSource, counting_store, dyn_store, silent_upstream};
    use crate::upstream::{UpstreamClient, UpstreamConfig};

    fn config() -> EngineConfig {
        EngineConfig {
            page_size: 20,
            enrichment_delay: Duration::ZERO,
            image_base_url: "https://cdn.example.com".into(),
            ..EngineConfig::default()
        }
    }

    fn engine(store: &Arc<CountingStore<SqliteStore>>, source: Arc<FakeSource>) -> Engine {
        Engine::new(config(), dyn_store(store), source, Arc::new(FakeFetcher::default()))
    }

    #[tokio::test]
    async fn test_refresh_persists_collection() {
        let store = counting_store().await;
        let engine = engine(&store, Arc::new(FakeSource::new(collection(50))));

        let result = engine.refresh(false).await.unwrap().unwrap();
        assert_eq!(result.len(), 50);

        let index = engine.persistence().read_index().await.unwrap();
        assert_eq!(index.count, 50);
        assert_eq!(index.total_pages, 3);
        assert_eq!(engine.persistence().read_page(3).await.unwrap().items.len(), 10);
        assert_eq!(engine.stats().refreshes_run, 1);

        // Released on success.
        assert!(store.inner.get(&engine.persistence().keys().lock()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unchanged_collection_skips_enrichment_and_pages() {
        let store = counting_store().await;
        let source = Arc::new(FakeSource::new(vec![bookmark("a", 1, &["rust"])]));
        let engine = engine(&store, source.clone());

        let first = engine.refresh(false).await.unwrap().unwrap();
        let checksum = engine.persistence().read_index().await.unwrap().checksum;
        assert_eq!(engine.stats().enrichment_runs, 1);

        store.reset();
        let second = engine.refresh(false).await.unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(engine.persistence().read_index().await.unwrap().checksum, checksum);
        assert_eq!(engine.stats().enrichment_runs, 1);
        assert_eq!(engine.stats().refreshes_skipped_unchanged, 1);
        assert_eq!(store.puts_matching("/pages/"), 0);
        assert_eq!(store.puts_matching("manifest.json"), 0);
        assert_eq!(store.puts_matching("/tags/"), 0);
    }

    #[tokio::test]
    async fn test_reordered_upstream_is_unchanged() {
        let store = counting_store().await;
        let mut items = collection(30);
        let source = Arc::new(FakeSource::new(items.clone()));
        let engine = engine(&store, source.clone());
        engine.refresh(false).await.unwrap();

        items.reverse();
        source.set_items(items);
        engine.refresh(false).await.unwrap();
        assert_eq!(engine.stats().refreshes_skipped_unchanged, 1);
    }

    #[tokio::test]
    async fn test_force_bypasses_change_detection() {
        let store = counting_store().await;
        let engine = engine(&store, Arc::new(FakeSource::new(collection(5))));
        engine.refresh(false).await.unwrap();
        store.reset();

        engine.refresh(true).await.unwrap();
        assert_eq!(engine.stats().enrichment_runs, 2);
        assert_eq!(store.puts_matching("/pages/"), 1);
    }

    #[tokio::test]
    async fn test_force_ignored_when_disabled() {
        let store = counting_store().await;
        let cfg = EngineConfig { force_refresh_enabled: false, ..config() };
        let engine = Engine::new(
            cfg,
            dyn_store(&store),
            Arc::new(FakeSource::new(collection(5))),
            Arc::new(FakeFetcher::default()),
        );
        engine.refresh(false).await.unwrap();
        engine.refresh(true).await.unwrap();
        assert_eq!(engine.stats().refreshes_skipped_unchanged, 1);
    }

    #[tokio::test]
    async fn test_changed_timestamp_triggers_rewrite() {
        let store = counting_store().await;
        let source = Arc::new(FakeSource::new(vec![bookmark("a", 1, &[])]));
        let engine = engine(&store, source.clone());
        engine.refresh(false).await.unwrap();
        let before = engine.persistence().read_index().await.unwrap().checksum;

        source.set_items(vec![bookmark("a", 2, &[])]);
        engine.refresh(false).await.unwrap();
        let after = engine.persistence().read_index().await.unwrap().checksum;

        assert_ne!(before, after);
        assert_eq!(engine.stats().refreshes_run, 2);
    }

    #[tokio::test]
    async fn test_lock_contention_returns_none() {
        let store = counting_store().await;
        let engine = engine(&store, Arc::new(FakeSource::new(collection(3))));

        let other = LockManager::with_owner(dyn_store(&store), "other-instance");
        assert!(other.try_acquire(&engine.persistence().keys().lock(), Duration::from_secs(300)).await.unwrap());

        assert!(engine.refresh(false).await.unwrap().is_none());
        assert_eq!(engine.stats().lock_denied, 1);
        assert!(engine.persistence().read_index().await.is_none());
    }

    #[tokio::test]
    async fn test_stale_lock_is_reaped_by_refresh() {
        let store = counting_store().await;
        let engine = engine(&store, Arc::new(FakeSource::new(collection(3))));

        let entry = LockEntry {
            owner_id: "crashed".into(),
            acquired_at: chrono::Utc::now().timestamp_millis() - 400_000,
            ttl_ms: 300_000,
        };
        let body = serde_json::to_vec(&entry).unwrap();
        store.inner.put(&engine.persistence().keys().lock(), body, PutOptions::json()).await.unwrap();

        assert_eq!(engine.refresh(false).await.unwrap().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_persisted_manifest() {
        let store = counting_store().await;
        let source = Arc::new(FakeSource::new(collection(4)));
        let engine = engine(&store, source.clone());
        engine.refresh(false).await.unwrap();

        source.fail.store(true, Ordering::SeqCst);
        let fallback = engine.refresh(false).await.unwrap().unwrap();

        assert_eq!(fallback.len(), 4);
        let stats = engine.stats();
        assert_eq!(stats.refresh_failures, 1);
        assert_eq!(stats.fallbacks_served, 1);
        assert!(store.inner.get(&engine.persistence().keys().lock()).await.unwrap().is_none());
    }

    async fn summed_pages(engine: &Engine) -> (usize, usize) {
        let index = engine.persistence().read_index().await.unwrap();
        let mut total = 0;
        for n in 1..=index.total_pages {
            total += engine.persistence().read_page(n).await.map_or(0, |p| p.items.len());
        }
        (index.count, total)
    }

    #[tokio::test]
    async fn test_interrupted_page_write_is_repaired_next_cycle() {
        let store = counting_store().await;
        let source = Arc::new(FakeSource::new(collection(30)));
        let engine = engine(&store, source.clone());
        engine.refresh(false).await.unwrap();

        source.set_items(collection(50));
        store.fail_puts_matching(Some("pages/page-2.json"));
        assert_eq!(engine.refresh(false).await.unwrap().unwrap().len(), 50);
        assert_eq!(engine.stats().refresh_failures, 1);

        store.fail_puts_matching(None);
        engine.refresh(false).await.unwrap();

        let stats = engine.stats();
        assert_eq!(stats.refreshes_skipped_unchanged, 0);
        assert_eq!(stats.refreshes_run, 2);
        assert_eq!(summed_pages(&engine).await, (50, 50));
    }

    #[tokio::test]
    async fn test_failed_tag_write_forces_rewrite() {
        let store = counting_store().await;
        let items = vec![bookmark("a", 1, &["rust"]), bookmark("b", 2, &["rust", "go"])];
        let engine = engine(&store, Arc::new(FakeSource::new(items)));

        store.fail_puts_matching(Some("/tags/"));
        assert_eq!(engine.refresh(false).await.unwrap().unwrap().len(), 2);
        assert!(engine.persistence().read_index().await.unwrap().checksum.is_empty());

        store.fail_puts_matching(None);
        engine.refresh(false).await.unwrap();

        assert_eq!(engine.stats().refreshes_skipped_unchanged, 0);
        assert_eq!(engine.persistence().list_cached_tags().await.unwrap(), vec!["go", "rust"]);
        assert!(!engine.persistence().read_index().await.unwrap().checksum.is_empty());
    }

    #[tokio::test]
    async fn test_failure_without_manifest_propagates() {
        let store = counting_store().await;
        let source = Arc::new(FakeSource::new(Vec::new()));
        source.fail.store(true, Ordering::SeqCst);
        let engine = engine(&store, source);

        let err = engine.refresh(false).await.unwrap_err();
        assert!(err.is_upstream());
        assert!(store.inner.get(&engine.persistence().keys().lock()).await.unwrap().is_none());
    }

    fn hanging_engine(store: &Arc<CountingStore<SqliteStore>>, base_url: String) -> Engine {
        let client = UpstreamClient::new(UpstreamConfig {
            base_url,
            api_token: Some("token".into()),
            timeout: Duration::from_millis(100),
            ..UpstreamConfig::default()
        })
        .unwrap();
        Engine::new(config(), dyn_store(store), Arc::new(client), Arc::new(FakeFetcher::default()))
    }

    #[tokio::test]
    async fn test_upstream_timeout_serves_persisted_manifest() {
        let store = counting_store().await;
        let seeded = engine(&store, Arc::new(FakeSource::new(collection(3))));
        let persisted = seeded.refresh(false).await.unwrap().unwrap();

        let (base_url, server) = silent_upstream().await;
        let engine = hanging_engine(&store, base_url);
        let served = engine.refresh(false).await.unwrap().unwrap();

        assert_eq!(served, persisted);
        let stats = engine.stats();
        assert_eq!(stats.refresh_failures, 1);
        assert_eq!(stats.fallbacks_served, 1);
        assert!(store.inner.get(&engine.persistence().keys().lock()).await.unwrap().is_none());
        server.abort();
    }

    #[tokio::test]
    async fn test_upstream_timeout_without_manifest() {
        let store = counting_store().await;
        let (base_url, server) = silent_upstream().await;
        let engine = hanging_engine(&store, base_url);

        let err = engine.refresh(false).await.unwrap_err();
        assert!(matches!(err, Error::Shared(inner) if matches!(*inner, Error::UpstreamTimeout(_))));
        server.abort();
    }

    #[tokio::test]
    async fn test_invalid_collection_preserves_previous() {
        let store = counting_store().await;
        let source = Arc::new(FakeSource::new(collection(2)));
        let engine = engine(&store, source.clone());
        engine.refresh(false).await.unwrap();

        source.set_items(vec![bookmark("dup", 1, &[]), bookmark("dup", 2, &[])]);
        let result = engine.refresh(false).await.unwrap().unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(engine.persistence().read_index().await.unwrap().count, 2);
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_share_one_cycle() {
        let store = counting_store().await;
        let source = Arc::new(FakeSource::new(collection(10)).with_delay(Duration::from_millis(100)));
        let engine = Arc::new(engine(&store, source.clone()));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move { engine.refresh(false).await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().unwrap().len(), 10);
        }

        assert_eq!(source.fetches(), 1);
        assert_eq!(engine.stats().refreshes_run, 1);
    }

    #[tokio::test]
    async fn test_local_guard_denies_other_kind() {
        let store = counting_store().await;
        let source = Arc::new(FakeSource::new(collection(10)).with_delay(Duration::from_millis(150)));
        let engine = Arc::new(engine(&store, source.clone()));

        let normal = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.refresh(false).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(engine.refresh(true).await.unwrap().is_none());
        assert_eq!(engine.stats().local_guard_denied, 1);
        assert!(normal.await.unwrap().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_tag_collections_written() {
        let store = counting_store().await;
        let items = vec![bookmark("a", 1, &["rust", "db"]), bookmark("b", 2, &["rust"])];
        let engine = engine(&store, Arc::new(FakeSource::new(items)));
        engine.refresh(false).await.unwrap();

        let tags = engine.persistence().list_cached_tags().await.unwrap();
        assert_eq!(tags, vec!["db".to_string(), "rust".to_string()]);
        assert_eq!(engine.persistence().read_tag_index("rust").await.unwrap().count, 2);
    }

    #[tokio::test]
    async fn test_scenario_two_processes_share_one_store() {
        let store = counting_store().await;
        let first = engine(&store, Arc::new(FakeSource::new(collection(50)).with_delay(Duration::from_millis(100))));
        let second = engine(&store, Arc::new(FakeSource::new(collection(50))));

        let (a, b) = tokio::join!(first.refresh(false), async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            second.refresh(false).await
        });

        assert_eq!(a.unwrap().unwrap().len(), 50);
        assert!(b.unwrap().is_none());
        assert_eq!(second.stats().lock_denied, 1);

        let index = second.get_index().await.unwrap();
        assert_eq!((index.count, index.total_pages), (50, 3));
        let mut total = 0;
        for n in 1..=3 {
            total += second.get_page(n).await.unwrap().items.len();
        }
        assert_eq!(total, 50);
        assert_eq!(second.get_collection(Default::default()).await.unwrap().len(), 50);
    }
}
