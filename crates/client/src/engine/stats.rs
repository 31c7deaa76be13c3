//! Engine counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Monotonic counters updated by the engine and its background worker.
#[derive(Debug, Default)]
pub struct EngineStats {
    pub refreshes_run: AtomicU64,
    pub refreshes_skipped_unchanged: AtomicU64,
    pub refresh_failures: AtomicU64,
    pub lock_denied: AtomicU64,
    pub local_guard_denied: AtomicU64,
    pub fallbacks_served: AtomicU64,
    pub enrichment_runs: AtomicU64,
    pub images_persisted: AtomicU64,
    pub image_cache_hits: AtomicU64,
    pub images_failed: AtomicU64,
    pub images_queued: AtomicU64,
    pub images_dropped: AtomicU64,
    pub memory_hits: AtomicU64,
    pub store_reads: AtomicU64,
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub refreshes_run: u64,
    pub refreshes_skipped_unchanged: u64,
    pub refresh_failures: u64,
    pub lock_denied: u64,
    pub local_guard_denied: u64,
    pub fallbacks_served: u64,
    pub enrichment_runs: u64,
    pub images_persisted: u64,
    pub image_cache_hits: u64,
    pub images_failed: u64,
    pub images_queued: u64,
    pub images_dropped: u64,
    pub memory_hits: u64,
    pub store_reads: u64,
}

pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl EngineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            refreshes_run: get(&self.refreshes_run),
            refreshes_skipped_unchanged: get(&self.refreshes_skipped_unchanged),
            refresh_failures: get(&self.refresh_failures),
            lock_denied: get(&self.lock_denied),
            local_guard_denied: get(&self.local_guard_denied),
            fallbacks_served: get(&self.fallbacks_served),
            enrichment_runs: get(&self.enrichment_runs),
            images_persisted: get(&self.images_persisted),
            image_cache_hits: get(&self.image_cache_hits),
            images_failed: get(&self.images_failed),
            images_queued: get(&self.images_queued),
            images_dropped: get(&self.images_dropped),
            memory_hits: get(&self.memory_hits),
            store_reads: get(&self.store_reads),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let stats = EngineStats::default();
        bump(&stats.lock_denied);
        bump(&stats.lock_denied);
        bump(&stats.images_persisted);

        let snap = stats.snapshot();
        assert_eq!(snap.lock_denied, 2);
        assert_eq!(snap.images_persisted, 1);
        assert_eq!(snap.refreshes_run, 0);
    }
}
