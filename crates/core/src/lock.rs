//! Distributed refresh lock on top of an `ObjectStore`.
//!
//! Acquisition is a create-only put of a [`LockEntry`]. An existing entry is
//! contention unless it is older than its TTL, in which case it is reaped
//! and acquisition retried a bounded number of times.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::Error;
use crate::store::{ObjectStore, PutOptions, PutOutcome};

/// Total create attempts when the existing entry keeps turning out stale.
const MAX_ACQUIRE_ATTEMPTS: usize = 3;
const RETRY_JITTER_MS: std::ops::Range<u64> = 50..150;

/// Persisted lock record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockEntry {
    pub owner_id: String,
    /// Milliseconds since the Unix epoch.
    pub acquired_at: i64,
    pub ttl_ms: u64,
}

impl LockEntry {
    pub fn is_stale_at(&self, now_ms: i64) -> bool {
        now_ms.saturating_sub(self.acquired_at) > self.ttl_ms as i64
    }
}

/// Lock manager bound to one store and one process identity.
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn ObjectStore>,
    owner_id: String,
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager").field("owner_id", &self.owner_id).finish()
    }
}

impl LockManager {
    /// A manager with a fresh owner id unique to this instance.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        let owner_id = format!("{}-{}", std::process::id(), uuid::Uuid::new_v4());
        Self::with_owner(store, owner_id)
    }

    pub fn with_owner(store: Arc<dyn ObjectStore>, owner_id: impl Into<String>) -> Self {
        Self { store, owner_id: owner_id.into() }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Try to take the lock at `key` without waiting.
    ///
    /// Returns `Ok(false)` when another live owner holds it.
    ///
    /// # Errors
    ///
    /// Any store failure other than the key already existing.
    pub async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool, Error> {
        for attempt in 1..=MAX_ACQUIRE_ATTEMPTS {
            let entry = LockEntry {
                owner_id: self.owner_id.clone(),
                acquired_at: Utc::now().timestamp_millis(),
                ttl_ms: ttl.as_millis() as u64,
            };
            let body = serde_json::to_vec(&entry)?;

            let outcome = self.store.put(key, body, PutOptions::create_only()).await.map_err(|e| {
                tracing::error!(key = %key, error = %e, "lock acquisition failed");
                Error::Lock(e.to_string())
            })?;

            if outcome == PutOutcome::Written {
                tracing::debug!(key = %key, owner = %self.owner_id, attempt, "lock acquired");
                return Ok(true);
            }

            if !self.reap_if_stale(key).await? {
                tracing::debug!(key = %key, "lock held by another owner");
                return Ok(false);
            }

            if attempt < MAX_ACQUIRE_ATTEMPTS {
                let jitter = rand::thread_rng().gen_range(RETRY_JITTER_MS);
                tokio::time::sleep(Duration::from_millis(jitter)).await;
            }
        }

        tracing::debug!(key = %key, "lock still contended after reaping");
        Ok(false)
    }

    /// Delete the lock only if this manager owns it.
    ///
    /// Returns whether an entry was deleted.
    pub async fn release(&self, key: &str) -> Result<bool, Error> {
        match self.read_entry(key).await? {
            Some(Ok(entry)) if entry.owner_id == self.owner_id => {
                let deleted = self.store.delete(key).await.map_err(|e| Error::Lock(e.to_string()))?;
                tracing::debug!(key = %key, "lock released");
                Ok(deleted)
            }
            Some(Ok(entry)) => {
                tracing::warn!(key = %key, holder = %entry.owner_id, "not releasing lock owned by another process");
                Ok(false)
            }
            Some(Err(_)) | None => Ok(false),
        }
    }

    /// Delete the lock regardless of owner.
    pub async fn force_release(&self, key: &str) -> Result<bool, Error> {
        self.store.delete(key).await.map_err(|e| Error::Lock(e.to_string()))
    }

    /// Delete the entry at `key` if it is stale or unreadable.
    ///
    /// Returns `true` when the key is free to contend for again, meaning the
    /// entry was reaped or had already disappeared.
    pub async fn reap_if_stale(&self, key: &str) -> Result<bool, Error> {
        let observed = match self.read_entry(key).await? {
            None => return Ok(true),
            Some(Ok(entry)) if !entry.is_stale_at(Utc::now().timestamp_millis()) => return Ok(false),
            Some(observed) => observed,
        };

        // Only delete what we judged stale; a fresh owner may have replaced it.
        match self.read_entry(key).await? {
            None => return Ok(true),
            Some(current) if current != observed => return Ok(false),
            Some(_) => {}
        }

        match &observed {
            Ok(entry) => tracing::warn!(key = %key, holder = %entry.owner_id, "reaping stale lock"),
            Err(_) => tracing::warn!(key = %key, "reaping unreadable lock entry"),
        }
        self.force_release(key).await?;
        Ok(true)
    }

    /// Start the background stale-lock sweep for `key`.
    pub fn spawn_sweeper(&self, key: impl Into<String>, interval: Duration) -> SweepHandle {
        let manager = self.clone();
        let key = key.into();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = manager.sweep_once(&key).await {
                    tracing::warn!(key = %key, error = %e, "lock sweep failed");
                }
            }
        });
        SweepHandle { handle: Some(handle) }
    }

    async fn sweep_once(&self, key: &str) -> Result<(), Error> {
        let present = self.store.head(key).await.map_err(|e| Error::Lock(e.to_string()))?.is_some();
        if present && self.reap_if_stale(key).await? {
            tracing::info!(key = %key, "sweep cleared stale lock");
        }
        Ok(())
    }

    /// `None` for an absent key, `Some(Err(raw))` for a body that does not
    /// decode as a lock entry.
    async fn read_entry(&self, key: &str) -> Result<Option<Result<LockEntry, Vec<u8>>>, Error> {
        let object = self.store.get(key).await.map_err(|e| {
            tracing::error!(key = %key, error = %e, "lock read failed");
            Error::Lock(e.to_string())
        })?;
        Ok(object.map(|o| serde_json::from_slice(&o.body).map_err(|_| o.body)))
    }
}

/// Handle to the periodic sweep task.
///
/// Dropping the handle detaches the task; it never holds the runtime open
/// on its own since it is aborted with the runtime. Call [`SweepHandle::stop`]
/// to cancel it explicitly.
#[derive(Debug)]
pub struct SweepHandle {
    handle: Option<JoinHandle<()>>,
}

impl SweepHandle {
    pub fn stop(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use tokio::task::JoinSet;

    const KEY: &str = "bookmarks/locks/refresh.lock";
    const TTL: Duration = Duration::from_secs(300);

    async fn store() -> Arc<dyn ObjectStore> {
        Arc::new(SqliteStore::open_in_memory().await.unwrap())
    }

    async fn plant(store: &Arc<dyn ObjectStore>, entry: &LockEntry) {
        let body = serde_json::to_vec(entry).unwrap();
        store.put(KEY, body, PutOptions::overwrite()).await.unwrap();
    }

    #[tokio::test]
    async fn test_mutual_exclusion() {
        let store = store().await;
        let mut set = JoinSet::new();
        for _ in 0..8 {
            let manager = LockManager::new(store.clone());
            set.spawn(async move { manager.try_acquire(KEY, TTL).await.unwrap() });
        }

        let mut winners = 0;
        while let Some(result) = set.join_next().await {
            if result.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_reacquire_by_other_denied() {
        let store = store().await;
        let first = LockManager::new(store.clone());
        let second = LockManager::new(store.clone());

        assert!(first.try_acquire(KEY, TTL).await.unwrap());
        assert!(!second.try_acquire(KEY, TTL).await.unwrap());
        assert!(first.release(KEY).await.unwrap());
        assert!(second.try_acquire(KEY, TTL).await.unwrap());
    }

    #[tokio::test]
    async fn test_reap_expired_entry() {
        let store = store().await;
        let now = Utc::now().timestamp_millis();
        plant(&store, &LockEntry { owner_id: "crashed".into(), acquired_at: now - 300_000 - 1, ttl_ms: 300_000 }).await;

        let manager = LockManager::new(store.clone());
        assert!(manager.try_acquire(KEY, TTL).await.unwrap());

        let object = store.get(KEY).await.unwrap().unwrap();
        let entry: LockEntry = serde_json::from_slice(&object.body).unwrap();
        assert_eq!(entry.owner_id, manager.owner_id());
    }

    #[tokio::test]
    async fn test_expired_entry_deleted_on_acquire() {
        let store = store().await;
        let now = Utc::now().timestamp_millis();
        plant(&store, &LockEntry { owner_id: "old".into(), acquired_at: now - 400_000, ttl_ms: 300_000 }).await;

        let manager = LockManager::new(store.clone());
        assert!(manager.try_acquire(KEY, TTL).await.unwrap());

        let old = LockManager::with_owner(store.clone(), "old");
        assert!(!old.release(KEY).await.unwrap());
        assert!(store.get(KEY).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_reaped() {
        let store = store().await;
        store.put(KEY, b"not json".to_vec(), PutOptions::overwrite()).await.unwrap();

        let manager = LockManager::new(store);
        assert!(manager.try_acquire(KEY, TTL).await.unwrap());
    }

    #[tokio::test]
    async fn test_release_requires_ownership() {
        let store = store().await;
        let owner = LockManager::new(store.clone());
        let other = LockManager::new(store.clone());

        assert!(owner.try_acquire(KEY, TTL).await.unwrap());
        assert!(!other.release(KEY).await.unwrap());
        assert!(store.get(KEY).await.unwrap().is_some());

        assert!(other.force_release(KEY).await.unwrap());
        assert!(store.get(KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sweeper_clears_stale_lock() {
        let store = store().await;
        let now = Utc::now().timestamp_millis();
        plant(&store, &LockEntry { owner_id: "dead".into(), acquired_at: now - 10_000, ttl_ms: 1_000 }).await;

        let manager = LockManager::new(store.clone());
        let sweeper = manager.spawn_sweeper(KEY, Duration::from_millis(20));
        assert!(sweeper.is_running());

        let mut cleared = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if store.get(KEY).await.unwrap().is_none() {
                cleared = true;
                break;
            }
        }
        sweeper.stop();
        assert!(cleared);
    }

    #[tokio::test]
    async fn test_sweeper_leaves_live_lock() {
        let store = store().await;
        let holder = LockManager::new(store.clone());
        assert!(holder.try_acquire(KEY, TTL).await.unwrap());

        let sweeper = LockManager::new(store.clone()).spawn_sweeper(KEY, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;
        sweeper.stop();
        assert!(store.get(KEY).await.unwrap().is_some());
    }
}
