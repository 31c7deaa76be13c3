//! Fixtures and store instrumentation shared by unit tests.
//!
//! Compiled for this crate's tests and for dependents that enable the
//! `test-util` feature.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::DateTime;

use crate::Error;
use crate::model::{Bookmark, Tag};
use crate::store::{ObjectMeta, ObjectStore, PutOptions, PutOutcome, StoredObject};

/// A bookmark with deterministic timestamps derived from `seq`.
pub fn bookmark(id: &str, seq: i64, tags: &[&str]) -> Bookmark {
    let ts = DateTime::from_timestamp(1_700_000_000 + seq, 0).unwrap_or_default();
    Bookmark {
        id: id.to_string(),
        url: format!("https://example.com/{id}"),
        title: format!("Bookmark {id}"),
        description: String::new(),
        tags: tags.iter().map(|t| Tag::from_name(t)).collect(),
        date_bookmarked: ts,
        source_updated_at: ts,
        content: None,
        preview_image_url: None,
    }
}

/// `n` untagged bookmarks with ids `bm-000`, `bm-001`, ...
pub fn collection(n: usize) -> Vec<Bookmark> {
    (0..n).map(|i| bookmark(&format!("bm-{i:03}"), i as i64, &[])).collect()
}

/// Wraps a store, counting writes per key and optionally failing calls.
pub struct CountingStore<S> {
    pub inner: S,
    puts: Mutex<HashMap<String, usize>>,
    pub deletes: AtomicUsize,
    pub fail_puts: AtomicBool,
    pub fail_reads: AtomicBool,
    fail_key: Mutex<Option<String>>,
}

impl<S: ObjectStore> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            puts: Mutex::new(HashMap::new()),
            deletes: AtomicUsize::new(0),
            fail_puts: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            fail_key: Mutex::new(None),
        }
    }

    /// Puts attempted on keys containing `needle`.
    pub fn puts_matching(&self, needle: &str) -> usize {
        let puts = self.puts.lock().unwrap_or_else(PoisonError::into_inner);
        puts.iter().filter(|(k, _)| k.contains(needle)).map(|(_, n)| n).sum()
    }

    /// Fail only puts on keys containing `needle`; `None` disarms.
    pub fn fail_puts_matching(&self, needle: Option<&str>) {
        *self.fail_key.lock().unwrap_or_else(PoisonError::into_inner) = needle.map(str::to_string);
    }

    pub fn total_puts(&self) -> usize {
        self.puts.lock().unwrap_or_else(PoisonError::into_inner).values().sum()
    }

    pub fn reset(&self) {
        self.puts.lock().unwrap_or_else(PoisonError::into_inner).clear();
        self.deletes.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl<S: ObjectStore> ObjectStore for CountingStore<S> {
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, Error> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::Store("injected read failure".into()));
        }
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, body: Vec<u8>, options: PutOptions) -> Result<PutOutcome, Error> {
        let targeted = self
            .fail_key
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
            .is_some_and(|needle| key.contains(needle));
        if targeted || self.fail_puts.load(Ordering::SeqCst) {
            return Err(Error::Store("injected write failure".into()));
        }
        *self.puts.lock().unwrap_or_else(PoisonError::into_inner).entry(key.to_string()).or_default() += 1;
        self.inner.put(key, body, options).await
    }

    async fn delete(&self, key: &str) -> Result<bool, Error> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, Error> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::Store("injected read failure".into()));
        }
        self.inner.list(prefix).await
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, Error> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::Store("injected read failure".into()));
        }
        self.inner.head(key).await
    }
}
