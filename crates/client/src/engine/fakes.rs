//! In-process source and fetcher doubles for engine tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tidemark_core::model::Bookmark;
use tidemark_core::store::ObjectStore;
use tidemark_core::testing::CountingStore;
use tidemark_core::{Error, SqliteStore};

use crate::fetch::{FetchedImage, ImageFetcher};
use crate::upstream::{BookmarkPage, BookmarkSource};

/// Serves a fixed collection as a single page.
pub struct FakeSource {
    items: Mutex<Vec<Bookmark>>,
    pub page_fetches: AtomicUsize,
    pub asset_fetches: AtomicUsize,
    pub fail: AtomicBool,
    pub delay: Duration,
}

impl FakeSource {
    pub fn new(items: Vec<Bookmark>) -> Self {
        Self {
            items: Mutex::new(items),
            page_fetches: AtomicUsize::new(0),
            asset_fetches: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_items(&self, items: Vec<Bookmark>) {
        *self.items.lock().unwrap_or_else(PoisonError::into_inner) = items;
    }

    pub fn fetches(&self) -> usize {
        self.page_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BookmarkSource for FakeSource {
    async fn fetch_page(&self, _cursor: Option<&str>) -> Result<BookmarkPage, Error> {
        self.page_fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Upstream("injected upstream failure".into()));
        }
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner).clone();
        Ok(BookmarkPage { items, next_cursor: None })
    }

    async fn fetch_asset(&self, asset_id: &str) -> Result<FetchedImage, Error> {
        self.asset_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(FetchedImage::new(asset_id.as_bytes().to_vec(), "image/webp"))
    }
}

/// Returns a tiny PNG for any URL, or fails for URLs containing "broken".
#[derive(Default)]
pub struct FakeFetcher {
    pub calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageFetcher for FakeFetcher {
    async fn fetch_image(&self, url: &str) -> Result<FetchedImage, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if url.contains("broken") {
            return Err(Error::ImageFetch(format!("{url}: status 500")));
        }
        Ok(FetchedImage::new(vec![0x89, b'P', b'N', b'G'], "image/png"))
    }
}

pub async fn counting_store() -> Arc<CountingStore<SqliteStore>> {
    Arc::new(CountingStore::new(SqliteStore::open_in_memory().await.unwrap()))
}

pub fn dyn_store(store: &Arc<CountingStore<SqliteStore>>) -> Arc<dyn ObjectStore> {
    store.clone()
}

/// Upstream address that accepts connections and never answers.
pub async fn silent_upstream() -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    (format!("http://{addr}/api/v1"), handle)
}
