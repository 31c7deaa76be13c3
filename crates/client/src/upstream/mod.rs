//! Upstream bookmark API client.
//!
//! ### API
//!
//! - **Listing**: `GET {base}/bookmarks?limit=N&cursor=C`, returning
//!   `{items: [...], nextCursor: string|null}`. Paging continues until
//!   `nextCursor` is null.
//! - **Assets**: `GET {base}/assets/{id}` returns the raw image bytes.
//! - **Authentication**: `Authorization: Bearer <token>` on every request.
//! - **Timeouts**: each page request is bounded; an expired page aborts the
//!   whole fetch and its partial data is discarded.
//! - **Normalization**: items are flattened into [`Bookmark`] with tags
//!   deduplicated by slug.

pub mod error;
pub mod request;
pub mod response;

use std::collections::HashSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header;
use tidemark_core::model::Bookmark;
use tidemark_core::{AppConfig, Error};

pub use error::UpstreamError;
pub use request::PageRequest;
pub use response::{ApiPage, RawBookmark, RawTag};

use crate::fetch::FetchedImage;

/// One normalized page of the upstream listing.
#[derive(Debug, Clone, Default)]
pub struct BookmarkPage {
    pub items: Vec<Bookmark>,
    pub next_cursor: Option<String>,
}

/// Source of truth for the bookmark collection.
#[async_trait]
pub trait BookmarkSource: Send + Sync {
    /// Fetch one page of the listing.
    async fn fetch_page(&self, cursor: Option<&str>) -> Result<BookmarkPage, Error>;

    /// Download a source-hosted asset (preview image or screenshot).
    async fn fetch_asset(&self, asset_id: &str) -> Result<FetchedImage, Error>;

    /// Walk every page until the cursor runs out.
    ///
    /// Any page failure fails the whole fetch. A cursor seen twice is
    /// treated as a broken listing rather than looped on.
    async fn fetch_all(&self) -> Result<Vec<Bookmark>, Error> {
        let mut items = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self.fetch_page(cursor.as_deref()).await?;
            items.extend(page.items);

            match page.next_cursor.filter(|c| !c.is_empty()) {
                None => break,
                Some(next) => {
                    if !seen.insert(next.clone()) {
                        return Err(UpstreamError::PaginationLoop(next).into());
                    }
                    cursor = Some(next);
                }
            }
        }

        tracing::debug!(count = items.len(), pages = seen.len() + 1, "upstream collection fetched");
        Ok(items)
    }
}

/// Upstream client configuration.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub api_token: Option<String>,
    pub page_limit: u32,
    /// Per-request bound, applied to each page and asset download.
    pub timeout: Duration,
    pub user_agent: String,
    pub max_asset_bytes: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api/v1".to_string(),
            api_token: None,
            page_limit: 100,
            timeout: Duration::from_secs(10),
            user_agent: "tidemark/0.1".to_string(),
            max_asset_bytes: 5 * 1024 * 1024,
        }
    }
}

impl UpstreamConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            base_url: config.upstream_base_url.trim_end_matches('/').to_string(),
            api_token: config.upstream_api_token.clone().filter(|t| !t.is_empty()),
            page_limit: config.upstream_page_limit,
            timeout: config.fetch_timeout(),
            user_agent: config.user_agent.clone(),
            max_asset_bytes: config.image_max_bytes,
        }
    }
}

/// reqwest-backed [`BookmarkSource`].
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    config: UpstreamConfig,
}

impl UpstreamClient {
    /// Build a client. A missing token is reported on first use, so a
    /// process can still serve persisted data without one.
    pub fn new(config: UpstreamConfig) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    fn token(&self) -> Result<&str, UpstreamError> {
        self.config.api_token.as_deref().ok_or(UpstreamError::MissingToken)
    }

    fn check_status(status: reqwest::StatusCode) -> Result<(), UpstreamError> {
        if status == 401 || status == 403 {
            return Err(UpstreamError::AuthError);
        }
        if status == 429 {
            return Err(UpstreamError::RateLimited);
        }
        if !status.is_success() {
            return Err(UpstreamError::HttpError { status: status.as_u16() });
        }
        Ok(())
    }

    /// Fetch and parse one listing page, bounded by the configured timeout.
    pub async fn list(&self, req: &PageRequest) -> Result<ApiPage, UpstreamError> {
        req.validate()?;
        let token = self.token()?;
        let url = format!("{}/bookmarks", self.config.base_url);
        let start = Instant::now();

        let fetch = async {
            let response = self
                .http
                .get(&url)
                .bearer_auth(token)
                .header(header::ACCEPT, "application/json")
                .query(req)
                .send()
                .await?;
            Self::check_status(response.status())?;
            let bytes = response.bytes().await?;
            serde_json::from_slice::<ApiPage>(&bytes).map_err(|e| UpstreamError::Parse(e.to_string()))
        };

        let page = tokio::time::timeout(self.config.timeout, fetch)
            .await
            .map_err(|_| UpstreamError::Timeout(self.config.timeout))??;

        tracing::debug!(
            cursor = ?req.cursor,
            items = page.items.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "upstream page fetched"
        );
        Ok(page)
    }

    /// Download an asset's bytes, bounded by the configured timeout.
    pub async fn asset(&self, asset_id: &str) -> Result<FetchedImage, UpstreamError> {
        let token = self.token()?;
        let url = format!("{}/assets/{}", self.config.base_url, asset_id);
        let asset_err = |reason: String| UpstreamError::Asset { id: asset_id.to_string(), reason };

        let fetch = async {
            let response = self.http.get(&url).bearer_auth(token).send().await?;
            Self::check_status(response.status())?;

            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
                .unwrap_or_default();
            if !content_type.starts_with("image/") {
                return Err(asset_err(format!("content type {content_type:?} is not an image")));
            }

            let bytes = response.bytes().await?;
            if bytes.len() > self.config.max_asset_bytes {
                return Err(asset_err(format!("{} bytes exceeds {}", bytes.len(), self.config.max_asset_bytes)));
            }
            Ok(FetchedImage { bytes, content_type })
        };

        tokio::time::timeout(self.config.timeout, fetch)
            .await
            .map_err(|_| UpstreamError::Timeout(self.config.timeout))?
    }
}

#[async_trait]
impl BookmarkSource for UpstreamClient {
    async fn fetch_page(&self, cursor: Option<&str>) -> Result<BookmarkPage, Error> {
        let req = PageRequest { limit: self.config.page_limit, cursor: cursor.map(str::to_string) };
        let page = self.list(&req).await?;
        Ok(BookmarkPage { items: page.items.into_iter().map(Bookmark::from).collect(), next_cursor: page.next_cursor })
    }

    async fn fetch_asset(&self, asset_id: &str) -> Result<FetchedImage, Error> {
        Ok(self.asset(asset_id).await?)
    }
}
