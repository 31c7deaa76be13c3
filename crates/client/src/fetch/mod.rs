//! External preview-image fetching with SSRF protection.
//!
//! ### URL Canonicalization
//! - http/https only, protocol-relative URLs become https
//! - Lowercase host, remove fragments, preserve query string
//!
//! ### SSRF & Safety Gates
//! - Refuse private/reserved IP literals and local host names
//! - Resolve DNS and require every A/AAAA answer to be public
//! - Max redirects: 3
//! - Max body bytes: configurable (default 5MB)
//! - Content type must be `image/*`

pub mod ssrf;
pub mod url;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, header};

pub use ssrf::{SsrfError, is_private_or_reserved, validate_ip};
pub use self::url::{UrlError, canonicalize};

use tidemark_core::Error;

/// An image body with its declared content type.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedImage {
    pub bytes: Bytes,
    pub content_type: String,
}

impl FetchedImage {
    pub fn new(bytes: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self { bytes: bytes.into(), content_type: content_type.into() }
    }
}

/// Downloads externally hosted preview images.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch_image(&self, url: &str) -> Result<FetchedImage, Error>;
}

/// Configuration for the image fetcher.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub max_bytes: usize,
    pub timeout: Duration,
    pub max_redirects: usize,
    /// Resolve host names and reject private answers. Disable only in
    /// environments where images are served from an internal network.
    pub resolve_dns: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "tidemark/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_secs(15),
            max_redirects: 3,
            resolve_dns: true,
        }
    }
}

impl FetchConfig {
    pub fn from_app(config: &tidemark_core::AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.image_max_bytes,
            timeout: config.fetch_timeout(),
            ..Self::default()
        }
    }
}

/// Extract the bare media type from a Content-Type header value.
fn media_type(raw: &str) -> String {
    raw.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()
}

/// reqwest-backed [`ImageFetcher`].
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    http: Client,
    config: FetchConfig,
}

impl HttpImageFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::ImageFetch(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    async fn gate(&self, url: &::url::Url) -> Result<(), Error> {
        let domain = ssrf::check_host(url).map_err(|e| Error::SsrfBlocked(e.to_string()))?;
        if let Some(domain) = domain
            && self.config.resolve_dns
        {
            let port = url.port_or_known_default().unwrap_or(443);
            ssrf::resolve_public(&domain, port)
                .await
                .map_err(|e| Error::SsrfBlocked(e.to_string()))?;
        }
        Ok(())
    }

    fn check_size(&self, len: usize) -> Result<(), Error> {
        if len > self.config.max_bytes {
            return Err(Error::ImageRejected(format!("{len} bytes exceeds {}", self.config.max_bytes)));
        }
        Ok(())
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch_image(&self, url_str: &str) -> Result<FetchedImage, Error> {
        let start = Instant::now();
        let url = canonicalize(url_str).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        self.gate(&url).await?;

        let response = self
            .http
            .get(url.as_str())
            .header(header::ACCEPT, "image/avif,image/webp,image/*;q=0.9")
            .send()
            .await
            .map_err(|e| Error::ImageFetch(format!("network error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::ImageFetch(format!("status {}", status.as_u16())));
        }

        if let Some(len) = response.content_length() {
            self.check_size(len as usize)?;
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(media_type)
            .unwrap_or_default();
        if !content_type.starts_with("image/") {
            return Err(Error::ImageRejected(format!("content type {content_type:?} is not an image")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::ImageFetch(format!("failed to read response: {e}")))?;
        self.check_size(bytes.len())?;

        tracing::debug!(url = %url, bytes = bytes.len(), elapsed_ms = start.elapsed().as_millis() as u64, "image fetched");

        Ok(FetchedImage { bytes, content_type })
    }
}
