//! Application configuration with layered loading.
//!
//! Configuration is loaded with figment from, highest precedence first:
//!
//! 1. Environment variables (TIDEMARK_*)
//! 2. TOML config file (if TIDEMARK_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Which object store backend the engine persists into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Local SQLite file, shareable between processes on one host.
    Sqlite,
    /// Remote key/value object store over HTTP.
    Http,
}

/// Application configuration with layered loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the upstream bookmark API.
    ///
    /// Set via TIDEMARK_UPSTREAM_BASE_URL environment variable.
    #[serde(default = "default_upstream_base_url")]
    pub upstream_base_url: String,

    /// Bearer token for the upstream bookmark API.
    ///
    /// Set via TIDEMARK_UPSTREAM_API_TOKEN environment variable.
    /// Required only when a refresh reaches the upstream tier.
    #[serde(default)]
    pub upstream_api_token: Option<String>,

    /// Items requested per upstream page.
    #[serde(default = "default_upstream_page_limit")]
    pub upstream_page_limit: u32,

    /// Timeout for a single upstream page fetch, in milliseconds.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// User-Agent string for outbound HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Object store backend.
    ///
    /// Set via TIDEMARK_STORE_BACKEND (`sqlite` or `http`).
    #[serde(default = "default_store_backend")]
    pub store_backend: StoreBackend,

    /// Path to the SQLite object store.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Base URL of the HTTP object store (required for the `http` backend).
    #[serde(default)]
    pub store_url: Option<String>,

    /// Optional bearer token for the HTTP object store.
    #[serde(default)]
    pub store_token: Option<String>,

    /// Public URL prefix under which persisted images are served.
    ///
    /// Falls back to `store_url` when unset.
    #[serde(default)]
    pub image_public_base_url: Option<String>,

    /// Key prefix for every collection record.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Distributed lock time-to-live in milliseconds.
    #[serde(default = "default_lock_ttl_ms")]
    pub lock_ttl_ms: u64,

    /// Interval of the background stale-lock sweep in milliseconds.
    #[serde(default = "default_lock_sweep_interval_ms")]
    pub lock_sweep_interval_ms: u64,

    /// Bookmarks per persisted page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Whether per-tag page sets are persisted.
    #[serde(default = "default_true")]
    pub tag_cache_enabled: bool,

    /// How many of the most popular tags receive dedicated page sets.
    #[serde(default = "default_tag_cache_top_n")]
    pub tag_cache_top_n: usize,

    /// Whether `force` refreshes may bypass change detection.
    #[serde(default = "default_true")]
    pub force_refresh_enabled: bool,

    /// Time-to-live of the in-process memory cache, in seconds.
    #[serde(default = "default_memory_cache_ttl_secs")]
    pub memory_cache_ttl_secs: u64,

    /// Whether refreshes run the image enrichment pipeline.
    #[serde(default = "default_true")]
    pub enrich_images: bool,

    /// Whether screenshot assets may be used as preview images.
    #[serde(default)]
    pub screenshot_fallback: bool,

    /// Delay between enriched bookmarks, in milliseconds.
    #[serde(default = "default_enrichment_delay_ms")]
    pub enrichment_delay_ms: u64,

    /// Maximum bytes accepted for an external image.
    #[serde(default = "default_image_max_bytes")]
    pub image_max_bytes: usize,

    /// Capacity of the background image persistence queue.
    #[serde(default = "default_image_queue_capacity")]
    pub image_queue_capacity: usize,
}

fn default_upstream_base_url() -> String {
    "http://localhost:3000/api/v1".into()
}

fn default_upstream_page_limit() -> u32 {
    100
}

fn default_fetch_timeout_ms() -> u64 {
    10_000
}

fn default_user_agent() -> String {
    "tidemark/0.1".into()
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::Sqlite
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./tidemark-store.sqlite")
}

fn default_key_prefix() -> String {
    "bookmarks".into()
}

fn default_lock_ttl_ms() -> u64 {
    300_000 // 5 minutes
}

fn default_lock_sweep_interval_ms() -> u64 {
    120_000
}

fn default_page_size() -> usize {
    24
}

fn default_tag_cache_top_n() -> usize {
    10
}

fn default_memory_cache_ttl_secs() -> u64 {
    300
}

fn default_enrichment_delay_ms() -> u64 {
    50
}

fn default_image_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_image_queue_capacity() -> usize {
    64
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            upstream_base_url: default_upstream_base_url(),
            upstream_api_token: None,
            upstream_page_limit: default_upstream_page_limit(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            user_agent: default_user_agent(),
            store_backend: default_store_backend(),
            db_path: default_db_path(),
            store_url: None,
            store_token: None,
            image_public_base_url: None,
            key_prefix: default_key_prefix(),
            lock_ttl_ms: default_lock_ttl_ms(),
            lock_sweep_interval_ms: default_lock_sweep_interval_ms(),
            page_size: default_page_size(),
            tag_cache_enabled: true,
            tag_cache_top_n: default_tag_cache_top_n(),
            force_refresh_enabled: true,
            memory_cache_ttl_secs: default_memory_cache_ttl_secs(),
            enrich_images: true,
            screenshot_fallback: false,
            enrichment_delay_ms: default_enrichment_delay_ms(),
            image_max_bytes: default_image_max_bytes(),
            image_queue_capacity: default_image_queue_capacity(),
        }
    }
}

impl AppConfig {
    /// Per-page upstream fetch timeout.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }

    pub fn lock_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.lock_sweep_interval_ms)
    }

    pub fn memory_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.memory_cache_ttl_secs)
    }

    pub fn enrichment_delay(&self) -> Duration {
        Duration::from_millis(self.enrichment_delay_ms)
    }

    /// Public prefix for persisted image URLs, if one can be derived.
    pub fn image_base_url(&self) -> Option<&str> {
        self.image_public_base_url
            .as_deref()
            .or(self.store_url.as_deref())
            .map(|url| url.trim_end_matches('/'))
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the config file or environment cannot be
    /// parsed, or if validation fails after loading.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("TIDEMARK_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("TIDEMARK_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Check the upstream token is available (deferred until a refresh needs it).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the token is not set.
    pub fn require_upstream_token(&self) -> Result<&str, ConfigError> {
        self.upstream_api_token.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "upstream_api_token".into(),
            hint: "Set TIDEMARK_UPSTREAM_API_TOKEN environment variable".into(),
        })
    }
}
