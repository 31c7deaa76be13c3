//! Configuration validation rules.

use crate::config::{AppConfig, StoreBackend};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for out-of-range values and
    /// `ConfigError::Missing` when the http backend has no `store_url`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 || self.page_size > 1000 {
            return Err(invalid("page_size", "must be between 1 and 1000"));
        }

        if self.upstream_page_limit == 0 || self.upstream_page_limit > 500 {
            return Err(invalid("upstream_page_limit", "must be between 1 and 500"));
        }

        if self.fetch_timeout_ms < 100 {
            return Err(invalid("fetch_timeout_ms", "must be at least 100ms"));
        }
        if self.fetch_timeout_ms > 300_000 {
            return Err(invalid("fetch_timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.lock_ttl_ms < 1_000 {
            return Err(invalid("lock_ttl_ms", "must be at least 1000ms"));
        }
        if self.lock_sweep_interval_ms < 1_000 {
            return Err(invalid("lock_sweep_interval_ms", "must be at least 1000ms"));
        }

        if self.tag_cache_enabled && self.tag_cache_top_n == 0 {
            return Err(invalid("tag_cache_top_n", "must be at least 1 when tag caching is enabled"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.key_prefix.is_empty() || self.key_prefix.starts_with('/') || self.key_prefix.ends_with('/') {
            return Err(invalid("key_prefix", "must be non-empty without leading or trailing '/'"));
        }

        if self.image_max_bytes == 0 || self.image_max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("image_max_bytes", "must be between 1 byte and 50MB"));
        }

        if self.image_queue_capacity == 0 {
            return Err(invalid("image_queue_capacity", "must be greater than 0"));
        }

        if self.store_backend == StoreBackend::Http && self.store_url.is_none() {
            return Err(ConfigError::Missing {
                field: "store_url".into(),
                hint: "Set TIDEMARK_STORE_URL when TIDEMARK_STORE_BACKEND=http".into(),
            });
        }

        if self.lock_sweep_interval_ms > self.lock_ttl_ms {
            tracing::warn!(
                sweep_ms = self.lock_sweep_interval_ms,
                ttl_ms = self.lock_ttl_ms,
                "lock sweep interval exceeds lock TTL; crashed holders may block refreshes past their TTL"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_page_size_zero() {
        let config = AppConfig { page_size: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "page_size"));
    }

    #[test]
    fn test_validate_timeout_too_small() {
        let config = AppConfig { fetch_timeout_ms: 50, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "fetch_timeout_ms"));
    }

    #[test]
    fn test_validate_lock_ttl_too_small() {
        let config = AppConfig { lock_ttl_ms: 10, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "lock_ttl_ms"));
    }

    #[test]
    fn test_validate_zero_top_n_with_tags_enabled() {
        let config = AppConfig { tag_cache_top_n: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "tag_cache_top_n"));

        let config = AppConfig { tag_cache_top_n: 0, tag_cache_enabled: false, ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_key_prefix_slashes() {
        let config = AppConfig { key_prefix: "/bookmarks".into(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "key_prefix"));
    }

    #[test]
    fn test_validate_http_backend_requires_url() {
        let config = AppConfig { store_backend: StoreBackend::Http, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Missing { field, .. }) if field == "store_url"));

        let config = AppConfig {
            store_backend: StoreBackend::Http,
            store_url: Some("https://objects.example.com".into()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_edge_case_values() {
        let config = AppConfig { page_size: 1, fetch_timeout_ms: 100, lock_ttl_ms: 1_000, ..Default::default() };
        assert!(config.validate().is_ok());
    }
}
