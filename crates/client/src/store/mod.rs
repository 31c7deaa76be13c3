//! Object store backends selected by configuration.

pub mod http;

use std::sync::Arc;

use tidemark_core::config::StoreBackend;
use tidemark_core::store::ObjectStore;
use tidemark_core::{AppConfig, Error, SqliteStore};

pub use http::HttpObjectStore;

/// Open the store named by `config.store_backend`.
pub async fn open_store(config: &AppConfig) -> Result<Arc<dyn ObjectStore>, Error> {
    match config.store_backend {
        StoreBackend::Sqlite => {
            tracing::info!(path = %config.db_path.display(), "using sqlite object store");
            Ok(Arc::new(SqliteStore::open(&config.db_path).await?))
        }
        StoreBackend::Http => {
            let store = HttpObjectStore::from_app(config)?;
            tracing::info!(base = %store.object_url(""), "using http object store");
            Ok(Arc::new(store))
        }
    }
}
