//! Key/value object storage used for every persisted record.
//!
//! The engine only needs a small contract from its store:
//!
//! - Strongly consistent per-key get / put / delete
//! - A create-only put that reports, rather than fails on, an existing key
//! - Sorted list-by-prefix for discovery
//! - Metadata (size, content type, last modified) without the body
//!
//! `SqliteStore` implements it on a local SQLite file (WAL mode, safe to
//! share between processes on one host). The client crate provides an HTTP
//! implementation for remote object stores.

pub mod connection;
pub mod hash;
pub mod keys;
pub mod migrations;
pub mod objects;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use crate::Error;

pub use connection::SqliteStore;
pub use keys::KeyLayout;

/// How a put treats an existing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PutMode {
    /// Replace whatever is stored under the key.
    #[default]
    Overwrite,
    /// Write only if the key is absent.
    CreateOnly,
}

/// Options for a single put.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub mode: PutMode,
    pub content_type: Option<String>,
}

impl PutOptions {
    pub fn overwrite() -> Self {
        Self { mode: PutMode::Overwrite, content_type: None }
    }

    pub fn create_only() -> Self {
        Self { mode: PutMode::CreateOnly, content_type: None }
    }

    pub fn json() -> Self {
        Self::overwrite().with_content_type("application/json")
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Result of a put. A create-only put on an existing key is a normal
/// outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Written,
    AlreadyExists,
}

/// Metadata about a stored object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub last_modified: DateTime<Utc>,
}

/// A stored object with its body.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub meta: ObjectMeta,
    pub body: Vec<u8>,
}

/// Durable key/value object store.
///
/// Implementations must report an absent key as `Ok(None)` / `Ok(false)`,
/// never as an error; any `Err` means the store itself misbehaved.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read an object. Returns `Ok(None)` if the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, Error>;

    /// Write an object according to `options.mode`.
    async fn put(&self, key: &str, body: Vec<u8>, options: PutOptions) -> Result<PutOutcome, Error>;

    /// Delete an object. Returns `true` if the key existed.
    async fn delete(&self, key: &str) -> Result<bool, Error>;

    /// List keys starting with `prefix`, sorted ascending.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, Error>;

    /// Read object metadata without the body.
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, Error>;
}
