//! Core types and storage for the tidemark bookmark sync engine.
//!
//! This crate provides:
//! - The bookmark data model and pagination records
//! - The `ObjectStore` abstraction with a SQLite backend
//! - The distributed refresh lock
//! - Collection fingerprinting and change detection
//! - Paginated and per-tag persistence
//! - Unified error types and layered configuration

pub mod checksum;
pub mod config;
pub mod error;
pub mod lock;
pub mod model;
pub mod persistence;
pub mod store;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use config::AppConfig;
pub use error::Error;
pub use lock::{LockEntry, LockManager, SweepHandle};
pub use persistence::Persistence;
pub use store::{ObjectStore, SqliteStore};
