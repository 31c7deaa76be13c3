//! Network-facing half of tidemark.
//!
//! This crate provides the upstream bookmark API client, the guarded image
//! fetcher, the HTTP object store backend, and the [`Engine`] that ties
//! them to the core persistence layer.

pub mod engine;
pub mod fetch;
pub mod store;
pub mod upstream;

pub use engine::{
    CollectionOptions, Engine, EngineConfig, InvalidateReport, InvalidateScope, PersistenceMode, StatsSnapshot,
    TagSummary,
};
pub use fetch::{FetchConfig, FetchedImage, HttpImageFetcher, ImageFetcher};
pub use store::{HttpObjectStore, open_store};
pub use upstream::{BookmarkPage, BookmarkSource, UpstreamClient, UpstreamConfig, UpstreamError};
