//! Read-only bookmark tools.
//!
//! These never fail on lock contention or store trouble; they return what
//! the engine's tiers hold, which may be empty.

pub mod collection;
pub mod index;
pub mod page;
pub mod tags;

pub use collection::{CollectionParams, collection_impl};
pub use index::{IndexParams, index_impl};
pub use page::{PageParams, TagPageParams, page_impl, tag_page_impl};
pub use tags::{TagsParams, tags_impl};
