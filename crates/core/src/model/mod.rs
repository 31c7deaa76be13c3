//! Domain records shared by every layer of the engine.

pub mod bookmark;
pub mod index;
pub mod tag;

pub use bookmark::{Bookmark, ContentMetadata, validate_collection};
pub use index::{CollectionIndex, Page, page_of, paginate, total_pages};
pub use tag::{Tag, TagAttribution, dedup_tags, slugify};
