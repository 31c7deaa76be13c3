//! The bookmark record and collection-level shape checks.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tag::Tag;
use crate::Error;

/// Source-provided content metadata attached to a bookmark.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentMetadata {
    /// Dedicated preview image asset held by the source API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_asset_id: Option<String>,
    /// Full-page screenshot asset held by the source API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_asset_id: Option<String>,
    /// Preview image URL the source scraped from the page (e.g. og:image).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reading_time_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_count: Option<u32>,
}

/// A bookmark as served by the engine.
///
/// `id` is assigned by the source and never changes between refreshes;
/// `source_updated_at` is the authoritative modification time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub id: String,
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
    pub date_bookmarked: DateTime<Utc>,
    pub source_updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_image_url: Option<String>,
}

impl Bookmark {
    pub fn has_tag(&self, slug: &str) -> bool {
        self.tags.iter().any(|tag| tag.slug == slug)
    }

    pub fn image_asset_id(&self) -> Option<&str> {
        self.content.as_ref().and_then(|c| c.image_asset_id.as_deref())
    }

    pub fn screenshot_asset_id(&self) -> Option<&str> {
        self.content.as_ref().and_then(|c| c.screenshot_asset_id.as_deref())
    }

    pub fn content_image_url(&self) -> Option<&str> {
        self.content.as_ref().and_then(|c| c.image_url.as_deref())
    }
}

/// Reject a fetched collection that would corrupt persisted state.
///
/// # Errors
///
/// Returns `Error::Validation` for an empty id, an empty url, or a
/// duplicated id.
pub fn validate_collection(bookmarks: &[Bookmark]) -> Result<(), Error> {
    let mut seen = HashSet::with_capacity(bookmarks.len());
    for (position, bookmark) in bookmarks.iter().enumerate() {
        if bookmark.id.trim().is_empty() {
            return Err(Error::Validation(format!("bookmark at position {position} has an empty id")));
        }
        if bookmark.url.trim().is_empty() {
            return Err(Error::Validation(format!("bookmark {} has an empty url", bookmark.id)));
        }
        if !seen.insert(bookmark.id.as_str()) {
            return Err(Error::Validation(format!("duplicate bookmark id {}", bookmark.id)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::testing::bookmark;
    use super::*;

    #[test]
    fn test_validate_ok() {
        let items = vec![bookmark("a", 1, &["rust"]), bookmark("b", 2, &[])];
        assert!(validate_collection(&items).is_ok());
    }

    #[test]
    fn test_validate_duplicate_id() {
        let items = vec![bookmark("a", 1, &[]), bookmark("a", 2, &[])];
        assert!(matches!(validate_collection(&items), Err(Error::Validation(msg)) if msg.contains("duplicate")));
    }

    #[test]
    fn test_validate_empty_url() {
        let mut item = bookmark("a", 1, &[]);
        item.url = " ".into();
        assert!(matches!(validate_collection(&[item]), Err(Error::Validation(_))));
    }

    #[test]
    fn test_serde_uses_camel_case() {
        let item = bookmark("a", 1, &["Rust"]);
        let json = serde_json::to_value(&item).unwrap();
        assert!(json.get("sourceUpdatedAt").is_some());
        assert!(json.get("dateBookmarked").is_some());
        assert!(json.get("previewImageUrl").is_none());
        assert_eq!(json["tags"][0]["slug"], "rust");
    }

    #[test]
    fn test_has_tag() {
        let item = bookmark("a", 1, &["Machine Learning"]);
        assert!(item.has_tag("machine-learning"));
        assert!(!item.has_tag("rust"));
    }
}
