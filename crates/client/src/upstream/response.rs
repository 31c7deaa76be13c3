//! Upstream API response types and normalization into [`Bookmark`].

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tidemark_core::model::{Bookmark, ContentMetadata, Tag, TagAttribution, dedup_tags};

/// Raw page from the bookmark listing endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPage {
    #[serde(default, alias = "bookmarks")]
    pub items: Vec<RawBookmark>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// A tag as the API sends it: a bare name or a structured object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawTag {
    Name(String),
    Structured {
        #[serde(default)]
        id: Option<String>,
        name: String,
        #[serde(default)]
        slug: Option<String>,
        #[serde(default, alias = "attachedBy", alias = "attributedBy")]
        attached_by: Option<String>,
    },
}

impl From<RawTag> for Tag {
    fn from(raw: RawTag) -> Self {
        match raw {
            RawTag::Name(name) => Tag::from_name(&name),
            RawTag::Structured { id, name, slug, attached_by } => Tag::new(
                id.as_deref(),
                &name,
                slug.as_deref(),
                attached_by.as_deref().map(TagAttribution::parse).unwrap_or_default(),
            ),
        }
    }
}

/// Link content the API extracted from the bookmarked page.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawContent {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub image_asset_id: Option<String>,
    #[serde(default)]
    pub screenshot_asset_id: Option<String>,
    #[serde(default, alias = "readingTimeMinutes")]
    pub reading_time: Option<u32>,
    #[serde(default)]
    pub word_count: Option<u32>,
}

/// Individual bookmark from the API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBookmark {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<RawTag>,
    #[serde(alias = "createdAt")]
    pub date_bookmarked: DateTime<Utc>,
    #[serde(default, alias = "modifiedAt", alias = "updatedAt")]
    pub source_updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub content: Option<RawContent>,
    #[serde(default)]
    pub preview_image_url: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl From<RawBookmark> for Bookmark {
    /// Flatten the API shape. Top-level fields win over extracted content;
    /// a missing modification time falls back to the bookmark date.
    fn from(raw: RawBookmark) -> Self {
        let content = raw.content.unwrap_or_default();
        let url = non_empty(raw.url).or_else(|| non_empty(content.url)).unwrap_or_default();
        let title = non_empty(raw.title).or_else(|| non_empty(content.title)).unwrap_or_else(|| url.clone());
        let description = non_empty(raw.description).or_else(|| non_empty(content.description)).unwrap_or_default();

        let metadata = ContentMetadata {
            image_asset_id: non_empty(content.image_asset_id),
            screenshot_asset_id: non_empty(content.screenshot_asset_id),
            image_url: non_empty(content.image_url),
            reading_time_minutes: content.reading_time,
            word_count: content.word_count,
        };
        let has_metadata = metadata != ContentMetadata::default();

        Bookmark {
            id: raw.id.trim().to_string(),
            url,
            title,
            description,
            tags: dedup_tags(raw.tags.into_iter().map(Tag::from).collect()),
            date_bookmarked: raw.date_bookmarked,
            source_updated_at: raw.source_updated_at.unwrap_or(raw.date_bookmarked),
            content: has_metadata.then_some(metadata),
            preview_image_url: non_empty(raw.preview_image_url),
        }
    }
}
