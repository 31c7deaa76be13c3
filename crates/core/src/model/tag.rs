//! Bookmark tags and slug derivation.

use serde::{Deserialize, Deserializer, Serialize};

/// Who attached a tag to a bookmark.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TagAttribution {
    User,
    Automated,
    #[default]
    Unspecified,
}

impl<'de> Deserialize<'de> for TagAttribution {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

impl TagAttribution {
    /// Parse the free-form attribution strings different APIs emit.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "user" | "human" | "manual" => TagAttribution::User,
            "automated" | "ai" | "auto" => TagAttribution::Automated,
            _ => TagAttribution::Unspecified,
        }
    }
}

/// A normalized bookmark tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub attributed_by: TagAttribution,
}

impl Tag {
    /// Build a tag, deriving the slug from the name unless one is supplied.
    ///
    /// Supplied slugs are normalized with [`slugify`] too, since the slug
    /// becomes a single object key segment. A missing id falls back to the
    /// slug so bare-name tags still have a stable identity.
    pub fn new(id: Option<&str>, name: &str, slug: Option<&str>, attributed_by: TagAttribution) -> Self {
        let name = name.trim().to_string();
        let slug = match slug.map(slugify) {
            Some(s) if !s.is_empty() => s,
            _ => slugify(&name),
        };
        let id = match id.map(str::trim) {
            Some(i) if !i.is_empty() => i.to_string(),
            _ => slug.clone(),
        };
        Self { id, name, slug, attributed_by }
    }

    /// A tag known only by its display name.
    pub fn from_name(name: &str) -> Self {
        Self::new(None, name, None, TagAttribution::Unspecified)
    }
}

/// Derive a URL slug from a tag name: lowercase, runs of whitespace and
/// path separators become `-`.
///
/// The result never contains `/`, so it is safe as a key segment.
pub fn slugify(name: &str) -> String {
    name.split(|c: char| c.is_whitespace() || c == '/' || c == '\\')
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Drop empty tags and later duplicates of the same slug, keeping order.
pub fn dedup_tags(tags: Vec<Tag>) -> Vec<Tag> {
    let mut seen = std::collections::HashSet::new();
    tags.into_iter()
        .filter(|tag| !tag.slug.is_empty() && seen.insert(tag.slug.clone()))
        .collect()
}
