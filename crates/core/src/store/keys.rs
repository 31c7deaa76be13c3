//! Object key layout for persisted collections.
//!
//! ```text
//! {prefix}/manifest.json                full enriched collection
//! {prefix}/index.json                   global CollectionIndex
//! {prefix}/pages/page-{n}.json          global pages, 1-based
//! {prefix}/tags/{slug}/index.json       per-tag CollectionIndex
//! {prefix}/tags/{slug}/page-{n}.json    per-tag pages
//! {prefix}/locks/refresh.lock           distributed refresh lock
//! images/{source}/{digest}              persisted preview images
//! ```

const PAGE_FILE_PREFIX: &str = "page-";
const JSON_SUFFIX: &str = ".json";

/// Builds every key the engine reads or writes under one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    prefix: String,
}

impl KeyLayout {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into().trim_matches('/').to_string() }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Everything under the collection prefix, with trailing slash.
    pub fn root_prefix(&self) -> String {
        format!("{}/", self.prefix)
    }

    pub fn manifest(&self) -> String {
        format!("{}/manifest.json", self.prefix)
    }

    pub fn index(&self) -> String {
        format!("{}/index.json", self.prefix)
    }

    pub fn pages_prefix(&self) -> String {
        format!("{}/pages/", self.prefix)
    }

    pub fn page(&self, page: usize) -> String {
        format!("{}{PAGE_FILE_PREFIX}{page}{JSON_SUFFIX}", self.pages_prefix())
    }

    pub fn tags_prefix(&self) -> String {
        format!("{}/tags/", self.prefix)
    }

    pub fn tag_prefix(&self, slug: &str) -> String {
        format!("{}{slug}/", self.tags_prefix())
    }

    pub fn tag_index(&self, slug: &str) -> String {
        format!("{}index.json", self.tag_prefix(slug))
    }

    pub fn tag_page(&self, slug: &str, page: usize) -> String {
        format!("{}{PAGE_FILE_PREFIX}{page}{JSON_SUFFIX}", self.tag_prefix(slug))
    }

    pub fn lock(&self) -> String {
        format!("{}/locks/refresh.lock", self.prefix)
    }

    pub fn locks_prefix(&self) -> String {
        format!("{}/locks/", self.prefix)
    }

    /// The tag slug a key under `tags_prefix()` belongs to.
    pub fn tag_slug_of<'a>(&self, key: &'a str) -> Option<&'a str> {
        let rest = key.strip_prefix(&self.tags_prefix())?;
        rest.split_once('/').map(|(slug, _)| slug).filter(|slug| !slug.is_empty())
    }
}

/// Page number encoded in a page key, if the key names a page.
pub fn page_number_of(key: &str) -> Option<usize> {
    let file = key.rsplit('/').next()?;
    file.strip_prefix(PAGE_FILE_PREFIX)?
        .strip_suffix(JSON_SUFFIX)?
        .parse()
        .ok()
}

/// Key under which a persisted preview image lives.
pub fn image_key(source: &str, digest: &str) -> String {
    format!("images/{source}/{digest}")
}
