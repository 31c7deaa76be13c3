//! Per-tag index and page sets for the most popular tags.

use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use serde::Serialize;

use super::Persistence;
use crate::Error;
use crate::checksum::fingerprint;
use crate::model::{Bookmark, CollectionIndex, Page};

/// A tag slug and how many bookmarks carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub slug: String,
    pub name: String,
    pub count: usize,
}

/// Count tag usage across the collection, most used first, ties by slug.
pub fn rank_tags(bookmarks: &[Bookmark]) -> Vec<TagCount> {
    let mut counts: HashMap<&str, TagCount> = HashMap::new();
    for tag in bookmarks.iter().flat_map(|b| b.tags.iter()) {
        counts
            .entry(tag.slug.as_str())
            .or_insert_with(|| TagCount { slug: tag.slug.clone(), name: tag.name.clone(), count: 0 })
            .count += 1;
    }

    let mut ranked: Vec<TagCount> = counts.into_values().collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.slug.cmp(&b.slug)));
    ranked
}

fn members(bookmarks: &[Bookmark], slug: &str) -> Vec<Bookmark> {
    bookmarks.iter().filter(|b| b.has_tag(slug)).cloned().collect()
}

impl Persistence {
    /// Persist index and pages for the `top_n` most used tags and remove
    /// tag sets that fell out of the top.
    ///
    /// Returns the slugs written, in rank order.
    ///
    /// # Errors
    ///
    /// `Error::PersistFailed` for the first tag record that could not be
    /// written. Tags already written stay in place.
    pub async fn write_tag_collections(&self, bookmarks: &[Bookmark], top_n: usize) -> Result<Vec<String>, Error> {
        let retained: Vec<String> = rank_tags(bookmarks).into_iter().take(top_n).map(|t| t.slug).collect();

        for slug in &retained {
            let items = members(bookmarks, slug);
            let fp = fingerprint(&items);
            let index = CollectionIndex::new(fp.count, self.page_size, fp.checksum, Utc::now());
            let keys = &self.keys;
            self.write_page_set(&keys.tag_index(slug), &keys.tag_prefix(slug), &index, &items, |n| {
                keys.tag_page(slug, n)
            })
            .await?;
            tracing::debug!(tag = %slug, count = index.count, "tag collection persisted");
        }

        self.prune_tags(&retained).await;
        tracing::info!(tags = retained.len(), "tag collections persisted");
        Ok(retained)
    }

    pub async fn read_tag_index(&self, slug: &str) -> Option<CollectionIndex> {
        self.read_json(&self.keys.tag_index(slug)).await
    }

    pub async fn read_tag_page(&self, slug: &str, page: usize) -> Option<Page> {
        self.read_json(&self.keys.tag_page(slug, page)).await
    }

    /// Slugs that currently have a persisted tag set, sorted.
    pub async fn list_cached_tags(&self) -> Result<Vec<String>, Error> {
        let keys = self.store.list(&self.keys.tags_prefix()).await?;
        let slugs: BTreeSet<&str> = keys.iter().filter_map(|k| self.keys.tag_slug_of(k)).collect();
        Ok(slugs.into_iter().map(str::to_string).collect())
    }

    /// Delete every persisted tag set. Returns the number of keys removed.
    pub async fn delete_tags(&self) -> Result<usize, Error> {
        let keys = self.store.list(&self.keys.tags_prefix()).await?;
        let mut removed = 0;
        for key in &keys {
            if self.store.delete(key).await? {
                removed += 1;
            }
        }
        tracing::info!(removed, "tag collections invalidated");
        Ok(removed)
    }

    async fn prune_tags(&self, retained: &[String]) {
        let keys = match self.store.list(&self.keys.tags_prefix()).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "could not list tag sets for cleanup");
                return;
            }
        };

        for key in keys {
            let Some(slug) = self.keys.tag_slug_of(&key) else { continue };
            if retained.iter().any(|r| r == slug) {
                continue;
            }
            if let Err(e) = self.store.delete(&key).await {
                tracing::warn!(key = %key, error = %e, "could not remove dropped tag record");
            }
        }
    }
}
