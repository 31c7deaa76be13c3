//! Order-insensitive collection fingerprint and change detection.

use crate::model::{Bookmark, CollectionIndex};
use crate::store::hash::digest_parts;

/// Fingerprint of a fetched collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub count: usize,
    pub checksum: String,
}

/// Hash `id:sourceUpdatedAt` pairs sorted by id.
///
/// Upstream ordering never affects the result.
pub fn fingerprint(bookmarks: &[Bookmark]) -> Fingerprint {
    let mut pairs: Vec<String> = bookmarks
        .iter()
        .map(|b| format!("{}:{}", b.id, b.source_updated_at.timestamp_millis()))
        .collect();
    pairs.sort_unstable();

    Fingerprint { count: bookmarks.len(), checksum: digest_parts(pairs.iter().map(String::as_str)) }
}

/// Whether `current` differs from the collection described by `previous`.
///
/// A missing previous index always counts as changed. Counts are compared
/// before checksums.
pub fn has_changed(current: &Fingerprint, previous: Option<&CollectionIndex>) -> bool {
    match previous {
        None => true,
        Some(index) if index.count != current.count => true,
        Some(index) => index.checksum != current.checksum,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{bookmark, collection};
    use chrono::{Duration, Utc};

    #[test]
    fn test_order_insensitive() {
        let items = collection(25);
        let mut reversed = items.clone();
        reversed.reverse();
        let mut rotated = items.clone();
        rotated.rotate_left(7);

        let expected = fingerprint(&items);
        assert_eq!(fingerprint(&reversed), expected);
        assert_eq!(fingerprint(&rotated), expected);
    }

    #[test]
    fn test_freshness_changes_checksum() {
        let items = vec![bookmark("a", 1, &[])];
        let mut updated = items.clone();
        updated[0].source_updated_at += Duration::seconds(1);
        assert_ne!(fingerprint(&items).checksum, fingerprint(&updated).checksum);
    }

    #[test]
    fn test_unrelated_fields_do_not_change_checksum() {
        let items = vec![bookmark("a", 1, &["rust"])];
        let mut retitled = items.clone();
        retitled[0].title = "Renamed".into();
        retitled[0].preview_image_url = Some("https://img.example.com/a.png".into());
        assert_eq!(fingerprint(&items), fingerprint(&retitled));
    }

    #[test]
    fn test_has_changed() {
        let items = collection(3);
        let fp = fingerprint(&items);
        assert!(has_changed(&fp, None));

        let same = CollectionIndex::new(3, 20, fp.checksum.clone(), Utc::now());
        assert!(!has_changed(&fp, Some(&same)));

        let other_count = CollectionIndex::new(4, 20, fp.checksum.clone(), Utc::now());
        assert!(has_changed(&fp, Some(&other_count)));

        let other_checksum = CollectionIndex::new(3, 20, "deadbeef".into(), Utc::now());
        assert!(has_changed(&fp, Some(&other_checksum)));
    }

    #[test]
    fn test_empty_collection() {
        let fp = fingerprint(&[]);
        assert_eq!(fp.count, 0);
        assert_eq!(fp.checksum, fingerprint(&[]).checksum);
    }
}
