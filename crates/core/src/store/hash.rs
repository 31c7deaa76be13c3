//! SHA-256 helpers for fingerprints and idempotency keys.

use sha2::{Digest, Sha256};

/// Hex SHA-256 over newline-separated parts.
pub fn digest_parts<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Deterministic idempotency key for a persisted image.
///
/// The same stable identifier and source tag always map to the same key, so
/// repeated enrichment runs find the earlier copy instead of uploading again.
pub fn image_idempotency_key(stable_id: &str, source: &str) -> String {
    super::keys::image_key(source, &digest_parts([source, stable_id]))
}
