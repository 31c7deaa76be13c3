//! `ObjectStore` operations for the SQLite backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::SqliteStore;
use super::{ObjectMeta, ObjectStore, PutMode, PutOptions, PutOutcome, StoredObject};
use crate::Error;

fn to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

fn meta_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ObjectMeta> {
    Ok(ObjectMeta {
        key: row.get(0)?,
        size: row.get::<_, i64>(1)? as u64,
        content_type: row.get(2)?,
        last_modified: to_datetime(row.get(3)?),
    })
}

#[async_trait]
impl ObjectStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<StoredObject>, Error> {
                let mut stmt =
                    conn.prepare("SELECT key, size, content_type, last_modified, body FROM objects WHERE key = ?1")?;

                let result = stmt.query_row(params![key], |row| {
                    Ok(StoredObject { meta: meta_from_row(row)?, body: row.get(4)? })
                });

                match result {
                    Ok(object) => Ok(Some(object)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Overwrite uses UPSERT semantics; create-only relies on the primary
    /// key so concurrent creators, even in other processes, see exactly one
    /// `Written`.
    async fn put(&self, key: &str, body: Vec<u8>, options: PutOptions) -> Result<PutOutcome, Error> {
        let key = key.to_string();
        let now = Utc::now().timestamp_millis();
        self.conn
            .call(move |conn| -> Result<PutOutcome, Error> {
                let size = body.len() as i64;
                let changed = match options.mode {
                    PutMode::Overwrite => conn.execute(
                        "INSERT INTO objects (key, body, content_type, size, last_modified)
                        VALUES (?1, ?2, ?3, ?4, ?5)
                        ON CONFLICT(key) DO UPDATE SET
                            body = excluded.body,
                            content_type = excluded.content_type,
                            size = excluded.size,
                            last_modified = excluded.last_modified",
                        params![key, body, options.content_type, size, now],
                    )?,
                    PutMode::CreateOnly => conn.execute(
                        "INSERT INTO objects (key, body, content_type, size, last_modified)
                        VALUES (?1, ?2, ?3, ?4, ?5)
                        ON CONFLICT(key) DO NOTHING",
                        params![key, body, options.content_type, size, now],
                    )?,
                };

                Ok(if changed == 0 { PutOutcome::AlreadyExists } else { PutOutcome::Written })
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, key: &str) -> Result<bool, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM objects WHERE key = ?1", params![key])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, Error> {
        let prefix = prefix.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT key FROM objects
                    WHERE substr(key, 1, length(?1)) = ?1
                    ORDER BY key ASC",
                )?;
                let keys = stmt
                    .query_map(params![prefix], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<ObjectMeta>, Error> {
                let mut stmt = conn.prepare("SELECT key, size, content_type, last_modified FROM objects WHERE key = ?1")?;

                match stmt.query_row(params![key], meta_from_row) {
                    Ok(meta) => Ok(Some(meta)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let outcome = store
            .put("a/b.json", b"{}".to_vec(), PutOptions::json())
            .await
            .unwrap();
        assert_eq!(outcome, PutOutcome::Written);

        let object = store.get("a/b.json").await.unwrap().unwrap();
        assert_eq!(object.body, b"{}");
        assert_eq!(object.meta.size, 2);
        assert_eq!(object.meta.content_type.as_deref(), Some("application/json"));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        assert!(store.get("nope").await.unwrap().is_none());
        assert!(store.head("nope").await.unwrap().is_none());
        assert!(!store.delete("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_only_reports_existing() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let first = store.put("lock", b"one".to_vec(), PutOptions::create_only()).await.unwrap();
        let second = store.put("lock", b"two".to_vec(), PutOptions::create_only()).await.unwrap();
        assert_eq!(first, PutOutcome::Written);
        assert_eq!(second, PutOutcome::AlreadyExists);

        let object = store.get("lock").await.unwrap().unwrap();
        assert_eq!(object.body, b"one");
    }

    #[tokio::test]
    async fn test_overwrite_replaces() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.put("k", b"one".to_vec(), PutOptions::overwrite()).await.unwrap();
        store.put("k", b"three".to_vec(), PutOptions::overwrite()).await.unwrap();
        let meta = store.head("k").await.unwrap().unwrap();
        assert_eq!(meta.size, 5);
    }

    #[tokio::test]
    async fn test_list_by_prefix_sorted() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        for key in ["t/b/2", "t/a/1", "u/x", "t/b/1"] {
            store.put(key, Vec::new(), PutOptions::overwrite()).await.unwrap();
        }
        let keys = store.list("t/").await.unwrap();
        assert_eq!(keys, vec!["t/a/1", "t/b/1", "t/b/2"]);

        // `%` and `_` are literal in prefixes
        store.put("t%/z", Vec::new(), PutOptions::overwrite()).await.unwrap();
        assert_eq!(store.list("t%").await.unwrap(), vec!["t%/z"]);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.put("k", b"v".to_vec(), PutOptions::overwrite()).await.unwrap();
        assert!(store.delete("k").await.unwrap());
        assert!(store.get("k").await.unwrap().is_none());
    }
}
