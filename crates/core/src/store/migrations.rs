//! SQLite object store schema.
//!
//! `_schema` records every applied step; steps run in version order, each
//! inside its own transaction, at most once per database file.

use tokio_rusqlite::{Connection, params, rusqlite};

use super::Error;

struct Step {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const STEPS: &[Step] = &[Step { version: 1, name: "objects", sql: include_str!("../../migrations/001_objects.sql") }];

fn applied_version(conn: &rusqlite::Connection) -> Result<i64, Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _schema (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at INTEGER NOT NULL
        )",
    )?;
    Ok(conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _schema", [], |row| row.get(0))?)
}

/// Bring the schema up to date.
///
/// # Errors
///
/// `Error::MigrationFailed` naming the step whose SQL was rejected.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        let current = applied_version(conn)?;

        for step in STEPS.iter().filter(|s| s.version > current) {
            let fail = |e: rusqlite::Error| Error::MigrationFailed(format!("{} ({}): {e}", step.version, step.name));

            let tx = conn.transaction().map_err(fail)?;
            tx.execute_batch(step.sql).map_err(fail)?;
            tx.execute(
                "INSERT INTO _schema (version, name, applied_at) VALUES (?1, ?2, ?3)",
                params![step.version, step.name, chrono::Utc::now().timestamp_millis()],
            )
            .map_err(fail)?;
            tx.commit().map_err(fail)?;

            tracing::debug!(version = step.version, name = step.name, "store schema step applied");
        }
        Ok(())
    })
    .await
    .map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rerun_applies_nothing() {
        let conn = Connection::open_in_memory().await.unwrap();
        run(&conn).await.unwrap();
        run(&conn).await.unwrap();

        let (rows, latest): (i64, i64) = conn
            .call(|conn| conn.query_row("SELECT COUNT(*), MAX(version) FROM _schema", [], |r| Ok((r.get(0)?, r.get(1)?))))
            .await
            .unwrap();

        assert_eq!(rows, STEPS.len() as i64);
        assert_eq!(latest, STEPS[STEPS.len() - 1].version);
    }
}
