use std::path::Path;
use std::time::Duration;

use campus_common::{Error, Result};
use rusqlite::Connection;
use tracing::info;

/// Open (creating if needed) the SQLite database at `db_path` with foreign
/// key enforcement switched on.
pub fn open(db_path: &Path, busy_timeout: Duration) -> Result<Connection> {
    info!("opening database at {}", db_path.display());
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(db_path)
        .map_err(|e| Error::ConnectionFailure(format!("failed to open database: {e}")))?;
    conn.busy_timeout(busy_timeout)
        .map_err(|e| Error::ConnectionFailure(format!("failed to set busy timeout: {e}")))?;

    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
        .map_err(|e| Error::ConnectionFailure(format!("failed to set pragmas: {e}")))?;

    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().map_err(|e| {
        Error::ConnectionFailure(format!("failed to open in-memory database: {e}"))
    })?;

    conn.execute_batch("PRAGMA foreign_keys=ON;")
        .map_err(|e| Error::ConnectionFailure(format!("failed to set pragmas: {e}")))?;

    Ok(conn)
}

/// Names of all user tables, sorted. SQLite's internal tables are skipped.
pub fn table_names(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )
        .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;

    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| Error::Database(format!("failed to list tables: {e}")))?;

    let mut names = Vec::new();
    for row in rows {
        names.push(row.map_err(|e| Error::Database(format!("failed to read table row: {e}")))?);
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_enforces_foreign_keys() {
        let conn = open_in_memory().unwrap();
        let on: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(on, 1);
    }

    #[test]
    fn open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("campus.db");
        let conn = open(&path, Duration::from_millis(100)).unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
        assert!(path.exists());
        assert_eq!(table_names(&conn).unwrap(), vec!["t"]);
    }

    #[test]
    fn garbage_file_is_a_connection_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("campus.db");
        std::fs::write(&path, vec![0xa5u8; 4096]).unwrap();

        let err = open(&path, Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, Error::ConnectionFailure(_)), "{err:?}");
        assert!(err.to_string().contains("not a database"), "{err}");
        assert!(err.is_retryable());
    }
}
