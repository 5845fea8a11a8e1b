//! SQLite store - tip records in a local database file.
//!
//! # Schema
//! ```sql
//! CREATE TABLE IF NOT EXISTS tips (
//!     namespace  TEXT NOT NULL,
//!     id         TEXT NOT NULL,
//!     record     TEXT NOT NULL,
//!     updated_ms INTEGER NOT NULL,
//!     PRIMARY KEY (namespace, id)
//! )
//! ```
//!
//! Several namespaces may share one file; each `SqliteStore` only sees its own.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};

use super::TipStore;
use crate::error::StoreError;
use crate::types::now_ms;

/// Durable store backed by a single SQLite connection.
pub struct SqliteStore {
    path: PathBuf,
    namespace: String,
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl SqliteStore {
    /// Open or create the database at `path`, scoped to `namespace`.
    pub fn open<P: AsRef<Path>>(path: P, namespace: &str) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path)?;
        Self::init(conn, path, namespace)
    }

    /// A private in-memory database. Nothing survives the value.
    pub fn open_in_memory(namespace: &str) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, PathBuf::from(":memory:"), namespace)
    }

    fn init(conn: Connection, path: PathBuf, namespace: &str) -> Result<Self, StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS tips (
                namespace  TEXT NOT NULL,
                id         TEXT NOT NULL,
                record     TEXT NOT NULL,
                updated_ms INTEGER NOT NULL,
                PRIMARY KEY (namespace, id)
            )",
            [],
        )?;

        Ok(Self {
            path,
            namespace: namespace.to_string(),
            conn: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl TipStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT record FROM tips WHERE namespace = ?1 AND id = ?2",
                params![self.namespace, key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO tips (namespace, id, record, updated_ms)
             VALUES (?1, ?2, ?3, ?4)",
            params![self.namespace, key, value, now_ms() as i64],
        )?;
        Ok(())
    }

    fn contains(&self, key: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let found: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM tips WHERE namespace = ?1 AND id = ?2)",
            params![self.namespace, key],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM tips WHERE namespace = ?1 AND id = ?2",
            params![self.namespace, key],
        )?;
        Ok(removed > 0)
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id FROM tips WHERE namespace = ?1")?;
        let ids = stmt
            .query_map(params![self.namespace], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn clear_all(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM tips WHERE namespace = ?1",
            params![self.namespace],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_store_table_layout() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let path = tmp_dir.path().join("tips.db");
        SqliteStore::open(&path, "onboarding")
            .unwrap()
            .set("t1", "{}")
            .unwrap();

        let conn = Connection::open(&path).unwrap();
        let row: (String, String, String, i64) = conn
            .query_row(
                "SELECT namespace, id, record, updated_ms FROM tips",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .unwrap();
        assert_eq!(row.0, "onboarding");
        assert_eq!(row.1, "t1");
        assert_eq!(row.2, "{}");
        assert!(row.3 > 0);
    }

    #[test]
    fn test_sqlite_store_create_and_reopen() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let path = tmp_dir.path().join("nested").join("tips.db");

        {
            let store = SqliteStore::open(&path, "tipkit").unwrap();
            store.set("t1", "{\"id\":\"t1\"}").unwrap();
        }
        assert!(path.exists());

        let store = SqliteStore::open(&path, "tipkit").unwrap();
        assert_eq!(store.get("t1").unwrap().as_deref(), Some("{\"id\":\"t1\"}"));
        assert!(store.contains("t1").unwrap());
        assert!(!store.contains("t2").unwrap());
    }

    #[test]
    fn test_sqlite_store_overwrite_delete() {
        let store = SqliteStore::open_in_memory("tipkit").unwrap();
        store.set("t1", "a").unwrap();
        store.set("t1", "b").unwrap();
        assert_eq!(store.get("t1").unwrap().as_deref(), Some("b"));
        assert_eq!(store.keys().unwrap(), vec!["t1".to_string()]);

        assert!(store.delete("t1").unwrap());
        assert!(!store.delete("t1").unwrap());
        assert_eq!(store.get("t1").unwrap(), None);
    }

    #[test]
    fn test_sqlite_namespaces_are_isolated() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let path = tmp_dir.path().join("tips.db");

        let app = SqliteStore::open(&path, "app").unwrap();
        let onboarding = SqliteStore::open(&path, "onboarding").unwrap();

        app.set("t1", "app").unwrap();
        onboarding.set("t1", "onboarding").unwrap();
        onboarding.set("t2", "onboarding").unwrap();

        assert_eq!(app.keys().unwrap().len(), 1);
        assert_eq!(app.get("t1").unwrap().as_deref(), Some("app"));

        onboarding.clear_all().unwrap();
        assert!(onboarding.keys().unwrap().is_empty());
        assert_eq!(app.get("t1").unwrap().as_deref(), Some("app"));
    }
}
