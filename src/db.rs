use std::path::Path;

use rusqlite::{Connection, OptionalExtension};

use crate::error::Result;
use crate::model::Store;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS kv (
            key        TEXT PRIMARY KEY,
            value      TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;
    Ok(())
}

/// Read the store under `key`. A missing record is an empty store.
pub fn load_store(conn: &Connection, key: &str) -> Result<Store> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
        .optional()?;
    match raw {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(Store::default()),
    }
}

/// Write the whole store as one row. Readers see the old or the new
/// record, never a mix.
pub fn save_store(conn: &Connection, key: &str, store: &Store) -> Result<()> {
    let json = serde_json::to_string(store)?;
    conn.execute(
        "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        rusqlite::params![key, json],
    )?;
    Ok(())
}

/// Returns whether a record was present.
pub fn remove_store(conn: &Connection, key: &str) -> Result<bool> {
    let n = conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
    Ok(n > 0)
}
