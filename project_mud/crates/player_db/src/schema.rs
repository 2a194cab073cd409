use rusqlite::Connection;

use crate::error::PlayerDbError;

/// Bumped whenever the accounts table changes shape.
const SCHEMA_VERSION: i64 = 1;

/// Create the accounts table on a fresh database and stamp its version.
pub fn create_tables(conn: &Connection) -> Result<(), PlayerDbError> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version >= SCHEMA_VERSION {
        return Ok(());
    }

    // Usernames compare case-insensitively so "Hero" and "hero" are one account.
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS accounts (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            username      TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password_hash TEXT NOT NULL,
            permission    INTEGER NOT NULL DEFAULT 0,
            created_at    TEXT NOT NULL DEFAULT (datetime('now')),
            last_login    TEXT
        );
        ",
    )?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tracing::debug!(from = version, to = SCHEMA_VERSION, "account schema created");
    Ok(())
}
