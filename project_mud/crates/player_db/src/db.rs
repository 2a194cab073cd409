use std::path::Path;

use parking_lot::Mutex;
use rusqlite::Connection;
use session::PermissionLevel;

use crate::account::{Account, AccountRepo};
use crate::error::PlayerDbError;
use crate::schema;

/// Database handle shared by every login task. SQLite access is serialized
/// through one connection.
pub struct PlayerDb {
    conn: Mutex<Connection>,
}

impl PlayerDb {
    /// Open (or create) a database at the given file path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PlayerDbError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        schema::create_tables(&conn)?;
        tracing::info!(path = %path.display(), "Player database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self, PlayerDbError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        schema::create_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` against the account table while holding the connection.
    pub fn accounts<R>(&self, f: impl FnOnce(&AccountRepo<'_>) -> R) -> R {
        let conn = self.conn.lock();
        f(&AccountRepo::new(&conn))
    }

    pub fn create_account(&self, username: &str, password: &str) -> Result<Account, PlayerDbError> {
        self.accounts(|repo| repo.create(username, password))
    }

    pub fn verify_account(&self, username: &str, password: &str) -> Result<Account, PlayerDbError> {
        self.accounts(|repo| repo.authenticate(username, password))
    }

    /// True when the account exists and holds at least `Admin`.
    pub fn verify_admin(&self, username: &str) -> Result<bool, PlayerDbError> {
        let account = self.accounts(|repo| repo.get_by_username(username))?;
        Ok(account.is_some_and(|a| a.permission >= PermissionLevel::Admin))
    }

    pub fn account_exists(&self, username: &str) -> Result<bool, PlayerDbError> {
        Ok(self.accounts(|repo| repo.get_by_username(username))?.is_some())
    }
}
