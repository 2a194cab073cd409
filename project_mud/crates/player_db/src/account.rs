use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use password_hash::rand_core::OsRng;
use password_hash::SaltString;
use rusqlite::{Connection, OptionalExtension};
use session::PermissionLevel;

use crate::error::PlayerDbError;

pub const MIN_PASSWORD_LEN: usize = 4;

/// An account record.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub permission: PermissionLevel,
    pub created_at: String,
    pub last_login: Option<String>,
}

/// Usernames double as player names, so they must be short and printable.
pub fn validate_username(username: &str) -> Result<(), PlayerDbError> {
    let ok = (3..=16).contains(&username.chars().count())
        && username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && username.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
    if ok {
        Ok(())
    } else {
        Err(PlayerDbError::InvalidUsername(username.to_string()))
    }
}

/// Account queries over a borrowed connection.
pub struct AccountRepo<'a> {
    conn: &'a Connection,
}

impl<'a> AccountRepo<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a new account. The very first account on a fresh database is
    /// made `Owner` so a new world always has someone who can administer it.
    pub fn create(&self, username: &str, password: &str) -> Result<Account, PlayerDbError> {
        validate_username(username)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(PlayerDbError::PasswordTooShort(MIN_PASSWORD_LEN));
        }
        if self.get_by_username(username)?.is_some() {
            return Err(PlayerDbError::AccountExists(username.to_string()));
        }

        let permission = if self.count()? == 0 {
            PermissionLevel::Owner
        } else {
            PermissionLevel::Player
        };
        let password_hash = hash_password(password)?;

        self.conn.execute(
            "INSERT INTO accounts (username, password_hash, permission) VALUES (?1, ?2, ?3)",
            rusqlite::params![username, password_hash, permission.as_i32()],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::info!(account_id = id, username, ?permission, "Account created");

        self.get_by_id(id)?
            .ok_or_else(|| PlayerDbError::AccountNotFound(username.to_string()))
    }

    /// Check a username/password pair. Returns the account on success and
    /// stamps its last login.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Account, PlayerDbError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, password_hash FROM accounts WHERE username = ?1",
                rusqlite::params![username],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        let Some((id, password_hash)) = row else {
            return Err(PlayerDbError::AccountNotFound(username.to_string()));
        };
        verify_password(password, &password_hash)?;

        self.conn.execute(
            "UPDATE accounts SET last_login = datetime('now') WHERE id = ?1",
            rusqlite::params![id],
        )?;

        self.get_by_id(id)?
            .ok_or_else(|| PlayerDbError::AccountNotFound(username.to_string()))
    }

    /// Get an account by username (case-insensitive).
    pub fn get_by_username(&self, username: &str) -> Result<Option<Account>, PlayerDbError> {
        self.select_one("WHERE username = ?1", rusqlite::params![username])
    }

    pub fn get_by_id(&self, id: i64) -> Result<Option<Account>, PlayerDbError> {
        self.select_one("WHERE id = ?1", rusqlite::params![id])
    }

    pub fn count(&self) -> Result<i64, PlayerDbError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))?)
    }

    /// Set the permission level of an account.
    pub fn set_permission(&self, id: i64, level: PermissionLevel) -> Result<(), PlayerDbError> {
        let rows = self.conn.execute(
            "UPDATE accounts SET permission = ?1 WHERE id = ?2",
            rusqlite::params![level.as_i32(), id],
        )?;
        if rows == 0 {
            return Err(PlayerDbError::AccountNotFound(id.to_string()));
        }
        Ok(())
    }

    fn select_one(&self, clause: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Option<Account>, PlayerDbError> {
        let sql = format!(
            "SELECT id, username, permission, created_at, last_login FROM accounts {}",
            clause
        );
        let account = self
            .conn
            .query_row(&sql, params, |row| {
                Ok(Account {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    permission: PermissionLevel::from_i32(row.get(2)?),
                    created_at: row.get(3)?,
                    last_login: row.get(4)?,
                })
            })
            .optional()?;
        Ok(account)
    }
}

fn hash_password(password: &str) -> Result<String, PlayerDbError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| PlayerDbError::HashError(e.to_string()))
}

fn verify_password(password: &str, hash: &str) -> Result<(), PlayerDbError> {
    let parsed = PasswordHash::new(hash).map_err(|e| PlayerDbError::HashError(e.to_string()))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| PlayerDbError::InvalidPassword)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_rules() {
        assert!(validate_username("Alice").is_ok());
        assert!(validate_username("bob_2").is_ok());
        assert!(validate_username("al").is_err());
        assert!(validate_username("9lives").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("averyveryverylongname").is_err());
    }
}
