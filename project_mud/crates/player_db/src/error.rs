use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlayerDbError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("account already exists: {0}")]
    AccountExists(String),

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("invalid password")]
    InvalidPassword,

    #[error("invalid username '{0}': use 3-16 letters, digits or underscores")]
    InvalidUsername(String),

    #[error("password must be at least {0} characters")]
    PasswordTooShort(usize),

    #[error("password hashing error: {0}")]
    HashError(String),

    #[error("could not create database directory: {0}")]
    Io(#[from] std::io::Error),
}
