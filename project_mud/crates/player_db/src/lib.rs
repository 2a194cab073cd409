pub mod account;
pub mod db;
pub mod error;
mod schema;

pub use account::{validate_username, Account, AccountRepo, MIN_PASSWORD_LEN};
pub use db::PlayerDb;
pub use error::PlayerDbError;
pub use session::PermissionLevel;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_memory_db() {
        let db = PlayerDb::open_memory().unwrap();
        assert!(!db.account_exists("nobody").unwrap());
        assert_eq!(db.accounts(|a| a.count()).unwrap(), 0);
    }

    #[test]
    fn first_account_is_owner() {
        let db = PlayerDb::open_memory().unwrap();
        let first = db.create_account("Founder", "password123").unwrap();
        let second = db.create_account("Guest", "password123").unwrap();
        assert_eq!(first.permission, PermissionLevel::Owner);
        assert_eq!(second.permission, PermissionLevel::Player);
        assert!(!first.created_at.is_empty());
    }

    #[test]
    fn duplicate_account_rejected_case_insensitively() {
        let db = PlayerDb::open_memory().unwrap();
        db.create_account("Alice", "pass1").unwrap();
        let result = db.create_account("alice", "pass2");
        assert!(matches!(result, Err(PlayerDbError::AccountExists(_))));
    }

    #[test]
    fn bad_credentials_rejected_at_creation() {
        let db = PlayerDb::open_memory().unwrap();
        assert!(matches!(
            db.create_account("x", "password"),
            Err(PlayerDbError::InvalidUsername(_))
        ));
        assert!(matches!(
            db.create_account("Valid", "abc"),
            Err(PlayerDbError::PasswordTooShort(MIN_PASSWORD_LEN))
        ));
    }

    #[test]
    fn verify_account_success_sets_last_login() {
        let db = PlayerDb::open_memory().unwrap();
        db.create_account("Hero", "secret123").unwrap();
        let account = db.verify_account("hero", "secret123").unwrap();
        assert_eq!(account.username, "Hero");
        assert!(account.last_login.is_some());
    }

    #[test]
    fn verify_account_wrong_password() {
        let db = PlayerDb::open_memory().unwrap();
        db.create_account("Hero", "secret123").unwrap();
        let result = db.verify_account("Hero", "wrongpass");
        assert!(matches!(result, Err(PlayerDbError::InvalidPassword)));
    }

    #[test]
    fn verify_account_nonexistent() {
        let db = PlayerDb::open_memory().unwrap();
        let result = db.verify_account("Ghost", "pass");
        assert!(matches!(result, Err(PlayerDbError::AccountNotFound(_))));
    }

    #[test]
    fn verify_admin_follows_permission() {
        let db = PlayerDb::open_memory().unwrap();
        db.create_account("Owner", "pass1234").unwrap();
        let mortal = db.create_account("Mortal", "pass1234").unwrap();
        assert!(db.verify_admin("owner").unwrap());
        assert!(!db.verify_admin("Mortal").unwrap());
        assert!(!db.verify_admin("Nobody").unwrap());

        db.accounts(|a| a.set_permission(mortal.id, PermissionLevel::Admin))
            .unwrap();
        assert!(db.verify_admin("Mortal").unwrap());
    }

    #[test]
    fn set_permission_unknown_account() {
        let db = PlayerDb::open_memory().unwrap();
        let result = db.accounts(|a| a.set_permission(99, PermissionLevel::Admin));
        assert!(matches!(result, Err(PlayerDbError::AccountNotFound(_))));
    }

    #[test]
    fn file_database_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("players.db");
        {
            let db = PlayerDb::open(&path).unwrap();
            db.create_account("Keeper", "pass1234").unwrap();
        }
        let db = PlayerDb::open(&path).unwrap();
        assert!(db.account_exists("keeper").unwrap());
    }
}
