use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use netarch_core::UserId;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRow {
    pub id: UserId,
    pub username: String,
    pub created_at: String,
}

/// Lowercase hex SHA-256 of the password.
///
/// Unsalted, so identical passwords share a hash and the digest is open to
/// precomputed lookup. Kept for compatibility with existing `users` rows.
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Credential store over the `users` table.
pub struct UserRepo {
    db: Database,
}

impl UserRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create an account. Fails with `Conflict` when the username is taken.
    #[instrument(skip(self, password))]
    pub fn register(&self, username: &str, password: &str) -> Result<UserId, StoreError> {
        let hash = hash_password(password);
        let now = row_helpers::now_timestamp();

        self.db.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (username, password_hash, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![username, hash, now],
            );
            match inserted {
                Ok(_) => {
                    let id = UserId::new(conn.last_insert_rowid());
                    debug!(user_id = id.get(), "user registered");
                    Ok(id)
                }
                Err(e) if StoreError::is_constraint(&e) => {
                    Err(StoreError::Conflict(format!("username already exists: {username}")))
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Returns the user's id iff the password digest matches the stored one.
    #[instrument(skip(self, password))]
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Option<UserId>, StoreError> {
        let hash = hash_password(password);
        self.db.with_conn(|conn| {
            let id: Option<i64> = conn
                .query_row(
                    "SELECT id FROM users WHERE username = ?1 AND password_hash = ?2",
                    rusqlite::params![username, hash],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(id.map(UserId::new))
        })
    }

    #[instrument(skip(self), fields(user_id = id.get()))]
    pub fn get(&self, id: UserId) -> Result<UserRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, username, created_at FROM users WHERE id = ?1")?;
            let mut rows = stmt.query([id.get()])?;
            match rows.next()? {
                Some(row) => Ok(UserRow {
                    id: UserId::new(row_helpers::get(row, 0, "users", "id")?),
                    username: row_helpers::get(row, 1, "users", "username")?,
                    created_at: row_helpers::get(row, 2, "users", "created_at")?,
                }),
                None => Err(StoreError::NotFound(format!("user {id}"))),
            }
        })
    }
}
