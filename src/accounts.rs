// Account store: registration, login, username/password changes, deletion.
// Passwords are stored as hex(sha256(salt || password)) with a random per-user salt.

use sha2::{Digest, Sha256};
use sqlx::Row;
use sqlx::sqlite::SqlitePool;
use tracing::{info, instrument};

use crate::error::AccountError;
use crate::models::{Role, User};

pub struct AccountRepo {
    pool: SqlitePool,
    admin_usernames: Vec<String>,
}

impl AccountRepo {
    /// `admin_usernames` are granted the admin role when they register.
    pub fn new(pool: SqlitePool, admin_usernames: Vec<String>) -> Self {
        Self {
            pool,
            admin_usernames,
        }
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                salt TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'user',
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self, password), fields(repo = "accounts", operation = "register"))]
    pub async fn register(&self, username: &str, password: &str) -> Result<User, AccountError> {
        let username = validate_username(username)?;
        if password.is_empty() {
            return Err(AccountError::Invalid("password must not be empty".into()));
        }
        if self.find_by_username(username).await?.is_some() {
            return Err(AccountError::DuplicateUsername(username.to_string()));
        }

        let role = if self.admin_usernames.iter().any(|a| a == username) {
            Role::Admin
        } else {
            Role::User
        };
        let salt = uuid::Uuid::new_v4().simple().to_string();
        let created_at = chrono::Utc::now().timestamp_millis();
        let r = sqlx::query(
            "INSERT INTO users (username, password_hash, salt, role, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(username)
        .bind(hash_password(&salt, password))
        .bind(&salt)
        .bind(role.as_str())
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_to_duplicate(e, username))?;

        info!(username, role = role.as_str(), "account registered");
        Ok(User {
            id: r.last_insert_rowid(),
            username: username.to_string(),
            role,
            created_at,
        })
    }

    /// Checks credentials. Unknown user and wrong password are the same error.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<User, AccountError> {
        let row = sqlx::query(
            "SELECT id, username, password_hash, salt, role, created_at FROM users WHERE username = $1",
        )
        .bind(username.trim())
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Err(AccountError::InvalidCredentials);
        };
        let stored: String = row.try_get("password_hash")?;
        let salt: String = row.try_get("salt")?;
        if hash_password(&salt, password) != stored {
            return Err(AccountError::InvalidCredentials);
        }
        Ok(parse_user_row(&row)?)
    }

    pub async fn get(&self, user_id: i64) -> Result<Option<User>, AccountError> {
        let row = sqlx::query("SELECT id, username, role, created_at FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref()
            .map(parse_user_row)
            .transpose()
            .map_err(AccountError::from)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AccountError> {
        let row =
            sqlx::query("SELECT id, username, role, created_at FROM users WHERE username = $1")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
        row.as_ref()
            .map(parse_user_row)
            .transpose()
            .map_err(AccountError::from)
    }

    #[instrument(skip(self), fields(repo = "accounts", operation = "update_username"))]
    pub async fn update_username(&self, user_id: i64, new_username: &str) -> Result<(), AccountError> {
        let new_username = validate_username(new_username)?;
        if let Some(existing) = self.find_by_username(new_username).await? {
            if existing.id == user_id {
                return Ok(());
            }
            return Err(AccountError::DuplicateUsername(new_username.to_string()));
        }
        let r = sqlx::query("UPDATE users SET username = $1 WHERE id = $2")
            .bind(new_username)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| unique_to_duplicate(e, new_username))?;
        if r.rows_affected() == 0 {
            return Err(AccountError::Invalid(format!("no user with id {}", user_id)));
        }
        Ok(())
    }

    /// Replaces the password after checking the current one. A fresh salt is generated.
    #[instrument(skip(self, current, new), fields(repo = "accounts", operation = "update_password"))]
    pub async fn update_password(
        &self,
        user_id: i64,
        current: &str,
        new: &str,
    ) -> Result<(), AccountError> {
        if new.is_empty() {
            return Err(AccountError::Invalid("password must not be empty".into()));
        }
        let row = sqlx::query("SELECT password_hash, salt FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Err(AccountError::InvalidCredentials);
        };
        let stored: String = row.try_get("password_hash")?;
        let salt: String = row.try_get("salt")?;
        if hash_password(&salt, current) != stored {
            return Err(AccountError::InvalidCredentials);
        }

        let salt = uuid::Uuid::new_v4().simple().to_string();
        sqlx::query("UPDATE users SET password_hash = $1, salt = $2 WHERE id = $3")
            .bind(hash_password(&salt, new))
            .bind(&salt)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Deletes the account and every stored reading of it. Returns false for an unknown id.
    #[instrument(skip(self), fields(repo = "accounts", operation = "delete_account"))]
    pub async fn delete_account(&self, user_id: i64) -> Result<bool, AccountError> {
        let mut tx = self.pool.begin().await?;
        let readings = sqlx::query("DELETE FROM sensor_data WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        let users = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!(
            user_id,
            readings_deleted = readings.rows_affected(),
            "account deleted"
        );
        Ok(users.rows_affected() > 0)
    }
}

fn validate_username(username: &str) -> Result<&str, AccountError> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        return Err(AccountError::Invalid("username must not be empty".into()));
    }
    Ok(trimmed)
}

/// A concurrent writer can take the name between the lookup and the write; the UNIQUE
/// index then reports it.
fn unique_to_duplicate(e: sqlx::Error, username: &str) -> AccountError {
    match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AccountError::DuplicateUsername(username.to_string())
        }
        other => other.into(),
    }
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn parse_user_row(row: &sqlx::sqlite::SqliteRow) -> Result<User, sqlx::Error> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        role: Role::parse(&role),
        created_at: row.try_get("created_at")?,
    })
}
