//! Account repository.
//!
//! Lookup and creation of accounts in the `users` table. The mail core only
//! ever reads through this; registration is the single writer.

use super::account::{Account, NewAccount};
use super::DbPool;
use crate::{Result, WebmailError};

/// Repository for account operations.
pub struct AccountRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> AccountRepository<'a> {
    /// Create a new AccountRepository with the given pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new account.
    ///
    /// A duplicate email is reported as [`WebmailError::Conflict`]; no other
    /// row is touched.
    pub async fn create(&self, new_account: &NewAccount) -> Result<Account> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO users (first_name, last_name, email, password)
             VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(&new_account.first_name)
        .bind(&new_account.last_name)
        .bind(&new_account.email)
        .bind(&new_account.password)
        .fetch_one(self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                WebmailError::Conflict(format!("email {} already registered", new_account.email))
            }
            other => WebmailError::Database(other.to_string()),
        })?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| WebmailError::NotFound("account".to_string()))
    }

    /// Get an account by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT id, first_name, last_name, email, password FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(account)
    }

    /// Get an account by email (exact, case-sensitive match).
    pub async fn get_by_email(&self, email: &str) -> Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT id, first_name, last_name, email, password FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(self.pool)
        .await?;
        Ok(account)
    }

    /// Check whether an email is already registered.
    pub async fn exists(&self, email: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = ?)")
            .bind(email)
            .fetch_one(self.pool)
            .await?;
        Ok(exists)
    }

    /// Count registered accounts.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}
