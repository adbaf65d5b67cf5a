//! Account registration and credential checks.
//!
//! This is the account directory the mail core consults: it answers whether
//! an email is registered and whether an email/password pair is valid.

use thiserror::Error;
use tracing::{info, warn};

use crate::auth::validation::{validate_email, validate_name, ValidationError};
use crate::auth::{hash_password, verify_password, PasswordError};
use crate::db::{Account, AccountRepository, DbPool, NewAccount};
use crate::WebmailError;

/// Registration-specific errors.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// Validation failed.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Email already registered.
    #[error("email already registered")]
    EmailExists,

    /// Password hashing failed.
    #[error("password error: {0}")]
    Password(#[from] PasswordError),

    /// Database error.
    #[error("database error: {0}")]
    Database(String),
}

impl From<RegistrationError> for WebmailError {
    fn from(e: RegistrationError) -> Self {
        match e {
            RegistrationError::EmailExists => {
                WebmailError::Conflict("email already registered".to_string())
            }
            RegistrationError::Database(msg) => WebmailError::Database(msg),
            other => WebmailError::Validation(other.to_string()),
        }
    }
}

/// Registration request data.
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Email address, the future mailbox key.
    pub email: String,
    /// Plain-text password (8-128 characters).
    pub password: String,
}

impl RegistrationRequest {
    /// Create a new registration request.
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Register a new account.
///
/// Validates the fields, rejects an already registered email with
/// [`RegistrationError::EmailExists`], hashes the password and inserts the row.
pub async fn register(
    pool: &DbPool,
    request: RegistrationRequest,
) -> std::result::Result<Account, RegistrationError> {
    validate_name(&request.first_name)?;
    validate_name(&request.last_name)?;
    validate_email(&request.email)?;

    let repo = AccountRepository::new(pool);
    if repo
        .exists(&request.email)
        .await
        .map_err(|e| RegistrationError::Database(e.to_string()))?
    {
        return Err(RegistrationError::EmailExists);
    }

    let password_hash = hash_password(&request.password)?;
    let new_account = NewAccount::new(
        request.first_name.trim(),
        request.last_name.trim(),
        &request.email,
        password_hash,
    );

    // The existence check above can race with another registration; the
    // UNIQUE constraint is the final word.
    let account = repo.create(&new_account).await.map_err(|e| match e {
        WebmailError::Conflict(_) => RegistrationError::EmailExists,
        other => RegistrationError::Database(other.to_string()),
    })?;

    info!(email = %account.email, account_id = account.id, "New account registered");
    Ok(account)
}

/// Check an email/password pair against the account directory.
///
/// Unknown email and wrong password produce the same error.
pub async fn authenticate(pool: &DbPool, email: &str, password: &str) -> crate::Result<Account> {
    let repo = AccountRepository::new(pool);
    let account = repo
        .get_by_email(email)
        .await?
        .ok_or_else(|| WebmailError::Auth("incorrect email or password".to_string()))?;

    if verify_password(password, &account.password).is_err() {
        warn!(email = %email, "Failed login attempt");
        return Err(WebmailError::Auth("incorrect email or password".to_string()));
    }

    Ok(account)
}
