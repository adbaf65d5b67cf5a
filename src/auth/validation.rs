//! Input validation for account registration.

use thiserror::Error;

/// Maximum name length (first or last).
pub const MAX_NAME_LENGTH: usize = 50;

/// Maximum email length.
pub const MAX_EMAIL_LENGTH: usize = 254;

/// Top-level domains accepted at registration.
pub const ALLOWED_TLDS: &[&str] = &["com", "pk"];

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A name field is empty.
    #[error("name cannot be empty")]
    NameEmpty,

    /// A name field is too long.
    #[error("name must be at most {MAX_NAME_LENGTH} characters")]
    NameTooLong,

    /// Email is too long.
    #[error("email must be at most {MAX_EMAIL_LENGTH} characters")]
    EmailTooLong,

    /// Email format is invalid.
    #[error("invalid email format: must contain @ and end with .com or .pk")]
    EmailInvalidFormat,
}

/// Validate a first or last name.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::NameEmpty);
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::NameTooLong);
    }
    Ok(())
}

/// Validate an email address for registration.
///
/// The address needs a non-empty local part, exactly one `@`, and a domain
/// with at least one label before a `.com` or `.pk` suffix.
///
/// # Examples
///
/// ```
/// use webmail::auth::validation::validate_email;
///
/// assert!(validate_email("user@example.com").is_ok());
/// assert!(validate_email("user@example.pk").is_ok());
/// assert!(validate_email("user@example.org").is_err());
/// assert!(validate_email("invalid").is_err());
/// ```
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::EmailTooLong);
    }

    let (local, domain) = email
        .split_once('@')
        .ok_or(ValidationError::EmailInvalidFormat)?;

    if local.is_empty() || domain.contains('@') {
        return Err(ValidationError::EmailInvalidFormat);
    }

    let (host, tld) = domain
        .rsplit_once('.')
        .ok_or(ValidationError::EmailInvalidFormat)?;

    if host.is_empty() || !ALLOWED_TLDS.contains(&tld) {
        return Err(ValidationError::EmailInvalidFormat);
    }

    if email.chars().any(|c| c.is_whitespace()) {
        return Err(ValidationError::EmailInvalidFormat);
    }

    Ok(())
}
