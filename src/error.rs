//! Crate-wide error type.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WebmailError {
    /// Query or transaction failure.
    #[error("database error: {0}")]
    Database(String),

    /// The SQLite file could not be opened or configured.
    #[error("database connection error: {0}")]
    DatabaseConnection(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing session identity or bad credentials.
    #[error("authentication error: {0}")]
    Auth(String),

    #[error("validation error: {0}")]
    Validation(String),

    /// The named thing does not exist, or is not visible to the caller.
    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Inbound message content could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// The outbound relay refused or never answered.
    #[error("submission failed: {0}")]
    Submission(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for WebmailError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<mailparse::MailParseError> for WebmailError {
    fn from(e: mailparse::MailParseError) -> Self {
        Self::Parse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WebmailError>;
