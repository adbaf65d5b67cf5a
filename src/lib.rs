//! Webmail - a minimal webmail core
//!
//! An SMTP transfer listener that files inbound mail into per-recipient
//! mailboxes, plus the mailbox store, parser, submission client and
//! identity-scoped mailbox service a web front-end builds on.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod mail;
pub mod server;

pub use auth::{
    authenticate, hash_password, register, validate_password, verify_password, PasswordError,
    RegistrationError, RegistrationRequest, ValidationError,
};
pub use config::Config;
pub use db::{Account, AccountRepository, Database, NewAccount};
pub use error::{Result, WebmailError};
pub use mail::{
    parse_message, Envelope, Identity, InboxMessage, MailboxRepository, MailboxService,
    ParsedMessage, SentMessage, SubmissionClient,
};
pub use server::{SmtpServer, SmtpSession};
