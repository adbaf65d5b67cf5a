//! Mail module.
//!
//! This module provides the mail core:
//! - Mailbox store (inbox and sent rows)
//! - Inbound message parsing
//! - Outbound submission over SMTP
//! - The identity-scoped mailbox service used by the front-end

mod parser;
mod repository;
mod service;
mod submission;
mod types;

pub use parser::{decode_payload, parse_message, BodyPart, MessageContent, ParsedMessage};
pub use repository::MailboxRepository;
pub use service::{reply_subject, Identity, MailboxService, REPLY_PREFIX};
pub use submission::SubmissionClient;
pub use types::{Envelope, InboxMessage, SentMessage};
