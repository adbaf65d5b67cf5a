//! Mailbox service.
//!
//! The operations the front-end calls on behalf of a logged-in user. Every
//! operation takes an explicit [`Identity`]; there is no ambient session.

use tracing::debug;

use super::repository::MailboxRepository;
use super::submission::SubmissionClient;
use super::types::{InboxMessage, SentMessage};
use crate::db::DbPool;
use crate::{Result, WebmailError};

/// Subject prefix added to replies.
pub const REPLY_PREFIX: &str = "Re: ";

/// The logged-in email a request acts as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(String);

impl Identity {
    /// Take the identity from the session, failing when there is none.
    pub fn from_session(session: Option<&str>) -> Result<Self> {
        match session {
            Some(email) if !email.trim().is_empty() => Ok(Self(email.to_string())),
            _ => Err(WebmailError::Auth("login required".to_string())),
        }
    }

    /// The identity as the email string stored in mailbox rows.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build the subject for a reply.
pub fn reply_subject(original: &str) -> String {
    if original.starts_with(REPLY_PREFIX) {
        original.to_string()
    } else {
        format!("{REPLY_PREFIX}{original}")
    }
}

/// Service for mailbox operations.
pub struct MailboxService<'a> {
    pool: &'a DbPool,
}

impl<'a> MailboxService<'a> {
    /// Create a new MailboxService with the given pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    fn repo(&self) -> MailboxRepository<'a> {
        MailboxRepository::new(self.pool)
    }

    /// Messages delivered to the identity, oldest first.
    pub async fn list_inbox(&self, identity: &Identity) -> Result<Vec<InboxMessage>> {
        self.repo().list_inbox_for(identity.as_str()).await
    }

    /// Flagged messages delivered to the identity.
    pub async fn list_important(&self, identity: &Identity) -> Result<Vec<InboxMessage>> {
        self.repo().list_important_for(identity.as_str()).await
    }

    /// Messages the identity has sent.
    pub async fn list_sent(&self, identity: &Identity) -> Result<Vec<SentMessage>> {
        self.repo().list_sent_for(identity.as_str()).await
    }

    /// Get one inbox message.
    ///
    /// # Errors
    ///
    /// `NotFound` when the message does not exist or belongs to someone else.
    pub async fn get_inbox(&self, identity: &Identity, id: i64) -> Result<InboxMessage> {
        self.repo()
            .get_inbox(id)
            .await?
            .filter(|m| m.recipient == identity.as_str())
            .ok_or_else(|| WebmailError::NotFound("message".to_string()))
    }

    /// Get one sent message.
    ///
    /// # Errors
    ///
    /// `NotFound` when the message does not exist or belongs to someone else.
    pub async fn get_sent(&self, identity: &Identity, id: i64) -> Result<SentMessage> {
        self.repo()
            .get_sent(id)
            .await?
            .filter(|m| m.sender == identity.as_str())
            .ok_or_else(|| WebmailError::NotFound("message".to_string()))
    }

    /// Delete an inbox message owned by the identity.
    ///
    /// An absent or foreign id is a successful no-op.
    pub async fn delete_inbox(&self, identity: &Identity, id: i64) -> Result<()> {
        let deleted = self.repo().delete_inbox_owned(id, identity.as_str()).await?;
        debug!(id, identity = %identity, deleted, "delete inbox");
        Ok(())
    }

    /// Delete a sent message owned by the identity.
    ///
    /// An absent or foreign id is a successful no-op.
    pub async fn delete_sent(&self, identity: &Identity, id: i64) -> Result<()> {
        let deleted = self.repo().delete_sent_owned(id, identity.as_str()).await?;
        debug!(id, identity = %identity, deleted, "delete sent");
        Ok(())
    }

    /// Flag an inbox message owned by the identity as important.
    ///
    /// An absent or foreign id is a successful no-op.
    pub async fn mark_important(&self, identity: &Identity, id: i64) -> Result<()> {
        let updated = self
            .repo()
            .mark_important_owned(id, identity.as_str())
            .await?;
        debug!(id, identity = %identity, updated, "mark important");
        Ok(())
    }

    /// Compose and submit a new message.
    pub async fn compose(
        &self,
        client: &SubmissionClient,
        identity: &Identity,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<SentMessage> {
        client
            .submit(self.pool, identity.as_str(), to, subject, body)
            .await
    }

    /// Reply to an inbox message.
    ///
    /// Addresses the original sender and keeps the subject, prefixed with
    /// `Re: ` once.
    pub async fn reply(
        &self,
        client: &SubmissionClient,
        identity: &Identity,
        inbox_id: i64,
        body: &str,
    ) -> Result<SentMessage> {
        let original = self.get_inbox(identity, inbox_id).await?;
        let subject = reply_subject(&original.subject);

        client
            .submit(self.pool, identity.as_str(), &original.sender, &subject, body)
            .await
    }
}
