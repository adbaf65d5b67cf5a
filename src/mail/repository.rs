//! Mailbox store.
//!
//! Row-level access to the `inbox` and `sent` tables. Every statement is
//! atomic on its own; [`MailboxRepository::deliver`] is the one multi-row
//! write and runs inside a single transaction.

use tracing::debug;

use super::types::{InboxMessage, SentMessage};
use crate::db::DbPool;
use crate::Result;

const INBOX_COLUMNS: &str = "id, sender, recipient, subject, body, is_important";
const SENT_COLUMNS: &str = "id, sender, receiver, subject, body";

/// Repository for inbox and sent messages.
pub struct MailboxRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> MailboxRepository<'a> {
    /// Create a new MailboxRepository with the given pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert one inbox row and return its ID.
    pub async fn insert_inbox(
        &self,
        sender: &str,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO inbox (sender, recipient, subject, body) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(sender)
        .bind(recipient)
        .bind(subject)
        .bind(body)
        .fetch_one(self.pool)
        .await?;
        Ok(id)
    }

    /// Fan one delivery out to every recipient.
    ///
    /// All rows commit together or none do. Returns the new IDs in
    /// recipient order.
    pub async fn deliver(
        &self,
        sender: &str,
        recipients: &[String],
        subject: &str,
        body: &str,
    ) -> Result<Vec<i64>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(recipients.len());

        for recipient in recipients {
            let id: i64 = sqlx::query_scalar(
                "INSERT INTO inbox (sender, recipient, subject, body) VALUES (?, ?, ?, ?) RETURNING id",
            )
            .bind(sender)
            .bind(recipient.trim())
            .bind(subject)
            .bind(body)
            .fetch_one(&mut *tx)
            .await?;
            ids.push(id);
        }

        tx.commit().await?;
        debug!(sender = %sender, rows = ids.len(), "Delivery committed");
        Ok(ids)
    }

    /// Insert one sent row and return its ID.
    pub async fn insert_sent(
        &self,
        sender: &str,
        receiver: &str,
        subject: &str,
        body: &str,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO sent (sender, receiver, subject, body) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(sender)
        .bind(receiver)
        .bind(subject)
        .bind(body)
        .fetch_one(self.pool)
        .await?;
        Ok(id)
    }

    /// Get an inbox message by ID.
    pub async fn get_inbox(&self, id: i64) -> Result<Option<InboxMessage>> {
        let sql = format!("SELECT {INBOX_COLUMNS} FROM inbox WHERE id = ?");
        let message = sqlx::query_as::<_, InboxMessage>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(message)
    }

    /// Get a sent message by ID.
    pub async fn get_sent(&self, id: i64) -> Result<Option<SentMessage>> {
        let sql = format!("SELECT {SENT_COLUMNS} FROM sent WHERE id = ?");
        let message = sqlx::query_as::<_, SentMessage>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(message)
    }

    /// List a mailbox in insertion order.
    pub async fn list_inbox_for(&self, recipient: &str) -> Result<Vec<InboxMessage>> {
        let sql = format!("SELECT {INBOX_COLUMNS} FROM inbox WHERE recipient = ? ORDER BY id");
        let messages = sqlx::query_as::<_, InboxMessage>(&sql)
            .bind(recipient)
            .fetch_all(self.pool)
            .await?;
        Ok(messages)
    }

    /// List the flagged subset of a mailbox in insertion order.
    pub async fn list_important_for(&self, recipient: &str) -> Result<Vec<InboxMessage>> {
        let sql = format!(
            "SELECT {INBOX_COLUMNS} FROM inbox WHERE recipient = ? AND is_important = 1 ORDER BY id"
        );
        let messages = sqlx::query_as::<_, InboxMessage>(&sql)
            .bind(recipient)
            .fetch_all(self.pool)
            .await?;
        Ok(messages)
    }

    /// List messages submitted by a sender in insertion order.
    pub async fn list_sent_for(&self, sender: &str) -> Result<Vec<SentMessage>> {
        let sql = format!("SELECT {SENT_COLUMNS} FROM sent WHERE sender = ? ORDER BY id");
        let messages = sqlx::query_as::<_, SentMessage>(&sql)
            .bind(sender)
            .fetch_all(self.pool)
            .await?;
        Ok(messages)
    }

    /// Count the messages in a mailbox.
    pub async fn count_inbox_for(&self, recipient: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM inbox WHERE recipient = ?")
            .bind(recipient)
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    /// Delete an inbox message.
    ///
    /// Deleting an absent ID is a successful no-op; the return value tells
    /// whether a row was removed.
    pub async fn delete_inbox(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM inbox WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a sent message. Absent IDs are a no-op.
    pub async fn delete_sent(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sent WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Set the important flag on an inbox message. Absent IDs are a no-op.
    pub async fn mark_important(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE inbox SET is_important = 1 WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete an inbox message only if it belongs to `recipient`.
    pub async fn delete_inbox_owned(&self, id: i64, recipient: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM inbox WHERE id = ? AND recipient = ?")
            .bind(id)
            .bind(recipient)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a sent message only if it was submitted by `sender`.
    pub async fn delete_sent_owned(&self, id: i64, sender: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sent WHERE id = ? AND sender = ?")
            .bind(id)
            .bind(sender)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Flag an inbox message only if it belongs to `recipient`.
    pub async fn mark_important_owned(&self, id: i64, recipient: &str) -> Result<bool> {
        let result =
            sqlx::query("UPDATE inbox SET is_important = 1 WHERE id = ? AND recipient = ?")
                .bind(id)
                .bind(recipient)
                .execute(self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}
