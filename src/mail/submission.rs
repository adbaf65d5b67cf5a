//! Outbound submission.
//!
//! Sends a composed message to the configured transfer listener and, only
//! when the transfer succeeds, records the Sent copy.

use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::{Mailbox, Mailboxes};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

use super::repository::MailboxRepository;
use super::types::SentMessage;
use crate::config::SubmissionConfig;
use crate::db::DbPool;
use crate::{Result, WebmailError};

/// Client for submitting outbound mail over SMTP.
///
/// Each submission is a single attempt on a fresh connection; there is no
/// retry and no queue.
pub struct SubmissionClient {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    endpoint: String,
}

impl SubmissionClient {
    /// Create a client for the endpoint in the submission config.
    pub fn new(config: &SubmissionConfig) -> Self {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(config.host.as_str())
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)))
            .build();

        Self {
            transport,
            endpoint: format!("{}:{}", config.host, config.port),
        }
    }

    /// The `host:port` this client submits to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build the outbound message.
    ///
    /// `to` may hold several comma-separated addresses.
    pub fn build_message(sender: &str, to: &str, subject: &str, body: &str) -> Result<Message> {
        let from: Mailbox = sender
            .parse()
            .map_err(|e| WebmailError::Submission(format!("invalid sender address '{sender}': {e}")))?;
        let recipients: Mailboxes = to
            .parse()
            .map_err(|e| WebmailError::Submission(format!("invalid recipient address '{to}': {e}")))?;

        let mut builder = Message::builder()
            .from(from)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN);
        for recipient in recipients {
            builder = builder.to(recipient);
        }

        builder
            .body(body.to_string())
            .map_err(|e| WebmailError::Submission(format!("could not build message: {e}")))
    }

    /// Transmit a message and record the Sent copy.
    ///
    /// On any transmission failure nothing is written and the error carries
    /// the cause.
    pub async fn submit(
        &self,
        pool: &DbPool,
        sender: &str,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<SentMessage> {
        let message = Self::build_message(sender, to, subject, body)?;

        if let Err(e) = self.transport.send(message).await {
            warn!(endpoint = %self.endpoint, sender = %sender, error = %e, "Submission failed");
            return Err(WebmailError::Submission(e.to_string()));
        }

        let id = MailboxRepository::new(pool)
            .insert_sent(sender, to, subject, body)
            .await?;
        info!(sent_id = id, sender = %sender, to = %to, "Message submitted");

        Ok(SentMessage {
            id,
            sender: sender.to_string(),
            receiver: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        })
    }
}
