//! Mail types.

/// A delivered message in one recipient's mailbox.
///
/// A delivery to N recipients produces N of these, identical except for
/// `recipient`.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct InboxMessage {
    /// Message ID, assigned at insert.
    pub id: i64,
    /// Envelope sender address.
    pub sender: String,
    /// Mailbox owner address.
    pub recipient: String,
    /// Decoded subject.
    pub subject: String,
    /// Decoded plain-text body.
    pub body: String,
    /// Whether the owner flagged the message as important.
    pub is_important: bool,
}

/// A copy of a successfully submitted outbound message.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SentMessage {
    /// Message ID, assigned at insert.
    pub id: i64,
    /// Session identity that submitted the message.
    pub sender: String,
    /// Target address list as entered.
    pub receiver: String,
    /// Subject.
    pub subject: String,
    /// Body.
    pub body: String,
}

/// Envelope of one inbound delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// Envelope sender (may be empty for a null reverse-path).
    pub sender: String,
    /// Envelope recipients, in the order announced. Duplicates are kept.
    pub recipients: Vec<String>,
}

impl Envelope {
    /// Create an envelope for a sender with no recipients yet.
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            recipients: Vec::new(),
        }
    }

    /// Add a recipient, trimming surrounding whitespace.
    pub fn add_recipient(&mut self, recipient: &str) {
        self.recipients.push(recipient.trim().to_string());
    }

    /// Whether at least one recipient has been announced.
    pub fn has_recipients(&self) -> bool {
        !self.recipients.is_empty()
    }
}
