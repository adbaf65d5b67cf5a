//! Per-connection SMTP session.
//!
//! Drives one client through greeting, envelope, content and delivery.
//! A connection moves through [`SessionState`] once per delivery and may
//! carry several deliveries before QUIT.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use super::protocol::{Command, Reply};
use crate::config::ServerConfig;
use crate::db::Database;
use crate::mail::{parse_message, Envelope, MailboxRepository};
use crate::Result;

/// Longest command line accepted; longer ones are discarded with a 500.
const MAX_COMMAND_LINE: u64 = 4096;

/// Phase of the current delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No greeting sent yet.
    #[default]
    Idle,
    /// Greeted, no delivery in progress.
    Connected,
    /// Sender announced, no recipients yet.
    SenderReceived,
    /// Sender and at least one recipient announced.
    EnvelopeReceived,
    /// Content block complete.
    DataReceived,
    /// Content parsed into subject and body.
    Parsed,
    /// Rows committed for every recipient.
    Persisted,
}

/// Result of reading one line from the peer.
enum LineRead {
    Line(Vec<u8>),
    Closed,
    TimedOut,
}

/// Result of reading a DATA block.
enum DataRead {
    Complete(Vec<u8>),
    TooLarge,
    Closed,
    TimedOut,
}

/// What the session loop does after a command.
enum Flow {
    Continue,
    Close,
}

/// One SMTP conversation over any byte stream.
pub struct SmtpSession<S> {
    stream: BufReader<S>,
    peer: String,
    config: Arc<ServerConfig>,
    db: Database,
    state: SessionState,
    envelope: Option<Envelope>,
}

impl<S> SmtpSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a session for an accepted stream.
    pub fn new(stream: S, peer: impl Into<String>, config: Arc<ServerConfig>, db: Database) -> Self {
        Self {
            stream: BufReader::new(stream),
            peer: peer.into(),
            config,
            db,
            state: SessionState::Idle,
            envelope: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the conversation until QUIT, disconnect, timeout or a failed delivery.
    pub async fn run(&mut self) -> Result<()> {
        let greeting = format!("{} ESMTP ready", self.config.hostname);
        self.send(&Reply::new(220, greeting)).await?;
        self.set_state(SessionState::Connected);

        loop {
            let line = match self.read_line(MAX_COMMAND_LINE).await? {
                LineRead::Line(line) => line,
                LineRead::Closed => {
                    debug!(peer = %self.peer, "Peer closed connection");
                    break;
                }
                LineRead::TimedOut => {
                    self.timed_out().await?;
                    break;
                }
            };

            if !line.ends_with(b"\n") && line.len() as u64 >= MAX_COMMAND_LINE {
                match self.discard_rest_of_line().await? {
                    LineRead::Line(_) => {
                        warn!(peer = %self.peer, "Command line too long");
                        self.send(&Reply::new(500, "Error: line too long")).await?;
                        continue;
                    }
                    LineRead::Closed => break,
                    LineRead::TimedOut => {
                        self.timed_out().await?;
                        break;
                    }
                }
            }

            let text = String::from_utf8_lossy(&line);
            let command = Command::parse(text.trim_end_matches(['\r', '\n']));
            if let Flow::Close = self.handle(command).await? {
                break;
            }
        }

        self.stream.get_mut().shutdown().await.ok();
        Ok(())
    }

    async fn handle(&mut self, command: Command) -> Result<Flow> {
        match command {
            Command::Helo(domain) => {
                self.reset();
                debug!(peer = %self.peer, domain = %domain, "HELO");
                let reply = Reply::new(250, self.config.hostname.clone());
                self.send(&reply).await?;
            }
            Command::Ehlo(domain) => {
                self.reset();
                debug!(peer = %self.peer, domain = %domain, "EHLO");
                let reply = Reply::multiline(
                    250,
                    vec![
                        self.config.hostname.clone(),
                        "8BITMIME".to_string(),
                        format!("SIZE {}", self.config.max_message_size),
                    ],
                );
                self.send(&reply).await?;
            }
            Command::Mail(sender) => {
                if self.envelope.is_some() {
                    self.send(&Reply::new(503, "Error: nested MAIL command")).await?;
                } else {
                    debug!(peer = %self.peer, sender = %sender, "MAIL FROM");
                    self.envelope = Some(Envelope::new(sender));
                    self.set_state(SessionState::SenderReceived);
                    self.send(&Reply::ok()).await?;
                }
            }
            Command::Rcpt(recipient) => self.recipient(recipient).await?,
            Command::Data => return self.data().await,
            Command::Rset => {
                self.reset();
                self.send(&Reply::ok()).await?;
            }
            Command::Noop => self.send(&Reply::ok()).await?,
            Command::Quit => {
                self.send(&Reply::new(221, "Bye")).await?;
                return Ok(Flow::Close);
            }
            Command::Malformed(verb) => {
                let reply = Reply::new(501, format!("Syntax error in {verb} arguments"));
                self.send(&reply).await?;
            }
            Command::Unknown(line) => {
                debug!(peer = %self.peer, line = %line, "Unknown command");
                self.send(&Reply::new(500, "Error: command not recognized")).await?;
            }
        }
        Ok(Flow::Continue)
    }

    async fn recipient(&mut self, recipient: String) -> Result<()> {
        let max_recipients = self.config.max_recipients;
        let reply = match self.envelope.as_mut() {
            None => Reply::new(503, "Error: need MAIL command"),
            Some(_) if recipient.trim().is_empty() => Reply::new(501, "Error: empty recipient"),
            Some(envelope) if envelope.recipients.len() >= max_recipients => {
                Reply::new(452, "Error: too many recipients")
            }
            Some(envelope) => {
                envelope.add_recipient(&recipient);
                debug!(peer = %self.peer, recipient = %recipient, "RCPT TO");
                self.state = SessionState::EnvelopeReceived;
                Reply::ok()
            }
        };
        self.send(&reply).await
    }

    async fn data(&mut self) -> Result<Flow> {
        let ready = self
            .envelope
            .as_ref()
            .is_some_and(Envelope::has_recipients);
        if !ready {
            self.send(&Reply::new(503, "Error: need RCPT command")).await?;
            return Ok(Flow::Continue);
        }

        self.send(&Reply::new(354, "End data with <CR><LF>.<CR><LF>"))
            .await?;

        let raw = match self.read_data().await? {
            DataRead::Complete(raw) => raw,
            DataRead::TooLarge => {
                warn!(peer = %self.peer, limit = self.config.max_message_size, "Message too large");
                self.reset();
                self.send(&Reply::new(552, "Error: message exceeds size limit"))
                    .await?;
                return Ok(Flow::Continue);
            }
            DataRead::Closed => {
                debug!(peer = %self.peer, "Connection closed during DATA");
                return Ok(Flow::Close);
            }
            DataRead::TimedOut => {
                self.timed_out().await?;
                return Ok(Flow::Close);
            }
        };
        self.set_state(SessionState::DataReceived);

        let envelope = self.envelope.take().unwrap_or_default();
        self.deliver(envelope, &raw).await
    }

    /// Parse the content and fan it out to every recipient.
    async fn deliver(&mut self, envelope: Envelope, raw: &[u8]) -> Result<Flow> {
        let parsed = match parse_message(raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(peer = %self.peer, sender = %envelope.sender, error = %e, "Rejected malformed message");
                self.set_state(SessionState::Connected);
                self.send(&Reply::new(554, "Error: message could not be parsed"))
                    .await?;
                return Ok(Flow::Close);
            }
        };
        self.set_state(SessionState::Parsed);

        let repo = MailboxRepository::new(self.db.pool());
        let result = repo
            .deliver(
                &envelope.sender,
                &envelope.recipients,
                &parsed.subject,
                &parsed.body,
            )
            .await;

        match result {
            Ok(ids) => {
                self.set_state(SessionState::Persisted);
                info!(
                    peer = %self.peer,
                    sender = %envelope.sender,
                    recipients = envelope.recipients.len(),
                    subject = %parsed.subject,
                    "Message delivered"
                );
                let ids: Vec<String> = ids.iter().map(i64::to_string).collect();
                self.send(&Reply::new(250, format!("OK: stored as {}", ids.join(","))))
                    .await?;
                self.set_state(SessionState::Connected);
                Ok(Flow::Continue)
            }
            Err(e) => {
                error!(peer = %self.peer, sender = %envelope.sender, error = %e, "Failed to store message");
                self.set_state(SessionState::Connected);
                self.send(&Reply::new(451, "Error: local storage failure"))
                    .await?;
                Ok(Flow::Close)
            }
        }
    }

    /// Read the content block up to the lone `.` line, undoing dot-stuffing.
    ///
    /// Content past the size limit is read and discarded so the peer stays in
    /// step with the protocol.
    async fn read_data(&mut self) -> Result<DataRead> {
        let max = self.config.max_message_size;
        let line_limit = max as u64 + 2;
        let mut raw = Vec::new();
        let mut too_large = false;

        loop {
            let line = match self.read_line(line_limit).await? {
                LineRead::Line(line) => line,
                LineRead::Closed => return Ok(DataRead::Closed),
                LineRead::TimedOut => return Ok(DataRead::TimedOut),
            };

            let content = line
                .strip_suffix(b"\r\n")
                .or_else(|| line.strip_suffix(b"\n"))
                .unwrap_or(&line[..]);
            if content == b"." && line.ends_with(b"\n") {
                break;
            }

            let unstuffed = if line.starts_with(b"..") {
                &line[1..]
            } else {
                &line[..]
            };

            if too_large {
                continue;
            }
            if raw.len() + unstuffed.len() > max {
                too_large = true;
                raw = Vec::new();
            } else {
                raw.extend_from_slice(unstuffed);
            }
        }

        Ok(if too_large {
            DataRead::TooLarge
        } else {
            DataRead::Complete(raw)
        })
    }

    async fn read_line(&mut self, limit: u64) -> Result<LineRead> {
        let timeout = Duration::from_secs(self.config.read_timeout_secs);
        let mut buf = Vec::new();
        let mut limited = (&mut self.stream).take(limit);

        match tokio::time::timeout(timeout, limited.read_until(b'\n', &mut buf)).await {
            Err(_) => Ok(LineRead::TimedOut),
            Ok(Ok(0)) => Ok(LineRead::Closed),
            Ok(Ok(_)) => Ok(LineRead::Line(buf)),
            Ok(Err(e)) => Err(e.into()),
        }
    }

    /// Skip input up to and including the next line break.
    async fn discard_rest_of_line(&mut self) -> Result<LineRead> {
        loop {
            match self.read_line(MAX_COMMAND_LINE).await? {
                LineRead::Line(chunk) if !chunk.ends_with(b"\n") => continue,
                other => return Ok(other),
            }
        }
    }

    async fn timed_out(&mut self) -> Result<()> {
        warn!(peer = %self.peer, state = ?self.state, "Read timed out");
        self.send(&Reply::new(421, "Error: timeout exceeded")).await
    }

    async fn send(&mut self, reply: &Reply) -> Result<()> {
        let stream = self.stream.get_mut();
        stream.write_all(reply.to_string().as_bytes()).await?;
        stream.flush().await?;
        Ok(())
    }

    fn reset(&mut self) {
        self.envelope = None;
        self.set_state(SessionState::Connected);
    }

    fn set_state(&mut self, state: SessionState) {
        debug!(peer = %self.peer, from = ?self.state, to = ?state, "State change");
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

    struct Client {
        reader: BufReader<ReadHalf<DuplexStream>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Client {
        async fn send(&mut self, line: &str) {
            self.writer.write_all(line.as_bytes()).await.unwrap();
            self.writer.write_all(b"\r\n").await.unwrap();
        }

        /// Read one full reply and return its code.
        async fn reply(&mut self) -> u16 {
            loop {
                let mut line = String::new();
                let n = self.reader.read_line(&mut line).await.unwrap();
                assert!(n > 0, "connection closed while waiting for reply");
                if line.as_bytes().get(3) != Some(&b'-') {
                    return line[..3].parse().unwrap();
                }
            }
        }

        async fn command(&mut self, line: &str) -> u16 {
            self.send(line).await;
            self.reply().await
        }

        async fn closed(&mut self) -> bool {
            let mut line = String::new();
            self.reader.read_line(&mut line).await.unwrap() == 0
        }
    }

    fn config() -> ServerConfig {
        ServerConfig {
            hostname: "mail.test".to_string(),
            max_message_size: 1024,
            max_recipients: 3,
            read_timeout_secs: 5,
            ..ServerConfig::default()
        }
    }

    async fn start(config: ServerConfig) -> (Client, Database, tokio::task::JoinHandle<()>) {
        let db = Database::open_in_memory().await.unwrap();
        let (client_end, server_end) = tokio::io::duplex(64 * 1024);
        let mut session = SmtpSession::new(server_end, "test", Arc::new(config), db.clone());
        let handle = tokio::spawn(async move {
            session.run().await.unwrap();
        });

        let (read, write) = tokio::io::split(client_end);
        let mut client = Client {
            reader: BufReader::new(read),
            writer: write,
        };
        assert_eq!(client.reply().await, 220);
        (client, db, handle)
    }

    #[tokio::test]
    async fn test_fan_out_delivery() {
        let (mut client, db, handle) = start(config()).await;

        assert_eq!(client.command("EHLO client.test").await, 250);
        assert_eq!(client.command("MAIL FROM:<alice@example.com>").await, 250);
        assert_eq!(client.command("RCPT TO:<a@example.com>").await, 250);
        assert_eq!(client.command("RCPT TO:<b@example.com>").await, 250);
        assert_eq!(client.command("RCPT TO:<c@example.com>").await, 250);
        assert_eq!(client.command("DATA").await, 354);
        client.send("Subject: Fan out").await;
        client.send("").await;
        client.send("hello all").await;
        assert_eq!(client.command(".").await, 250);
        assert_eq!(client.command("QUIT").await, 221);
        handle.await.unwrap();

        let repo = MailboxRepository::new(db.pool());
        for recipient in ["a@example.com", "b@example.com", "c@example.com"] {
            let rows = repo.list_inbox_for(recipient).await.unwrap();
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].sender, "alice@example.com");
            assert_eq!(rows[0].subject, "Fan out");
            assert_eq!(rows[0].body, "hello all");
            assert!(!rows[0].is_important);
        }
    }

    #[tokio::test]
    async fn test_dot_unstuffing() {
        let (mut client, db, _handle) = start(config()).await;

        client.command("HELO client.test").await;
        client.command("MAIL FROM:<alice@example.com>").await;
        client.command("RCPT TO:<bob@example.com>").await;
        assert_eq!(client.command("DATA").await, 354);
        client.send("Subject: dots").await;
        client.send("").await;
        client.send("..leading dot").await;
        assert_eq!(client.command(".").await, 250);

        let rows = MailboxRepository::new(db.pool())
            .list_inbox_for("bob@example.com")
            .await
            .unwrap();
        assert_eq!(rows[0].body, ".leading dot");
    }

    #[tokio::test]
    async fn test_command_sequencing_errors() {
        let (mut client, db, _handle) = start(config()).await;

        assert_eq!(client.command("RCPT TO:<bob@example.com>").await, 503);
        assert_eq!(client.command("DATA").await, 503);
        assert_eq!(client.command("MAIL FROM:<alice@example.com>").await, 250);
        assert_eq!(client.command("MAIL FROM:<alice@example.com>").await, 503);
        assert_eq!(client.command("DATA").await, 503);
        assert_eq!(client.command("RCPT TO:<>").await, 501);
        assert_eq!(client.command("RCPT bob").await, 501);
        assert_eq!(client.command("VRFY bob").await, 500);
        assert_eq!(client.command("NOOP").await, 250);
        assert_eq!(client.command("RSET").await, 250);
        assert_eq!(client.command("RCPT TO:<bob@example.com>").await, 503);

        let count = MailboxRepository::new(db.pool())
            .count_inbox_for("bob@example.com")
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_recipient_limit() {
        let (mut client, _db, _handle) = start(config()).await;

        client.command("MAIL FROM:<alice@example.com>").await;
        for i in 0..3 {
            let rcpt = format!("RCPT TO:<user{i}@example.com>");
            assert_eq!(client.command(&rcpt).await, 250);
        }
        assert_eq!(client.command("RCPT TO:<extra@example.com>").await, 452);
    }

    #[tokio::test]
    async fn test_oversized_message_rejected_and_session_continues() {
        let (mut client, db, _handle) = start(config()).await;

        client.command("MAIL FROM:<alice@example.com>").await;
        client.command("RCPT TO:<bob@example.com>").await;
        assert_eq!(client.command("DATA").await, 354);
        client.send("Subject: big").await;
        client.send("").await;
        let long_line = "x".repeat(2000);
        client.send(&long_line).await;
        assert_eq!(client.command(".").await, 552);

        // The transaction was discarded; a new one works.
        assert_eq!(client.command("RCPT TO:<bob@example.com>").await, 503);
        assert_eq!(client.command("MAIL FROM:<alice@example.com>").await, 250);
        assert_eq!(client.command("RCPT TO:<bob@example.com>").await, 250);
        assert_eq!(client.command("DATA").await, 354);
        client.send("Subject: small").await;
        client.send("").await;
        client.send("fits").await;
        assert_eq!(client.command(".").await, 250);

        let rows = MailboxRepository::new(db.pool())
            .list_inbox_for("bob@example.com")
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].subject, "small");
    }

    #[tokio::test]
    async fn test_unparseable_message_rejected() {
        let (mut client, db, handle) = start(config()).await;

        client.command("MAIL FROM:<alice@example.com>").await;
        client.command("RCPT TO:<bob@example.com>").await;
        assert_eq!(client.command("DATA").await, 354);
        client.send("Subject: broken").await;
        client.send("Content-Transfer-Encoding: base64").await;
        client.send("").await;
        client.send("!!!not base64!!!").await;
        assert_eq!(client.command(".").await, 554);
        assert!(client.closed().await);
        handle.await.unwrap();

        let count = MailboxRepository::new(db.pool())
            .count_inbox_for("bob@example.com")
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_storage_failure_rejected() {
        let (mut client, db, handle) = start(config()).await;
        sqlx::query("DROP TABLE inbox")
            .execute(db.pool())
            .await
            .unwrap();

        client.command("MAIL FROM:<alice@example.com>").await;
        client.command("RCPT TO:<bob@example.com>").await;
        assert_eq!(client.command("DATA").await, 354);
        client.send("Subject: lost").await;
        client.send("").await;
        client.send("body").await;
        assert_eq!(client.command(".").await, 451);
        assert!(client.closed().await);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_idle_peer_times_out() {
        let config = ServerConfig {
            read_timeout_secs: 1,
            ..config()
        };
        let (mut client, _db, handle) = start(config).await;

        assert_eq!(client.reply().await, 421);
        assert!(client.closed().await);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_overlong_command_gets_one_reply() {
        let (mut client, _db, handle) = start(config()).await;

        let long = format!("MAIL FROM:<{}@example.com>", "x".repeat(10_000));
        assert_eq!(client.command(&long).await, 500);
        // Still in step: the next command gets its own reply.
        assert_eq!(client.command("NOOP").await, 250);
        assert_eq!(client.command("MAIL FROM:<alice@example.com>").await, 250);
        assert_eq!(client.command("QUIT").await, 221);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_new_session_is_idle() {
        let db = Database::open_in_memory().await.unwrap();
        let (_client, server_end) = tokio::io::duplex(1024);
        let session = SmtpSession::new(server_end, "test", Arc::new(config()), db);

        assert_eq!(session.state(), SessionState::Idle);
    }
}
