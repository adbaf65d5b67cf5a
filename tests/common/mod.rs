//! Test helpers for integration tests.
//!
//! Provides TestServer, which runs the listener on its own thread, runtime
//! and database handle (standing in for the separate listener process), and
//! SmtpTestClient, a raw line-level SMTP client.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::timeout;

use webmail::config::{ServerConfig, SubmissionConfig};
use webmail::{Database, SmtpServer};

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Listener configuration used by the integration tests.
pub fn test_server_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        hostname: "mail.test".to_string(),
        max_connections: 32,
        read_timeout_secs: 10,
        max_message_size: 64 * 1024,
        max_recipients: 10,
    }
}

/// A running listener backed by a temporary database file.
pub struct TestServer {
    addr: SocketAddr,
    db: Database,
    shutdown_tx: Option<oneshot::Sender<()>>,
    thread_handle: Option<thread::JoinHandle<()>>,
    _dir: TempDir,
}

impl TestServer {
    /// Start a listener with the default test configuration.
    pub async fn start() -> Self {
        Self::with_config(test_server_config()).await
    }

    /// Start a listener with a custom configuration.
    pub async fn with_config(config: ServerConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("inbox.db");

        // The front-end side: its own handle on the same file.
        let db = Database::open(&db_path).await.unwrap();

        let (addr_tx, addr_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server_path = db_path.clone();

        let thread_handle = thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("Failed to create runtime");

            rt.block_on(async move {
                let server_db = Database::open(&server_path)
                    .await
                    .expect("Failed to open database in server thread");
                let server = SmtpServer::bind(&config)
                    .await
                    .expect("Failed to bind test server");
                addr_tx
                    .send(server.local_addr().expect("No local address"))
                    .expect("Test dropped before server started");

                tokio::select! {
                    _ = server.serve(server_db.clone()) => {}
                    _ = shutdown_rx => {}
                }
                server_db.close().await;
            });
        });

        let addr = addr_rx
            .recv_timeout(DEFAULT_TIMEOUT)
            .expect("Server did not start");

        Self {
            addr,
            db,
            shutdown_tx: Some(shutdown_tx),
            thread_handle: Some(thread_handle),
            _dir: dir,
        }
    }

    /// Address the listener is bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The front-end's database handle.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Submission config pointing at this listener.
    pub fn submission_config(&self) -> SubmissionConfig {
        SubmissionConfig {
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            timeout_secs: 5,
        }
    }

    /// Open a raw SMTP connection and consume the greeting.
    pub async fn connect(&self) -> SmtpTestClient {
        let mut client = SmtpTestClient::connect(self.addr).await.unwrap();
        let (code, _) = client.reply().await.unwrap();
        assert_eq!(code, 220);
        client
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

/// Line-level SMTP client.
pub struct SmtpTestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl SmtpTestClient {
    /// Connect to the listener at the given address.
    pub async fn connect(addr: SocketAddr) -> Result<Self, std::io::Error> {
        let stream = TcpStream::connect(addr).await?;
        let (read, write) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read),
            writer: write,
        })
    }

    /// Send one line, appending CRLF.
    pub async fn send_line(&mut self, line: &str) -> Result<(), std::io::Error> {
        self.send_raw(line.as_bytes()).await?;
        self.send_raw(b"\r\n").await
    }

    /// Send raw bytes.
    pub async fn send_raw(&mut self, data: &[u8]) -> Result<(), std::io::Error> {
        self.writer.write_all(data).await?;
        self.writer.flush().await
    }

    /// Read one complete (possibly multi-line) reply.
    pub async fn reply(&mut self) -> Result<(u16, String), std::io::Error> {
        let mut text = String::new();
        loop {
            let mut line = String::new();
            let n = timeout(DEFAULT_TIMEOUT, self.reader.read_line(&mut line))
                .await
                .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "reply timeout"))??;
            if n == 0 || line.len() < 4 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("connection closed, partial reply: {text}{line}"),
                ));
            }
            text.push_str(&line);
            if line.as_bytes()[3] == b' ' {
                let code = line[..3].parse().map_err(|_| {
                    std::io::Error::new(std::io::ErrorKind::InvalidData, line.clone())
                })?;
                return Ok((code, text));
            }
        }
    }

    /// Send a command and return the reply code.
    pub async fn command(&mut self, line: &str) -> u16 {
        self.send_line(line).await.unwrap();
        self.reply().await.unwrap().0
    }

    /// Run a whole delivery and return the final reply code.
    pub async fn deliver(&mut self, sender: &str, recipients: &[&str], content: &str) -> u16 {
        assert_eq!(self.command(&format!("MAIL FROM:<{sender}>")).await, 250);
        for recipient in recipients {
            assert_eq!(self.command(&format!("RCPT TO:<{recipient}>")).await, 250);
        }
        assert_eq!(self.command("DATA").await, 354);
        for line in content.lines() {
            if line.starts_with('.') {
                self.send_raw(b".").await.unwrap();
            }
            self.send_line(line).await.unwrap();
        }
        self.command(".").await
    }

    /// Whether the server has closed the connection.
    pub async fn is_closed(&mut self) -> bool {
        let mut line = String::new();
        matches!(
            timeout(DEFAULT_TIMEOUT, self.reader.read_line(&mut line)).await,
            Ok(Ok(0)) | Ok(Err(_))
        )
    }
}
