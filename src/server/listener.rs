//! TCP listener for the SMTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use super::session::SmtpSession;
use crate::config::ServerConfig;
use crate::db::Database;
use crate::{Result, WebmailError};

/// The mail transfer listener.
pub struct SmtpServer {
    listener: TcpListener,
    semaphore: Arc<Semaphore>,
    config: Arc<ServerConfig>,
}

impl SmtpServer {
    /// Bind to `host:port` from the config.
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;

        info!(addr = %local_addr, "SMTP listener bound");

        Ok(Self {
            listener,
            semaphore: Arc::new(Semaphore::new(config.max_connections)),
            config: Arc::new(config.clone()),
        })
    }

    /// Address actually bound; useful when the configured port is 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Configured session limit.
    pub fn max_connections(&self) -> usize {
        self.config.max_connections
    }

    /// Sessions that could still start right now.
    pub fn available_connections(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Sessions currently running.
    pub fn active_connections(&self) -> usize {
        self.max_connections() - self.available_connections()
    }

    /// Wait for a free session slot, then for the next client.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit)> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| WebmailError::Io(std::io::Error::other("connection slots closed")))?;

        let (stream, peer) = self.listener.accept().await?;
        debug!(peer = %peer, "Accepted connection");

        Ok((stream, peer, ConnectionPermit { _permit: permit }))
    }

    /// Accept clients forever, one [`SmtpSession`] task each, delivering
    /// into `db`.
    ///
    /// Accept errors are logged and do not stop the loop.
    pub async fn serve(self, db: Database) -> Result<()> {
        loop {
            let (stream, peer, permit) = match self.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    continue;
                }
            };

            let config = Arc::clone(&self.config);
            let db = db.clone();
            tokio::spawn(async move {
                info!(peer = %peer, "SMTP connection opened");
                let mut session = SmtpSession::new(stream, peer.to_string(), config, db);
                if let Err(e) = session.run().await {
                    error!(peer = %peer, error = %e, "SMTP session failed");
                }
                debug!(peer = %peer, "SMTP connection closed");
                drop(permit);
            });
        }
    }
}

/// Holds one session slot until dropped.
pub struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}
