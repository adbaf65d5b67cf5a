//! Configuration module.

use serde::Deserialize;
use std::path::Path;

use crate::{Result, WebmailError};

/// Mail transfer listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Host name announced in the greeting and HELO/EHLO replies.
    #[serde(default = "default_hostname")]
    pub hostname: String,
    /// Sessions served at once; further clients wait in the backlog.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Per-line read timeout in seconds for stalled peers.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// Maximum accepted message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Maximum number of recipients per delivery.
    #[serde(default = "default_max_recipients")]
    pub max_recipients: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    1025
}

fn default_hostname() -> String {
    "localhost".to_string()
}

fn default_max_connections() -> usize {
    50
}

fn default_read_timeout() -> u64 {
    60
}

fn default_max_message_size() -> usize {
    10 * 1024 * 1024 // 10MB
}

fn default_max_recipients() -> usize {
    100
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            hostname: default_hostname(),
            max_connections: default_max_connections(),
            read_timeout_secs: default_read_timeout(),
            max_message_size: default_max_message_size(),
            max_recipients: default_max_recipients(),
        }
    }
}

/// `[database]`
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file shared with the front-end.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Maximum number of pooled connections held by this process.
    #[serde(default = "default_db_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    "data/inbox.db".to_string()
}

fn default_db_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_db_max_connections(),
        }
    }
}

/// Outbound submission configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionConfig {
    /// Host of the transfer listener (local or relay).
    #[serde(default = "default_submission_host")]
    pub host: String,
    /// Port of the transfer listener.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Connect and command timeout in seconds.
    #[serde(default = "default_submission_timeout")]
    pub timeout_secs: u64,
}

fn default_submission_host() -> String {
    "localhost".to_string()
}

fn default_submission_timeout() -> u64 {
    10
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            host: default_submission_host(),
            port: default_port(),
            timeout_secs: default_submission_timeout(),
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Opened for append.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/webmail.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Contents of `config.toml`. Every section and key is optional.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub submission: SubmissionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Read and parse a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(WebmailError::Io)?;
        Self::parse(&content)
    }

    /// [`Config::load`], then [`Config::apply_env_overrides`].
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| WebmailError::Config(format!("config parse error: {e}")))
    }

    /// Environment overrides:
    /// - `WEBMAIL_DATABASE_PATH`: database file shared by both processes
    /// - `WEBMAIL_SMTP_PORT`: listener port, also used as the submission port
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("WEBMAIL_DATABASE_PATH") {
            if !path.is_empty() {
                self.database.path = path;
            }
        }
        if let Ok(port) = std::env::var("WEBMAIL_SMTP_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
                self.submission.port = port;
            }
        }
    }

    /// Reject values the listener cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.max_connections == 0 {
            return Err(WebmailError::Config(
                "server.max_connections must be greater than 0".to_string(),
            ));
        }
        if self.server.max_recipients == 0 {
            return Err(WebmailError::Config(
                "server.max_recipients must be greater than 0".to_string(),
            ));
        }
        if self.server.max_message_size == 0 {
            return Err(WebmailError::Config(
                "server.max_message_size must be greater than 0".to_string(),
            ));
        }
        if self.server.read_timeout_secs == 0 {
            return Err(WebmailError::Config(
                "server.read_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(WebmailError::Config(
                "database.max_connections must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
