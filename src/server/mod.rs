//! SMTP server module.
//!
//! This module provides the TCP listener, the per-connection session and
//! the command/reply codec for the mail transfer listener.

mod listener;
pub mod protocol;
mod session;

pub use listener::{ConnectionPermit, SmtpServer};
pub use protocol::{extract_path, Command, Reply};
pub use session::{SessionState, SmtpSession};
