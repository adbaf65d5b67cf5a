//! SMTP command parsing and reply formatting.
//!
//! Only the subset the listener speaks: HELO, EHLO, MAIL, RCPT, DATA, RSET,
//! NOOP and QUIT.

use std::fmt;

/// A parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `HELO <domain>`
    Helo(String),
    /// `EHLO <domain>`
    Ehlo(String),
    /// `MAIL FROM:<path> [params]`, with the path extracted. Empty for `<>`.
    Mail(String),
    /// `RCPT TO:<path> [params]`, with the path extracted.
    Rcpt(String),
    /// `DATA`
    Data,
    /// `RSET`
    Rset,
    /// `NOOP`
    Noop,
    /// `QUIT`
    Quit,
    /// A known verb with arguments that do not parse.
    Malformed(&'static str),
    /// Anything else.
    Unknown(String),
}

impl Command {
    /// Parse one command line (line terminator already removed).
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let (verb, rest) = match line.find(' ') {
            Some(idx) => (&line[..idx], line[idx + 1..].trim()),
            None => (line, ""),
        };

        match verb.to_ascii_uppercase().as_str() {
            "HELO" => Self::Helo(rest.to_string()),
            "EHLO" => Self::Ehlo(rest.to_string()),
            "MAIL" => match strip_keyword(rest, "FROM:").and_then(extract_path) {
                Some(path) => Self::Mail(path),
                None => Self::Malformed("MAIL"),
            },
            "RCPT" => match strip_keyword(rest, "TO:").and_then(extract_path) {
                Some(path) => Self::Rcpt(path),
                None => Self::Malformed("RCPT"),
            },
            "DATA" => Self::Data,
            "RSET" => Self::Rset,
            "NOOP" => Self::Noop,
            "QUIT" => Self::Quit,
            _ => Self::Unknown(line.to_string()),
        }
    }
}

fn strip_keyword<'a>(arg: &'a str, keyword: &str) -> Option<&'a str> {
    let head = arg.get(..keyword.len())?;
    if head.eq_ignore_ascii_case(keyword) {
        Some(arg[keyword.len()..].trim_start())
    } else {
        None
    }
}

/// Extract the address from a forward or reverse path.
///
/// Accepts `<addr> PARAMS`, `<>` and a bare `addr`. Trailing ESMTP
/// parameters such as `BODY=8BITMIME` or `SIZE=123` are ignored.
pub fn extract_path(arg: &str) -> Option<String> {
    let arg = arg.trim();
    if let Some(inner) = arg.strip_prefix('<') {
        let end = inner.find('>')?;
        Some(inner[..end].trim().to_string())
    } else {
        arg.split_whitespace().next().map(str::to_string)
    }
}

/// A server reply, possibly spanning several lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    code: u16,
    lines: Vec<String>,
}

impl Reply {
    /// A single-line reply.
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            lines: vec![text.into()],
        }
    }

    /// A multi-line reply, e.g. the EHLO capability list.
    pub fn multiline(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// `250 OK`
    pub fn ok() -> Self {
        Self::new(250, "OK")
    }

    /// The reply code.
    pub fn code(&self) -> u16 {
        self.code
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.lines.is_empty() {
            return write!(f, "{}\r\n", self.code);
        }
        let last = self.lines.len() - 1;
        for (i, line) in self.lines.iter().enumerate() {
            let sep = if i == last { ' ' } else { '-' };
            write!(f, "{}{}{}\r\n", self.code, sep, line)?;
        }
        Ok(())
    }
}
