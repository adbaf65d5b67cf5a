//! Inbound message parser.
//!
//! Turns the raw content block of a delivery into a subject and a
//! plain-text body. Pure: no I/O, no store access.

use encoding_rs::{Encoding, UTF_8};
use mailparse::{MailHeaderMap, ParsedMail};

use crate::Result;

/// Subject and body extracted from a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedMessage {
    /// Decoded `Subject` header, empty when absent.
    pub subject: String,
    /// Decoded plain-text body.
    pub body: String,
}

/// One leaf part of a message. The payload is decoded on demand, so
/// parts that are never selected cost nothing and cannot fail the parse.
#[derive(Debug, Clone)]
pub struct BodyPart<'a> {
    /// Lower-cased MIME type, e.g. `text/plain`.
    pub content_type: String,
    /// Declared charset, if any.
    pub charset: Option<String>,
    source: &'a ParsedMail<'a>,
}

impl<'a> BodyPart<'a> {
    fn from_mail(mail: &'a ParsedMail<'a>) -> Self {
        Self {
            content_type: mail.ctype.mimetype.to_ascii_lowercase(),
            charset: mail.ctype.params.get("charset").cloned(),
            source: mail,
        }
    }

    /// Whether this part is declared as plain text.
    pub fn is_plain_text(&self) -> bool {
        self.content_type == "text/plain"
    }

    /// Payload octets with the transfer encoding removed.
    pub fn payload(&self) -> Result<Vec<u8>> {
        Ok(self.source.get_body_raw()?)
    }

    /// Decode the payload with the declared charset.
    pub fn decode(&self) -> Result<String> {
        Ok(decode_payload(&self.payload()?, self.charset.as_deref()))
    }
}

/// Message content: a single body or the leaf parts of a multipart tree.
#[derive(Debug, Clone)]
pub enum MessageContent<'a> {
    /// Non-multipart message.
    Plain(BodyPart<'a>),
    /// Multipart message, leaves in depth-first order.
    Multipart(Vec<BodyPart<'a>>),
}

impl<'a> MessageContent<'a> {
    /// Classify a parsed message.
    ///
    /// A `multipart/*` declaration without any parts (say, no boundary)
    /// is treated as a plain body.
    pub fn from_mail(mail: &'a ParsedMail<'a>) -> Self {
        let multipart = mail.ctype.mimetype.to_ascii_lowercase().starts_with("multipart/");
        if multipart && !mail.subparts.is_empty() {
            let mut parts = Vec::new();
            collect_leaves(mail, &mut parts);
            Self::Multipart(parts)
        } else {
            Self::Plain(BodyPart::from_mail(mail))
        }
    }

    /// Extract the text body.
    ///
    /// A plain message decodes whole, whatever its declared type. A
    /// multipart message yields its first `text/plain` leaf, or an empty
    /// string when it has none. Only the selected part is decoded; a broken
    /// transfer encoding there is an error.
    pub fn text_body(&self) -> Result<String> {
        let text = match self {
            Self::Plain(part) => part.decode()?,
            Self::Multipart(parts) => match parts.iter().find(|p| p.is_plain_text()) {
                Some(part) => part.decode()?,
                None => String::new(),
            },
        };
        Ok(text.trim_end_matches(['\r', '\n']).to_string())
    }
}

fn collect_leaves<'a>(mail: &'a ParsedMail<'a>, out: &mut Vec<BodyPart<'a>>) {
    for sub in &mail.subparts {
        if sub.subparts.is_empty() {
            out.push(BodyPart::from_mail(sub));
        } else {
            collect_leaves(sub, out);
        }
    }
}

/// Decode octets with a charset label, falling back to UTF-8.
///
/// Never fails: invalid sequences become U+FFFD.
pub fn decode_payload(payload: &[u8], charset: Option<&str>) -> String {
    let encoding = charset
        .and_then(|label| Encoding::for_label(label.trim().as_bytes()))
        .unwrap_or(UTF_8);
    let (text, _had_errors) = encoding.decode_without_bom_handling(payload);
    text.into_owned()
}

/// Parse a raw message into subject and body.
///
/// Fails only when the MIME structure cannot be read or the selected text
/// part has a transfer encoding that does not decode.
pub fn parse_message(raw: &[u8]) -> Result<ParsedMessage> {
    let mail = mailparse::parse_mail(raw)?;
    let subject = mail
        .get_headers()
        .get_first_value("Subject")
        .unwrap_or_default();
    let body = MessageContent::from_mail(&mail).text_body()?;

    Ok(ParsedMessage { subject, body })
}
