//! Parser for a single raw internet message (RFC 5322 headers plus an optional
//! MIME body) into an [`Email`] record.
//!
//! Parsing is best-effort: malformed envelopes, unparsable dates or media
//! types, and corrupt encodings all fall back to something usable. The only
//! hard error is failing to read the message from a stream at all.

use std::io::Read;

use chrono::Utc;
use tracing::debug;

use super::content_type::{negotiate, MediaKind};
use super::header::{parse_date, split_header_block, Headers};
use super::mime::{self, set_formatted_text, set_plain_text};
use super::transfer::DEFAULT_MAX_PART_SIZE;
use crate::error::{IngestError, Result};
use crate::model::address::{normalize_list, AddressPair};
use crate::model::email::Email;

/// Default cap on a whole raw message read from a stream: 256 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;

/// Verdict value that clears the spam and virus flags. Anything else,
/// including a missing header, leaves them set.
const VERDICT_PASS: &str = "PASS";

/// Limits applied while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserOptions {
    /// Decoded bytes kept per body part; the rest is silently dropped.
    pub max_part_size: usize,
    /// Largest raw message [`MailParser::parse_reader`] accepts.
    pub max_message_size: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            max_part_size: DEFAULT_MAX_PART_SIZE,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// Stateless message parser. Cheap to clone and safe to share between threads.
#[derive(Debug, Clone, Default)]
pub struct MailParser {
    options: ParserOptions,
}

impl MailParser {
    pub fn new(options: ParserOptions) -> Self {
        Self { options }
    }

    /// Read a whole message from `reader` and parse it.
    ///
    /// Fails only when the stream cannot be read or the message exceeds
    /// `max_message_size`.
    pub fn parse_reader<R: Read>(&self, reader: R) -> Result<Email> {
        let limit = self.options.max_message_size;
        let mut raw = Vec::new();
        reader
            .take((limit as u64).saturating_add(1))
            .read_to_end(&mut raw)?;
        if raw.len() > limit {
            return Err(IngestError::MessageTooLarge { limit });
        }
        Ok(self.parse(&raw))
    }

    /// Parse a complete raw message.
    pub fn parse(&self, raw: &[u8]) -> Email {
        let data = skip_from_line(raw);
        let (headers, body) = split_envelope(data);

        let from = headers.get("from").to_string();
        let sender = AddressPair::parse(&from);

        let mut email = Email {
            from_display_name: sender.display_name,
            from_address: sender.address,
            from,
            to: normalize_list(headers.get("to")),
            cc: normalize_list(headers.get("cc")),
            bcc: normalize_list(headers.get("bcc")),
            subject: headers.get("subject").to_string(),
            is_spam: headers.get("x-ses-spam-verdict") != VERDICT_PASS,
            is_virus: headers.get("x-ses-virus-verdict") != VERDICT_PASS,
            received: parse_date(headers.get("date")).unwrap_or_else(Utc::now),
            ..Email::default()
        };

        self.parse_body(&headers, body, &mut email);
        email
    }

    fn parse_body(&self, headers: &Headers, body: &[u8], email: &mut Email) {
        let max = self.options.max_part_size;
        let raw_type = headers.get("content-type");

        let content_type = match negotiate(raw_type) {
            Ok(ct) => ct,
            Err(e) => {
                debug!(error = %e, "No usable top-level Content-Type, reading body as text");
                if raw_type == "text/html" {
                    set_formatted_text(email, body, headers, max);
                } else {
                    set_plain_text(email, body, headers, max);
                }
                return;
            }
        };

        match content_type.kind() {
            MediaKind::Multipart => mime::walk(body, content_type.boundary(), email, max),
            MediaKind::Html => set_formatted_text(email, body, headers, max),
            MediaKind::PlainText | MediaKind::Text => set_plain_text(email, body, headers, max),
            MediaKind::Other => debug!(
                media_type = content_type.media_type(),
                "Top-level media type carries no body text"
            ),
        }
    }
}

/// Parse a raw message with default limits.
pub fn parse_email(raw: &[u8]) -> Email {
    MailParser::default().parse(raw)
}

/// Split the envelope from the body.
///
/// Without a blank line, or with a header line that does not parse, the whole
/// input becomes the body and the header set is empty.
fn split_envelope(data: &[u8]) -> (Headers, &[u8]) {
    let Some((block, body_start)) = split_header_block(data, 0) else {
        debug!("No header/body boundary, treating the whole message as body");
        return (Headers::default(), data);
    };
    match Headers::parse(block) {
        Ok(headers) => (headers, &data[body_start..]),
        Err(e) => {
            debug!(error = %e, "Malformed envelope, treating the whole message as body");
            (Headers::default(), data)
        }
    }
}

/// Skip a UTF-8 BOM and a leading mbox `From ` separator line.
fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);

    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}
