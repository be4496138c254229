//! RFC 5322 header blocks: framing, unfolding, case-insensitive lookup, and
//! `Date` parsing.
//!
//! The same [`Headers`] type serves the message envelope and every MIME part,
//! so lookups behave identically at both levels.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::MimeError;

/// Case-insensitive view over one header block.
///
/// Names are stored lower-cased, values trimmed and unfolded. Lookups return
/// the first occurrence, or an empty string when the header is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Parse a header block (everything before the blank line, no terminator needed).
    ///
    /// Continuation lines (starting with space or tab) are joined to the
    /// previous header with a single space. A line without a colon, a header
    /// name that is empty or contains non-visible characters, or a block that
    /// starts with a continuation line is rejected as malformed.
    pub fn parse(block: &[u8]) -> Result<Self, MimeError> {
        let text = decode_header_bytes(block);
        let mut entries: Vec<(String, String)> = Vec::new();

        for line in text.lines() {
            if line.is_empty() {
                continue;
            }
            if line.starts_with(|c| c == ' ' || c == '\t') {
                let last = entries
                    .last_mut()
                    .ok_or_else(|| MimeError::MalformedHeader(line.to_string()))?;
                let continuation = line.trim();
                if !continuation.is_empty() {
                    if !last.1.is_empty() {
                        last.1.push(' ');
                    }
                    last.1.push_str(continuation);
                }
                continue;
            }

            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| MimeError::MalformedHeader(line.to_string()))?;
            let name = name.trim_end();
            if name.is_empty() || !name.bytes().all(|b| b.is_ascii_graphic()) {
                return Err(MimeError::MalformedHeader(line.to_string()));
            }
            entries.push((name.to_ascii_lowercase(), value.trim().to_string()));
        }

        Ok(Self { entries })
    }

    /// First value of `name` (case-insensitive), or `""` when absent.
    pub fn get(&self, name: &str) -> &str {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Return the line starting at `pos` without its terminator, and the offset of
/// the next line. Accepts both LF and CRLF endings; the last line may be
/// unterminated.
pub(crate) fn next_line(data: &[u8], pos: usize) -> Option<(&[u8], usize)> {
    if pos >= data.len() {
        return None;
    }
    let rest = &data[pos..];
    let (line, next) = match rest.iter().position(|&b| b == b'\n') {
        Some(i) => (&rest[..i], pos + i + 1),
        None => (rest, data.len()),
    };
    Some((line.strip_suffix(b"\r").unwrap_or(line), next))
}

/// Locate the header block starting at `pos`.
///
/// Returns the raw header bytes (without the blank line) and the offset where
/// the body begins, or `None` when no blank line follows.
pub(crate) fn split_header_block(data: &[u8], pos: usize) -> Option<(&[u8], usize)> {
    let mut cursor = pos;
    while let Some((line, next)) = next_line(data, cursor) {
        if line.is_empty() {
            return Some((&data[pos..cursor], next));
        }
        cursor = next;
    }
    None
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
fn decode_header_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Parse an RFC 5322 date-time such as `"Mon, 2 Jan 2006 15:04:05 -0700"`.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    match DateTime::parse_from_rfc2822(trimmed) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) => {
            debug!(date = trimmed, error = %e, "Could not parse date");
            None
        }
    }
}
