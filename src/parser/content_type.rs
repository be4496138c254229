//! `Content-Type` and `Content-Disposition` values (RFC 2045, RFC 2183, RFC 2231).
//!
//! Both headers share the `token[/token] *(; name=value)` grammar, so one
//! parser handles them. Any failure is reported as a [`MimeError`] and the
//! caller picks a fallback; nothing here aborts a parse.

use std::collections::HashMap;

use percent_encoding::percent_decode_str;
use tracing::trace;

use super::header::Headers;
use crate::error::MimeError;

/// Characters that terminate a token (RFC 2045 §5.1).
const TSPECIALS: &[u8] = b"()<>@,;:\\\"/[]?=";

/// How the walker should treat a part with this media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// `multipart/*`: descend.
    Multipart,
    /// `text/plain`.
    PlainText,
    /// `text/html`.
    Html,
    /// Any other `text/*`.
    Text,
    /// Everything else.
    Other,
}

/// A parsed media type with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    media_type: String,
    params: HashMap<String, String>,
}

impl ContentType {
    /// Lower-cased `type/subtype`.
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Parameter value by case-insensitive name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// The multipart `boundary` parameter, or `""` when missing.
    pub fn boundary(&self) -> &str {
        self.param("boundary").unwrap_or("")
    }

    pub fn kind(&self) -> MediaKind {
        let mt = self.media_type.as_str();
        if mt.starts_with("multipart/") {
            return MediaKind::Multipart;
        }
        match mt {
            "text/plain" => MediaKind::PlainText,
            "text/html" => MediaKind::Html,
            _ if mt.starts_with("text/") => MediaKind::Text,
            _ => MediaKind::Other,
        }
    }
}

/// Parse a `Content-Type` header value.
pub fn negotiate(value: &str) -> Result<ContentType, MimeError> {
    let (media_type, params) = parse_media_type(value)?;
    Ok(ContentType { media_type, params })
}

/// Filename declared by a part's `Content-Disposition`, without any directory
/// components. Empty when there is none or the header cannot be parsed.
pub fn disposition_filename(headers: &Headers) -> String {
    let disposition = headers.get("content-disposition");
    if disposition.is_empty() {
        return String::new();
    }
    match parse_media_type(disposition) {
        Ok((_, params)) => params
            .get("filename")
            .map(|name| base_name(name))
            .unwrap_or_default(),
        Err(e) => {
            trace!(error = %e, "Ignoring unparsable Content-Disposition");
            String::new()
        }
    }
}

/// Strip directory components (either separator style).
fn base_name(path: &str) -> String {
    path.trim_end_matches(|c| c == '/' || c == '\\')
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Split `type/subtype; a=b; c="d"` into a lower-cased media type and a
/// parameter map with lower-cased names.
pub fn parse_media_type(value: &str) -> Result<(String, HashMap<String, String>), MimeError> {
    let (base, mut rest) = match value.find(';') {
        Some(i) => (&value[..i], &value[i..]),
        None => (value, ""),
    };
    let media_type = base.trim().to_ascii_lowercase();
    check_media_type(&media_type)?;

    let mut params: HashMap<String, String> = HashMap::new();
    // RFC 2231 pieces (`name*`, `name*0`, `name*1*`), keyed by base name.
    let mut pieces: HashMap<String, HashMap<String, String>> = HashMap::new();

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        let Some((key, value, next)) = consume_param(rest) else {
            if rest.trim() == ";" {
                break;
            }
            return Err(MimeError::InvalidParameter(rest.trim().to_string()));
        };

        let target = match key.split_once('*') {
            Some((base, _)) => pieces.entry(base.to_string()).or_default(),
            None => &mut params,
        };
        if target.contains_key(&key) {
            return Err(MimeError::DuplicateParameter(key));
        }
        target.insert(key, value);
        rest = next;
    }

    for (name, parts) in pieces {
        if let Some(value) = join_pieces(&name, &parts) {
            params.insert(name, value);
        }
    }

    Ok((media_type, params))
}

fn check_media_type(media_type: &str) -> Result<(), MimeError> {
    let (main, rest) = consume_token(media_type);
    if main.is_empty() {
        return Err(if media_type.is_empty() {
            MimeError::NoMediaType
        } else {
            MimeError::InvalidMediaType(media_type.to_string())
        });
    }
    if rest.is_empty() {
        return Ok(());
    }
    let invalid = || MimeError::InvalidMediaType(media_type.to_string());
    let sub = rest.strip_prefix('/').ok_or_else(invalid)?;
    let (sub, rest) = consume_token(sub);
    if sub.is_empty() || !rest.is_empty() {
        return Err(invalid());
    }
    Ok(())
}

/// Reassemble an RFC 2231 parameter from its pieces.
fn join_pieces(name: &str, parts: &HashMap<String, String>) -> Option<String> {
    if let Some(encoded) = parts.get(&format!("{name}*")) {
        return decode_extended(encoded);
    }

    let mut joined = String::new();
    let mut found = false;
    for n in 0.. {
        let simple = format!("{name}*{n}");
        if let Some(value) = parts.get(&simple) {
            joined.push_str(value);
            found = true;
            continue;
        }
        let Some(value) = parts.get(&format!("{simple}*")) else {
            break;
        };
        found = true;
        if n == 0 {
            if let Some(decoded) = decode_extended(value) {
                joined.push_str(&decoded);
            }
        } else {
            joined.push_str(&percent_decode_str(value).decode_utf8_lossy());
        }
    }
    found.then_some(joined)
}

/// Decode `charset'language'percent-encoded`. Only UTF-8 and US-ASCII are
/// accepted; other charsets are not transcoded.
fn decode_extended(value: &str) -> Option<String> {
    let mut split = value.splitn(3, '\'');
    let charset = split.next()?.to_ascii_lowercase();
    let _language = split.next()?;
    let encoded = split.next()?;
    match charset.as_str() {
        "utf-8" | "us-ascii" => Some(percent_decode_str(encoded).decode_utf8_lossy().into_owned()),
        _ => None,
    }
}

/// `; name = value` with optional surrounding whitespace.
fn consume_param(s: &str) -> Option<(String, String, &str)> {
    let rest = s.trim_start().strip_prefix(';')?.trim_start();
    let (name, rest) = consume_token(rest);
    if name.is_empty() {
        return None;
    }
    let rest = rest.trim_start().strip_prefix('=')?.trim_start();
    let (value, rest) = consume_value(rest)?;
    Some((name.to_ascii_lowercase(), value, rest))
}

/// A token or a quoted string.
///
/// Inside quotes a backslash only escapes a tspecial; before anything else it
/// is kept literally, which preserves unescaped Windows paths in filenames.
fn consume_value(s: &str) -> Option<(String, &str)> {
    let Some(quoted) = s.strip_prefix('"') else {
        let (token, rest) = consume_token(s);
        return (!token.is_empty()).then(|| (token.to_string(), rest));
    };

    let mut value = String::new();
    let mut chars = quoted.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Some((value, &quoted[i + 1..])),
            '\\' => {
                let escaped = chars.peek().map(|&(_, n)| n).filter(|&n| is_tspecial(n));
                match escaped {
                    Some(n) => {
                        value.push(n);
                        chars.next();
                    }
                    None => value.push('\\'),
                }
            }
            '\r' | '\n' => return None,
            _ => value.push(c),
        }
    }
    None
}

fn is_tspecial(c: char) -> bool {
    c.is_ascii() && TSPECIALS.contains(&(c as u8))
}

fn consume_token(s: &str) -> (&str, &str) {
    let end = s.find(|c: char| !is_token_char(c)).unwrap_or(s.len());
    s.split_at(end)
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_graphic() && !is_tspecial(c)
}
