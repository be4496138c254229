//! Multipart bodies (RFC 2046): boundary framing and the tree walk that
//! sorts leaf parts into plain-text body, HTML body, or attachments.

use tracing::{debug, trace};

use super::content_type::{disposition_filename, negotiate, MediaKind};
use super::header::{next_line, split_header_block, Headers};
use super::transfer::{self, TransferEncoding};
use crate::error::MimeError;
use crate::model::attachment::RawAttachment;
use crate::model::email::Email;

/// One boundary-delimited part: its own headers and still-encoded body.
#[derive(Debug, Clone)]
pub struct Part<'a> {
    pub headers: Headers,
    pub body: &'a [u8],
}

impl Part<'_> {
    /// Filename from `Content-Disposition`, or `""`.
    pub fn file_name(&self) -> String {
        disposition_filename(&self.headers)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    /// Before the first delimiter.
    Preamble,
    /// Positioned at the first header line of the next part.
    Parts,
    /// Close delimiter seen, data exhausted, or a framing error.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimiter {
    Next,
    Close,
}

/// Iterates over the parts of a multipart body.
///
/// Yields `Err` at most once, after which iteration ends: a framing error
/// means nothing after it can be trusted.
#[derive(Debug)]
pub struct MultipartReader<'a> {
    data: &'a [u8],
    pos: usize,
    dash_boundary: Vec<u8>,
    state: ReaderState,
}

impl<'a> MultipartReader<'a> {
    pub fn new(data: &'a [u8], boundary: &str) -> Self {
        let mut dash_boundary = Vec::with_capacity(boundary.len() + 2);
        dash_boundary.extend_from_slice(b"--");
        dash_boundary.extend_from_slice(boundary.as_bytes());
        Self {
            data,
            pos: 0,
            dash_boundary,
            state: ReaderState::Preamble,
        }
    }

    fn fail(&mut self, error: MimeError) -> Option<Result<Part<'a>, MimeError>> {
        self.state = ReaderState::Done;
        Some(Err(error))
    }

    /// Skip the preamble up to the first delimiter line.
    fn skip_preamble(&mut self) {
        let mut cursor = self.pos;
        while let Some((line, next)) = next_line(self.data, cursor) {
            match self.delimiter(line) {
                Some(Delimiter::Next) => {
                    self.pos = next;
                    self.state = ReaderState::Parts;
                    return;
                }
                Some(Delimiter::Close) => break,
                None => cursor = next,
            }
        }
        self.state = ReaderState::Done;
    }

    /// Classify a line as `--boundary` or `--boundary--`, allowing trailing
    /// linear whitespace.
    fn delimiter(&self, line: &[u8]) -> Option<Delimiter> {
        let rest = line.strip_prefix(self.dash_boundary.as_slice())?;
        let (kind, tail) = match rest.strip_prefix(b"--") {
            Some(tail) => (Delimiter::Close, tail),
            None => (Delimiter::Next, rest),
        };
        tail.iter()
            .all(|&b| b == b' ' || b == b'\t')
            .then_some(kind)
    }
}

impl<'a> Iterator for MultipartReader<'a> {
    type Item = Result<Part<'a>, MimeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == ReaderState::Preamble {
            if self.dash_boundary.len() == 2 {
                return self.fail(MimeError::MissingBoundary);
            }
            self.skip_preamble();
        }
        if self.state == ReaderState::Done {
            return None;
        }

        let Some((header_block, body_start)) = split_header_block(self.data, self.pos) else {
            return self.fail(MimeError::UnterminatedHeader);
        };
        let headers = match Headers::parse(header_block) {
            Ok(headers) => headers,
            Err(e) => return self.fail(e),
        };

        let mut cursor = body_start;
        while let Some((line, next)) = next_line(self.data, cursor) {
            let Some(kind) = self.delimiter(line) else {
                cursor = next;
                continue;
            };
            // The line break before a delimiter belongs to the delimiter.
            let mut body_end = cursor;
            if body_end > body_start && self.data[body_end - 1] == b'\n' {
                body_end -= 1;
                if body_end > body_start && self.data[body_end - 1] == b'\r' {
                    body_end -= 1;
                }
            }
            self.pos = next;
            if kind == Delimiter::Close {
                self.state = ReaderState::Done;
            }
            return Some(Ok(Part {
                headers,
                body: &self.data[body_start..body_end],
            }));
        }

        self.fail(MimeError::UnterminatedPart)
    }
}

/// Walk a multipart body and fill `email` in place.
///
/// Nested `multipart/*` parts are descended with an explicit stack, so deep
/// nesting grows the heap rather than the call stack. A framing error ends
/// the walk of the multipart it occurred in; enclosing multiparts carry on.
pub fn walk(body: &[u8], boundary: &str, email: &mut Email, max_part_size: usize) {
    let mut stack = vec![MultipartReader::new(body, boundary)];

    while let Some(reader) = stack.last_mut() {
        let part = match reader.next() {
            Some(Ok(part)) => part,
            Some(Err(e)) => {
                debug!(error = %e, depth = stack.len(), "Stopping multipart walk");
                stack.pop();
                continue;
            }
            None => {
                stack.pop();
                continue;
            }
        };

        let file_name = part.file_name();
        let is_body = file_name.is_empty();

        let content_type = match negotiate(part.headers.get("content-type")) {
            Ok(ct) => ct,
            Err(e) => {
                trace!(error = %e, "Part without usable Content-Type, reading as plain text");
                set_plain_text(email, part.body, &part.headers, max_part_size);
                continue;
            }
        };

        match content_type.kind() {
            MediaKind::Multipart => {
                trace!(media_type = content_type.media_type(), "Descending into nested multipart");
                stack.push(MultipartReader::new(part.body, content_type.boundary()));
            }
            MediaKind::PlainText if is_body => {
                set_plain_text(email, part.body, &part.headers, max_part_size);
            }
            MediaKind::Html if is_body => {
                set_formatted_text(email, part.body, &part.headers, max_part_size);
            }
            _ => {
                trace!(
                    media_type = content_type.media_type(),
                    file_name = %file_name,
                    "Collecting attachment"
                );
                email.attachments.push(RawAttachment {
                    content_type: content_type.media_type().to_string(),
                    file_name,
                    raw_bytes: decode_part(part.body, &part.headers, max_part_size),
                });
            }
        }
    }
}

/// Undo the part's declared transfer encoding.
pub(crate) fn decode_part(body: &[u8], headers: &Headers, max_part_size: usize) -> Vec<u8> {
    let encoding = TransferEncoding::from_header(headers.get("content-transfer-encoding"));
    transfer::decode(body, encoding, max_part_size)
}

fn decode_text(body: &[u8], headers: &Headers, max_part_size: usize) -> String {
    String::from_utf8_lossy(&decode_part(body, headers, max_part_size))
        .trim()
        .to_string()
}

/// Fill `plain_text` unless an earlier part already did.
pub(crate) fn set_plain_text(email: &mut Email, body: &[u8], headers: &Headers, max: usize) {
    if email.plain_text.is_empty() {
        email.plain_text = decode_text(body, headers, max);
    } else {
        trace!("Dropping additional plain-text part");
    }
}

/// Fill `formatted_text` unless an earlier part already did.
pub(crate) fn set_formatted_text(email: &mut Email, body: &[u8], headers: &Headers, max: usize) {
    if email.formatted_text.is_empty() {
        email.formatted_text = decode_text(body, headers, max);
    } else {
        trace!("Dropping additional HTML part");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::transfer::DEFAULT_MAX_PART_SIZE;

    fn parts<'a>(data: &'a [u8], boundary: &str) -> Vec<Result<Part<'a>, MimeError>> {
        MultipartReader::new(data, boundary).collect()
    }

    fn walked(body: &str, boundary: &str) -> Email {
        let mut email = Email::default();
        walk(body.as_bytes(), boundary, &mut email, DEFAULT_MAX_PART_SIZE);
        email
    }

    #[test]
    fn test_reader_skips_preamble_and_epilogue() {
        let data = b"preamble\r\n--b\r\nContent-Type: text/plain\r\n\r\none\r\n--b\r\n\r\ntwo\r\n--b--\r\nepilogue\r\n";
        let parts = parts(data, "b");
        assert_eq!(parts.len(), 2);
        let first = parts[0].as_ref().unwrap();
        assert_eq!(first.headers.get("content-type"), "text/plain");
        assert_eq!(first.body, b"one");
        let second = parts[1].as_ref().unwrap();
        assert!(second.headers.is_empty());
        assert_eq!(second.body, b"two");
    }

    #[test]
    fn test_reader_lf_and_trailing_whitespace_on_delimiter() {
        let data = b"--b  \n\nline 1\nline 2\n\n--b-- \t\n";
        let parts = parts(data, "b");
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].as_ref().unwrap().body, b"line 1\nline 2\n");
    }

    #[test]
    fn test_reader_empty_body() {
        let data = b"--b\n\n--b--\n";
        let parts = parts(data, "b");
        assert_eq!(parts[0].as_ref().unwrap().body, b"");
    }

    #[test]
    fn test_reader_ignores_longer_boundary_lookalikes() {
        let data = b"--b\n\n--bb is not a delimiter\n--b--\n";
        let parts = parts(data, "b");
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].as_ref().unwrap().body, b"--bb is not a delimiter");
    }

    #[test]
    fn test_reader_without_any_delimiter() {
        assert!(parts(b"just text\n", "b").is_empty());
    }

    #[test]
    fn test_reader_missing_boundary() {
        let parts = parts(b"--\n\nx\n----\n", "");
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].as_ref().unwrap_err(), &MimeError::MissingBoundary);
    }

    #[test]
    fn test_reader_unterminated_part_stops() {
        let data = b"--b\n\nfirst\n--b\n\nsecond without close\n";
        let parts = parts(data, "b");
        assert_eq!(parts.len(), 2);
        assert!(parts[0].is_ok());
        assert_eq!(parts[1].as_ref().unwrap_err(), &MimeError::UnterminatedPart);
    }

    #[test]
    fn test_reader_malformed_part_header_stops() {
        let data = b"--b\nno colon here\n\nbody\n--b\n\nlater\n--b--\n";
        let parts = parts(data, "b");
        assert_eq!(parts.len(), 1);
        assert!(matches!(parts[0], Err(MimeError::MalformedHeader(_))));
    }

    #[test]
    fn test_walk_first_plain_and_html_win() {
        let body = "--b\n\
Content-Type: text/plain\n\n  first plain  \n\
--b\n\
Content-Type: text/html\n\n<p>first</p>\n\
--b\n\
Content-Type: text/plain\n\nsecond plain\n\
--b\n\
Content-Type: text/html\n\n<p>second</p>\n\
--b--\n";
        let email = walked(body, "b");
        assert_eq!(email.plain_text, "first plain");
        assert_eq!(email.formatted_text, "<p>first</p>");
        assert!(email.attachments.is_empty());
    }

    #[test]
    fn test_walk_attachment_classification() {
        let body = "--b\n\
Content-Type: text/plain\n\
Content-Disposition: attachment; filename=notes.txt\n\n\
attached text\n\
--b\n\
Content-Type: image/png\n\n\
PNGDATA\n\
--b\n\
Content-Type: text/csv\n\n\
a,b\n\
--b--\n";
        let email = walked(body, "b");
        assert_eq!(email.plain_text, "");
        let summary: Vec<(&str, &str, &[u8])> = email
            .attachments
            .iter()
            .map(|a| (a.content_type.as_str(), a.file_name.as_str(), a.raw_bytes.as_slice()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("text/plain", "notes.txt", &b"attached text"[..]),
                ("image/png", "", &b"PNGDATA"[..]),
                ("text/csv", "", &b"a,b"[..]),
            ]
        );
    }

    #[test]
    fn test_walk_part_without_content_type_is_plain_text() {
        let email = walked("--b\n\n  untyped body \n--b--\n", "b");
        assert_eq!(email.plain_text, "untyped body");
    }

    #[test]
    fn test_walk_nested_error_only_ends_inner_subtree() {
        let body = "--outer\n\
Content-Type: multipart/alternative; boundary=inner\n\n\
--inner\n\
Content-Type: text/plain\n\n\
inner text\n\
--inner\n\
broken header line\n\n\
lost\n\
--inner--\n\
--outer\n\
Content-Type: application/pdf\n\
Content-Disposition: attachment; filename=doc.pdf\n\n\
PDF\n\
--outer--\n";
        let email = walked(body, "outer");
        assert_eq!(email.plain_text, "inner text");
        assert_eq!(email.attachments.len(), 1);
        assert_eq!(email.attachments[0].file_name, "doc.pdf");
    }

    #[test]
    fn test_walk_deep_nesting_does_not_recurse() {
        let depth = 500;
        let mut body = String::new();
        for level in 0..depth {
            body.push_str(&format!(
                "--b{level}\nContent-Type: multipart/mixed; boundary=b{}\n\n",
                level + 1
            ));
        }
        body.push_str(&format!("--b{depth}\nContent-Type: text/plain\n\ndeep\n--b{depth}--\n"));
        for level in (0..depth).rev() {
            body.push_str(&format!("--b{level}--\n"));
        }
        let email = walked(&body, "b0");
        assert_eq!(email.plain_text, "deep");
    }
}
