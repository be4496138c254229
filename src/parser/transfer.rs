//! Content-Transfer-Encoding decoding with a hard per-part size cap.
//!
//! `base64` is decoded as a stream; `quoted-printable` is decoded a chunk at a
//! time up to the last complete line or escape; anything else passes through. Output is read in 1 KiB
//! chunks and stops at the cap without signalling truncation. A decode error
//! yields an empty result for that part only.

use std::io::{self, Read};

use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::read::DecoderReader;
use quoted_printable::ParseMode;
use tracing::{debug, trace};

/// Read granularity when accumulating a part.
const CHUNK_SIZE: usize = 1024;

/// Default per-part cap: 25 MiB.
pub const DEFAULT_MAX_PART_SIZE: usize = 25 * 1024 * 1024;

/// Standard alphabet, tolerant of missing padding and stray trailing bits.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &base64::alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Declared transfer encoding of a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// `7bit`, `8bit`, `binary`, unknown values, or no header at all.
    Identity,
    Base64,
    QuotedPrintable,
}

impl TransferEncoding {
    /// Classify a `Content-Transfer-Encoding` value (case-insensitive).
    pub fn from_header(value: &str) -> Self {
        let value = value.trim();
        if value.eq_ignore_ascii_case("base64") {
            Self::Base64
        } else if value.eq_ignore_ascii_case("quoted-printable") {
            Self::QuotedPrintable
        } else {
            Self::Identity
        }
    }
}

/// Undo `encoding` on everything `reader` yields, keeping at most `max_size`
/// decoded bytes.
///
/// Never fails: a corrupt stream produces an empty vector.
pub fn decode<R: Read>(reader: R, encoding: TransferEncoding, max_size: usize) -> Vec<u8> {
    let result = match encoding {
        TransferEncoding::Identity => read_capped(reader, max_size),
        TransferEncoding::Base64 => read_capped(
            DecoderReader::new(SkipWhitespace { inner: reader }, &LENIENT_BASE64),
            max_size,
        ),
        TransferEncoding::QuotedPrintable => decode_quoted_printable(reader, max_size),
    };

    match result {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(?encoding, error = %e, "Transfer decoding failed, dropping part content");
            Vec::new()
        }
    }
}

/// Accumulate `reader` in fixed-size chunks until EOF or `max_size` bytes.
fn read_capped<R: Read>(mut reader: R, max_size: usize) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; CHUNK_SIZE];

    while buf.len() < max_size {
        let want = CHUNK_SIZE.min(max_size - buf.len());
        let n = match reader.read(&mut chunk[..want]) {
            Ok(0) => return Ok(buf),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        buf.extend_from_slice(&chunk[..n]);
    }

    trace!(max_size, "Part reached the size cap");
    Ok(buf)
}

fn decode_quoted_printable<R: Read>(mut reader: R, max_size: usize) -> io::Result<Vec<u8>> {
    let mut decoded = Vec::new();
    let mut pending = Vec::new();
    let mut chunk = [0u8; CHUNK_SIZE];

    while decoded.len() < max_size {
        let n = match reader.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if n == 0 {
            decoded.extend(qp_decode(&pending)?);
            pending.clear();
            break;
        }
        pending.extend_from_slice(&chunk[..n]);
        let ready = qp_decodable_len(&pending);
        if ready > 0 {
            decoded.extend(qp_decode(&pending[..ready])?);
            pending.drain(..ready);
        }
    }

    if decoded.len() >= max_size {
        trace!(max_size, "Part reached the size cap");
    }
    decoded.truncate(max_size);
    Ok(decoded)
}

fn qp_decode(raw: &[u8]) -> io::Result<Vec<u8>> {
    quoted_printable::decode(raw, ParseMode::Robust)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
}

/// Length of the longest prefix of `buf` that decodes the same alone as it
/// does with more input after it.
///
/// That is everything through the last line break. Inside an unbroken line
/// it excludes trailing whitespace, which the decoder strips at line end,
/// and an unfinished `=` or `=X` escape.
fn qp_decodable_len(buf: &[u8]) -> usize {
    if let Some(pos) = buf.iter().rposition(|&b| b == b'\n') {
        return pos + 1;
    }
    let mut end = buf.len();
    loop {
        while end > 0 && buf[end - 1].is_ascii_whitespace() {
            end -= 1;
        }
        let tail = end.saturating_sub(2);
        match buf[tail..end].iter().position(|&b| b == b'=') {
            Some(i) => end = tail + i,
            None => return end,
        }
    }
}

/// Drops ASCII whitespace so line-wrapped base64 reaches the decoder as one run.
struct SkipWhitespace<R> {
    inner: R,
}

impl<R: Read> Read for SkipWhitespace<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let n = self.inner.read(buf)?;
            if n == 0 {
                return Ok(0);
            }
            let mut kept = 0;
            for i in 0..n {
                if !buf[i].is_ascii_whitespace() {
                    buf[kept] = buf[i];
                    kept += 1;
                }
            }
            if kept > 0 {
                return Ok(kept);
            }
        }
    }
}
