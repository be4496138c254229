//! Centralized error types for mailintake.
//!
//! Two families live here. [`MimeError`] covers the recoverable conditions the
//! parser runs into on malformed mail; the parser turns every one of them into
//! a fallback and never hands them to its caller. [`IngestError`] covers the
//! hard failures of the surrounding pipeline: unreadable streams, storage and
//! persistence problems.

use std::path::PathBuf;
use thiserror::Error;

/// Recoverable conditions met while parsing a message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MimeError {
    /// A header line is neither `Name: value` nor a continuation of one.
    #[error("Malformed header line: {0:?}")]
    MalformedHeader(String),

    /// The header block ran to the end of the data without a blank line.
    #[error("Header block is not terminated by a blank line")]
    UnterminatedHeader,

    /// The `Content-Type` value is empty or missing.
    #[error("No media type")]
    NoMediaType,

    /// The media type does not follow the `type/subtype` grammar.
    #[error("Invalid media type: {0}")]
    InvalidMediaType(String),

    /// A `; name=value` parameter could not be parsed.
    #[error("Invalid media parameter: {0}")]
    InvalidParameter(String),

    /// The same parameter name appeared twice.
    #[error("Duplicate media parameter: {0}")]
    DuplicateParameter(String),

    /// A multipart body declared no usable boundary.
    #[error("Multipart body has no boundary parameter")]
    MissingBoundary,

    /// A multipart part was not closed by any boundary delimiter.
    #[error("Multipart part is not closed by a boundary delimiter")]
    UnterminatedPart,
}

/// All hard errors produced by the mailintake library.
#[derive(Error, Debug)]
pub enum IngestError {
    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The object store has no object under this key.
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// The key cannot be mapped onto the object store.
    #[error("Invalid object key: {0:?}")]
    InvalidKey(String),

    /// A raw message exceeded the configured size limit.
    #[error("Message exceeds the {limit}-byte size limit")]
    MessageTooLarge { limit: usize },

    /// The persistence collaborator rejected a record.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A mailbox worker thread panicked before reporting.
    #[error("Ingestion worker for '{0}' panicked")]
    WorkerPanicked(String),

    /// A parser condition surfaced by a caller that chose not to recover.
    #[error("MIME error: {0}")]
    Mime(#[from] MimeError),
}

/// Convenience alias for `Result<T, IngestError>`.
pub type Result<T> = std::result::Result<T, IngestError>;

impl IngestError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (streams handed in by a caller; prefer `IngestError::io` for files).
impl From<std::io::Error> for IngestError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<stream>"),
            source,
        }
    }
}
