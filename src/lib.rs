//! `mailintake`: best-effort MIME ingestion.
//!
//! This crate turns raw internet-mail bytes into structured [`Email`] records
//! (envelope fields, first plain-text and HTML bodies, decoded attachments),
//! and provides the pipeline that moves messages from object storage into a
//! repository.
//!
//! ```
//! let raw = b"From: Alice <alice@example.com>\r\nSubject: Hi\r\n\r\n  hello  \r\n";
//! let email = mailintake::parse_email(raw);
//! assert_eq!(email.from_address, "alice@example.com");
//! assert_eq!(email.plain_text, "hello");
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod ingest;
pub mod model;
pub mod parser;
pub mod persist;
pub mod sanitize;
pub mod store;

pub use error::{IngestError, MimeError, Result};
pub use model::email::Email;
pub use parser::eml::{parse_email, MailParser, ParserOptions};
