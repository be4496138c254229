//! The structured email record produced by the parser.

use chrono::{DateTime, Utc};

use super::attachment::RawAttachment;

/// A parsed message, held in memory until a caller persists it.
///
/// Every field is best-effort: a message that could not be understood at all
/// still yields a record, usually with the whole input in `plain_text`.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Email {
    /// Raw `From` header value.
    pub from: String,

    /// Display part of `from`; the whole raw value when it has no `<…>` form.
    pub from_display_name: String,

    /// Address part of `from`; the whole raw value when it has no `<…>` form.
    pub from_address: String,

    /// Normalized `To` entries in header order. Empty entries are kept.
    pub to: Vec<String>,

    /// Normalized `Cc` entries in header order.
    pub cc: Vec<String>,

    /// Normalized `Bcc` entries in header order.
    pub bcc: Vec<String>,

    /// Raw `Subject` header value.
    pub subject: String,

    /// Trimmed text of the first plain-text body part.
    pub plain_text: String,

    /// Trimmed text of the first HTML body part. Not sanitized.
    pub formatted_text: String,

    /// `false` only when `X-SES-Spam-Verdict` is exactly `PASS`.
    pub is_spam: bool,

    /// `false` only when `X-SES-Virus-Verdict` is exactly `PASS`.
    pub is_virus: bool,

    /// `Date` header, or the parse time when it is missing or unparsable.
    pub received: DateTime<Utc>,

    /// Attachments in the order they were met in the MIME tree.
    pub attachments: Vec<RawAttachment>,
}

impl Email {
    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }
}
