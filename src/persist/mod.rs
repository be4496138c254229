//! Persistence of parsed emails and attachment metadata.
//!
//! The parser hands its [`Email`] to an [`EmailRepository`] verbatim; the
//! repository assigns identifiers and decides what is worth storing.

pub mod json;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::attachment::StoredAttachment;
use crate::model::email::Email;

pub use json::JsonRepository;

/// Recipient entries this short or shorter are never stored. This also drops
/// the single empty entry an absent header normalizes to.
const MAX_IGNORED_RECIPIENT_LEN: usize = 3;

/// Storage for parsed messages.
pub trait EmailRepository: Send + Sync {
    /// Store a message and its recipients; returns the new email id.
    fn create_email(&self, email: &Email) -> Result<u64>;

    /// Register attachment metadata for a stored email; returns the new id.
    fn create_attachment(&self, attachment: &StoredAttachment) -> Result<u64>;

    /// Update a registered attachment, typically to record its `file_path`.
    fn save_attachment(&self, attachment: &StoredAttachment) -> Result<()>;
}

/// Which header a recipient came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientKind {
    To,
    Cc,
    Bcc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub kind: RecipientKind,
    pub address: String,
}

/// A stored email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailRow {
    pub id: u64,
    pub from_display: String,
    pub from_addr: String,
    pub subject: String,
    pub plain_text: String,
    pub formatted_text: String,
    pub is_spam: bool,
    pub is_virus: bool,
    pub received: DateTime<Utc>,
    pub recipients: Vec<Recipient>,
}

impl EmailRow {
    pub fn from_email(id: u64, email: &Email) -> Self {
        let lists = [
            (RecipientKind::To, &email.to),
            (RecipientKind::Cc, &email.cc),
            (RecipientKind::Bcc, &email.bcc),
        ];
        let recipients = lists
            .into_iter()
            .flat_map(|(kind, list)| {
                list.iter()
                    .filter(|addr| addr.len() > MAX_IGNORED_RECIPIENT_LEN)
                    .map(move |addr| Recipient {
                        kind,
                        address: addr.clone(),
                    })
            })
            .collect();

        Self {
            id,
            from_display: email.from_display_name.clone(),
            from_addr: email.from_address.clone(),
            subject: email.subject.clone(),
            plain_text: email.plain_text.clone(),
            formatted_text: email.formatted_text.clone(),
            is_spam: email.is_spam,
            is_virus: email.is_virus,
            received: email.received,
            recipients,
        }
    }

    /// Addresses of one recipient kind, in header order.
    pub fn recipients_of(&self, kind: RecipientKind) -> Vec<&str> {
        self.recipients
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.address.as_str())
            .collect()
    }
}
