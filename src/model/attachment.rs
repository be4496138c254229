//! Attachment records.
//!
//! The parser produces [`RawAttachment`]s, which carry decoded bytes but no
//! identity. A persistence collaborator turns them into [`StoredAttachment`]s
//! once it has assigned an id and the bytes have been uploaded somewhere.

/// An attachment as found in the message, not yet saved anywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RawAttachment {
    /// Lower-cased media type without parameters (e.g. `"application/pdf"`).
    pub content_type: String,

    /// Filename from `Content-Disposition`, without directory components.
    /// Empty for parts that carried none.
    pub file_name: String,

    /// Decoded content, cut at the per-part size cap.
    #[serde(skip)]
    pub raw_bytes: Vec<u8>,
}

impl RawAttachment {
    /// Decoded size in bytes.
    pub fn size(&self) -> usize {
        self.raw_bytes.len()
    }
}

/// Attachment metadata after persistence.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StoredAttachment {
    /// Identifier assigned by the repository; `0` until created.
    pub id: u64,
    /// Owning email.
    pub email_id: u64,
    pub content_type: String,
    pub file_name: String,
    /// Object-store key holding the bytes. Empty until uploaded.
    pub file_path: String,
}

impl StoredAttachment {
    /// Prepare an unsaved record for `email_id` from a parsed attachment.
    pub fn for_email(email_id: u64, raw: &RawAttachment) -> Self {
        Self {
            id: 0,
            email_id,
            content_type: raw.content_type.clone(),
            file_name: raw.file_name.clone(),
            file_path: String::new(),
        }
    }
}
