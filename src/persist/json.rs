//! JSON-file repository.
//!
//! All rows live in memory behind a mutex. Every mutation is applied to a copy,
//! written to `repository.json` (temp file plus rename), and only then made
//! visible, so a failed write leaves both memory and disk unchanged.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{EmailRepository, EmailRow};
use crate::error::{IngestError, Result};
use crate::model::attachment::StoredAttachment;
use crate::model::email::Email;

/// File name inside the repository directory.
pub const REPOSITORY_FILE: &str = "repository.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RepositoryState {
    last_email_id: u64,
    last_attachment_id: u64,
    emails: Vec<EmailRow>,
    attachments: Vec<StoredAttachment>,
}

/// Whole-file JSON store.
///
/// Each `create_*`/`save_*` call clones the state and rewrites the entire
/// file, so a run of N messages with A attachments costs N + 2A full writes.
/// Fine for a single mailbox host; use a database-backed `EmailRepository`
/// for large archives.
pub struct JsonRepository {
    path: Option<PathBuf>,
    state: Mutex<RepositoryState>,
}

impl JsonRepository {
    /// Open (or create) the repository stored in `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| IngestError::io(dir, e))?;
        let path = dir.join(REPOSITORY_FILE);

        let state = if path.exists() {
            let data = fs::read(&path).map_err(|e| IngestError::io(&path, e))?;
            let state: RepositoryState = serde_json::from_slice(&data).map_err(|e| {
                IngestError::Persistence(format!("{}: {e}", path.display()))
            })?;
            info!(
                path = %path.display(),
                emails = state.emails.len(),
                "Loaded repository"
            );
            state
        } else {
            RepositoryState::default()
        };

        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    /// A repository that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(RepositoryState::default()),
        }
    }

    pub fn emails(&self) -> Result<Vec<EmailRow>> {
        Ok(self.lock()?.emails.clone())
    }

    pub fn email(&self, id: u64) -> Result<Option<EmailRow>> {
        Ok(self.lock()?.emails.iter().find(|e| e.id == id).cloned())
    }

    pub fn attachments(&self) -> Result<Vec<StoredAttachment>> {
        Ok(self.lock()?.attachments.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, RepositoryState>> {
        self.state
            .lock()
            .map_err(|_| IngestError::Persistence("repository lock poisoned".to_string()))
    }

    /// Apply `change` to a copy of the state, persist it, then publish it.
    fn commit<T>(&self, change: impl FnOnce(&mut RepositoryState) -> Result<T>) -> Result<T> {
        let mut guard = self.lock()?;
        let mut next = guard.clone();
        let out = change(&mut next)?;
        self.write(&next)?;
        *guard = next;
        Ok(out)
    }

    fn write(&self, state: &RepositoryState) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let data = serde_json::to_vec_pretty(state)
            .map_err(|e| IngestError::Persistence(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data).map_err(|e| IngestError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| IngestError::io(path, e))?;
        debug!(path = %path.display(), "Repository written");
        Ok(())
    }
}

impl EmailRepository for JsonRepository {
    fn create_email(&self, email: &Email) -> Result<u64> {
        self.commit(|state| {
            state.last_email_id += 1;
            let id = state.last_email_id;
            state.emails.push(EmailRow::from_email(id, email));
            Ok(id)
        })
    }

    fn create_attachment(&self, attachment: &StoredAttachment) -> Result<u64> {
        self.commit(|state| {
            if !state.emails.iter().any(|e| e.id == attachment.email_id) {
                return Err(IngestError::Persistence(format!(
                    "attachment refers to unknown email {}",
                    attachment.email_id
                )));
            }
            state.last_attachment_id += 1;
            let id = state.last_attachment_id;
            state.attachments.push(StoredAttachment {
                id,
                ..attachment.clone()
            });
            Ok(id)
        })
    }

    fn save_attachment(&self, attachment: &StoredAttachment) -> Result<()> {
        self.commit(|state| {
            let row = state
                .attachments
                .iter_mut()
                .find(|a| a.id == attachment.id)
                .ok_or_else(|| {
                    IngestError::Persistence(format!("unknown attachment {}", attachment.id))
                })?;
            *row = attachment.clone();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attachment::RawAttachment;

    fn sample_email() -> Email {
        Email {
            from: "Alice <alice@example.com>".into(),
            from_display_name: "Alice".into(),
            from_address: "alice@example.com".into(),
            to: vec!["bob@example.com".into()],
            cc: vec![String::new()],
            bcc: vec![String::new()],
            subject: "Hi".into(),
            plain_text: "hello".into(),
            ..Email::default()
        }
    }

    #[test]
    fn test_ids_start_at_one() {
        let repo = JsonRepository::in_memory();
        assert_eq!(repo.create_email(&sample_email()).unwrap(), 1);
        assert_eq!(repo.create_email(&sample_email()).unwrap(), 2);
    }

    #[test]
    fn test_attachment_lifecycle() {
        let repo = JsonRepository::in_memory();
        let email_id = repo.create_email(&sample_email()).unwrap();
        let raw = RawAttachment {
            content_type: "application/pdf".into(),
            file_name: "report.pdf".into(),
            raw_bytes: vec![1, 2, 3],
        };

        let mut stored = StoredAttachment::for_email(email_id, &raw);
        stored.id = repo.create_attachment(&stored).unwrap();
        assert_eq!(stored.id, 1);

        stored.file_path = "attachments/1_attachment_1".into();
        repo.save_attachment(&stored).unwrap();

        let rows = repo.attachments().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].file_path, "attachments/1_attachment_1");
        assert_eq!(rows[0].file_name, "report.pdf");
    }

    #[test]
    fn test_attachment_for_unknown_email_rejected() {
        let repo = JsonRepository::in_memory();
        let stored = StoredAttachment {
            email_id: 42,
            ..StoredAttachment::default()
        };
        assert!(matches!(
            repo.create_attachment(&stored),
            Err(IngestError::Persistence(_))
        ));
        assert!(repo.attachments().unwrap().is_empty());
    }

    #[test]
    fn test_save_unknown_attachment_rejected() {
        let repo = JsonRepository::in_memory();
        let stored = StoredAttachment {
            id: 7,
            ..StoredAttachment::default()
        };
        assert!(repo.save_attachment(&stored).is_err());
    }

    #[test]
    fn test_reopen_keeps_rows_and_counters() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let repo = JsonRepository::open(tmp.path()).unwrap();
            repo.create_email(&sample_email()).unwrap();
        }
        assert!(tmp.path().join(REPOSITORY_FILE).is_file());

        let repo = JsonRepository::open(tmp.path()).unwrap();
        let rows = repo.emails().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].from_addr, "alice@example.com");
        assert_eq!(rows[0].recipients.len(), 1);
        assert_eq!(repo.create_email(&sample_email()).unwrap(), 2);
    }

    #[test]
    fn test_failed_write_changes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = JsonRepository::open(tmp.path()).unwrap();
        assert_eq!(repo.create_email(&sample_email()).unwrap(), 1);

        // A directory squatting on the temp file makes the next write fail.
        let tmp_file = tmp.path().join(REPOSITORY_FILE).with_extension("json.tmp");
        fs::create_dir(&tmp_file).unwrap();
        assert!(matches!(
            repo.create_email(&sample_email()),
            Err(IngestError::Io { .. })
        ));
        assert_eq!(repo.emails().unwrap().len(), 1);

        fs::remove_dir(&tmp_file).unwrap();
        assert_eq!(repo.create_email(&sample_email()).unwrap(), 2);
        let reopened = JsonRepository::open(tmp.path()).unwrap();
        assert_eq!(reopened.emails().unwrap().len(), 2);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(REPOSITORY_FILE), b"{not json").unwrap();
        assert!(matches!(
            JsonRepository::open(tmp.path()),
            Err(IngestError::Persistence(_))
        ));
    }
}
