//! Ingestion pipeline: pull raw messages out of object storage, parse them,
//! persist the records, and upload their attachments.
//!
//! Objects inside one mailbox are processed sequentially; separate mailboxes
//! run on their own threads via [`Ingestor::ingest_mailboxes`]. A message that
//! fails to fetch, parse, or persist is counted and left in place; the rest of
//! the mailbox carries on.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{IngestError, Result};
use crate::model::attachment::{RawAttachment, StoredAttachment};
use crate::model::email::Email;
use crate::parser::eml::MailParser;
use crate::persist::EmailRepository;
use crate::sanitize::Sanitizer;
use crate::store::ObjectStore;

/// Default key prefix for uploaded attachment objects.
pub const DEFAULT_ATTACHMENT_PREFIX: &str = "attachments/";

/// Outcome of one mailbox run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Objects found under the prefix.
    pub listed: usize,
    /// Messages persisted.
    pub stored: usize,
    /// Messages skipped after a fetch, read, or persistence failure.
    pub failed: usize,
    /// Attachments uploaded and recorded.
    pub attachments: usize,
}

/// Wires an object store, a repository, and an optional sanitizer around the parser.
pub struct Ingestor<'a> {
    store: &'a dyn ObjectStore,
    repository: &'a dyn EmailRepository,
    parser: MailParser,
    sanitizer: Option<&'a dyn Sanitizer>,
    attachment_prefix: String,
    delete_after_ingest: bool,
}

impl<'a> Ingestor<'a> {
    /// Default parser limits, no sanitizer, `attachments/` prefix, and
    /// deletion of ingested objects.
    pub fn new(store: &'a dyn ObjectStore, repository: &'a dyn EmailRepository) -> Self {
        Self {
            store,
            repository,
            parser: MailParser::default(),
            sanitizer: None,
            attachment_prefix: DEFAULT_ATTACHMENT_PREFIX.to_string(),
            delete_after_ingest: true,
        }
    }

    pub fn with_parser(mut self, parser: MailParser) -> Self {
        self.parser = parser;
        self
    }

    /// Run every HTML body through `sanitizer` before it is stored.
    pub fn with_sanitizer(mut self, sanitizer: &'a dyn Sanitizer) -> Self {
        self.sanitizer = Some(sanitizer);
        self
    }

    pub fn with_attachment_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.attachment_prefix = prefix.into();
        self
    }

    pub fn delete_after_ingest(mut self, delete: bool) -> Self {
        self.delete_after_ingest = delete;
        self
    }

    /// Ingest every object under `prefix`.
    ///
    /// Only a listing failure is returned as an error; per-message failures
    /// are logged and counted in the report.
    pub fn ingest_mailbox(&self, prefix: &str) -> Result<IngestReport> {
        let keys = self.store.list_objects(prefix)?;
        let mut report = IngestReport {
            listed: keys.len(),
            ..IngestReport::default()
        };

        for key in &keys {
            match self.ingest_object(key) {
                Ok(attachments) => {
                    report.stored += 1;
                    report.attachments += attachments;
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping message");
                    report.failed += 1;
                }
            }
        }

        info!(
            prefix,
            listed = report.listed,
            stored = report.stored,
            failed = report.failed,
            attachments = report.attachments,
            "Mailbox ingested"
        );
        Ok(report)
    }

    /// Ingest several mailboxes concurrently, one thread each.
    ///
    /// Results come back in the order of `prefixes`. `progress` is called with
    /// each prefix as its mailbox finishes.
    pub fn ingest_mailboxes<P>(
        &self,
        prefixes: &[P],
        progress: Option<&(dyn Fn(&str) + Sync)>,
    ) -> Vec<Result<IngestReport>>
    where
        P: AsRef<str> + Sync,
    {
        std::thread::scope(|scope| {
            let handles: Vec<_> = prefixes
                .iter()
                .map(|prefix| {
                    let prefix = prefix.as_ref();
                    let handle = scope.spawn(move || {
                        let result = self.ingest_mailbox(prefix);
                        if let Some(progress) = progress {
                            progress(prefix);
                        }
                        result
                    });
                    (prefix, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(prefix, handle)| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(IngestError::WorkerPanicked(prefix.to_string())))
                })
                .collect()
        })
    }

    /// Process one object; returns the number of attachments stored.
    fn ingest_object(&self, key: &str) -> Result<usize> {
        let reader = self.store.get_object(key)?;
        let mut email = self.parser.parse_reader(reader)?;

        if let Some(sanitizer) = self.sanitizer {
            if !email.formatted_text.is_empty() {
                email.formatted_text = sanitizer.sanitize(&email.formatted_text);
            }
        }

        let email_id = self.repository.create_email(&email)?;
        debug!(key, email_id, "Email stored");
        let attachments = self.store_attachments(email_id, &email);

        if self.delete_after_ingest {
            if let Err(e) = self.store.delete_object(key) {
                warn!(key, error = %e, "Could not delete ingested object");
            }
        }
        Ok(attachments)
    }

    fn store_attachments(&self, email_id: u64, email: &Email) -> usize {
        let mut stored = 0;
        for raw in &email.attachments {
            match self.store_attachment(email_id, raw) {
                Ok(()) => stored += 1,
                Err(e) => warn!(
                    email_id,
                    file_name = %raw.file_name,
                    error = %e,
                    "Attachment not stored"
                ),
            }
        }
        stored
    }

    /// Register, upload, then record the upload location.
    fn store_attachment(&self, email_id: u64, raw: &RawAttachment) -> Result<()> {
        let mut record = StoredAttachment::for_email(email_id, raw);
        record.id = self.repository.create_attachment(&record)?;

        let key = attachment_key(&self.attachment_prefix, email_id, record.id);
        self.store
            .put_object(&key, &raw.content_type, &raw.raw_bytes)?;

        record.file_path = key;
        self.repository.save_attachment(&record)
    }
}

/// `{prefix}{email_id}_attachment_{attachment_id}`
pub fn attachment_key(prefix: &str, email_id: u64, attachment_id: u64) -> String {
    format!("{prefix}{email_id}_attachment_{attachment_id}")
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::sync::Mutex;

    use super::*;
    use crate::persist::JsonRepository;
    use crate::sanitize::HtmlSanitizer;
    use crate::store::DirObjectStore;

    const HTML_MESSAGE: &[u8] = b"From: a@b.com\r\n\
Content-Type: text/html\r\n\
\r\n\
<p onclick=\"x()\">hi</p><script>bad()</script>\r\n";

    /// Wraps a real store and fails selected operations.
    struct FlakyStore {
        inner: DirObjectStore,
        fail_get: Vec<String>,
        fail_put: bool,
        fail_delete: bool,
        deleted: Mutex<Vec<String>>,
    }

    impl FlakyStore {
        fn new(inner: DirObjectStore) -> Self {
            Self {
                inner,
                fail_get: Vec::new(),
                fail_put: false,
                fail_delete: false,
                deleted: Mutex::new(Vec::new()),
            }
        }
    }

    impl ObjectStore for FlakyStore {
        fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
            self.inner.list_objects(prefix)
        }

        fn get_object(&self, key: &str) -> Result<Box<dyn Read + Send>> {
            if self.fail_get.iter().any(|k| k == key) {
                return Err(IngestError::ObjectNotFound(key.to_string()));
            }
            self.inner.get_object(key)
        }

        fn put_object(&self, key: &str, content_type: &str, data: &[u8]) -> Result<()> {
            if self.fail_put {
                return Err(IngestError::InvalidKey(key.to_string()));
            }
            self.inner.put_object(key, content_type, data)
        }

        fn delete_object(&self, key: &str) -> Result<()> {
            if self.fail_delete {
                return Err(IngestError::ObjectNotFound(key.to_string()));
            }
            self.deleted.lock().unwrap().push(key.to_string());
            self.inner.delete_object(key)
        }
    }

    fn attachment_message() -> &'static [u8] {
        b"From: a@b.com\r\n\
Content-Type: multipart/mixed; boundary=\"b1\"\r\n\
\r\n\
--b1\r\n\
Content-Type: text/plain\r\n\
\r\n\
see attached\r\n\
--b1\r\n\
Content-Type: application/octet-stream\r\n\
Content-Disposition: attachment; filename=\"data.bin\"\r\n\
\r\n\
payload\r\n\
--b1--\r\n"
    }

    #[test]
    fn test_attachment_key_format() {
        assert_eq!(attachment_key("attachments/", 12, 3), "attachments/12_attachment_3");
    }

    #[test]
    fn test_sanitizer_applied_to_html() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirObjectStore::new(tmp.path());
        store.put_object("u1/m1", "", HTML_MESSAGE).unwrap();
        let repo = JsonRepository::in_memory();
        let sanitizer = HtmlSanitizer::new();

        let report = Ingestor::new(&store, &repo)
            .with_sanitizer(&sanitizer)
            .ingest_mailbox("u1/")
            .unwrap();
        assert_eq!(report.stored, 1);

        let rows = repo.emails().unwrap();
        assert_eq!(rows[0].formatted_text, "<p>hi</p>");
    }

    #[test]
    fn test_without_sanitizer_html_is_verbatim() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirObjectStore::new(tmp.path());
        store.put_object("u1/m1", "", HTML_MESSAGE).unwrap();
        let repo = JsonRepository::in_memory();

        Ingestor::new(&store, &repo).ingest_mailbox("u1/").unwrap();
        assert!(repo.emails().unwrap()[0].formatted_text.contains("<script>"));
    }

    #[test]
    fn test_fetch_failure_skips_and_keeps_object() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DirObjectStore::new(tmp.path());
        dir.put_object("u1/bad", "", HTML_MESSAGE).unwrap();
        dir.put_object("u1/good", "", HTML_MESSAGE).unwrap();
        let mut store = FlakyStore::new(dir);
        store.fail_get.push("u1/bad".to_string());
        let repo = JsonRepository::in_memory();

        let report = Ingestor::new(&store, &repo).ingest_mailbox("u1/").unwrap();
        assert_eq!(
            report,
            IngestReport {
                listed: 2,
                stored: 1,
                failed: 1,
                attachments: 0
            }
        );
        assert_eq!(*store.deleted.lock().unwrap(), vec!["u1/good".to_string()]);
        assert_eq!(store.list_objects("u1/").unwrap(), vec!["u1/bad"]);
    }

    #[test]
    fn test_upload_failure_does_not_fail_message() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DirObjectStore::new(tmp.path());
        dir.put_object("u1/m1", "", attachment_message()).unwrap();
        let mut store = FlakyStore::new(dir);
        store.fail_put = true;
        let repo = JsonRepository::in_memory();

        let report = Ingestor::new(&store, &repo).ingest_mailbox("u1/").unwrap();
        assert_eq!(report.stored, 1);
        assert_eq!(report.attachments, 0);

        // Registered but never given a location.
        let rows = repo.attachments().unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].file_path.is_empty());
    }

    #[test]
    fn test_delete_failure_is_not_a_message_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DirObjectStore::new(tmp.path());
        dir.put_object("u1/m1", "", HTML_MESSAGE).unwrap();
        let mut store = FlakyStore::new(dir);
        store.fail_delete = true;
        let repo = JsonRepository::in_memory();

        let report = Ingestor::new(&store, &repo).ingest_mailbox("u1/").unwrap();
        assert_eq!(report.stored, 1);
        assert_eq!(report.failed, 0);
    }

    #[test]
    fn test_oversized_message_counts_as_failed() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirObjectStore::new(tmp.path());
        store.put_object("u1/m1", "", HTML_MESSAGE).unwrap();
        let repo = JsonRepository::in_memory();
        let parser = MailParser::new(crate::parser::eml::ParserOptions {
            max_part_size: 1024,
            max_message_size: 8,
        });

        let report = Ingestor::new(&store, &repo)
            .with_parser(parser)
            .ingest_mailbox("u1/")
            .unwrap();
        assert_eq!(report.failed, 1);
        assert!(repo.emails().unwrap().is_empty());
        assert_eq!(store.list_objects("u1/").unwrap().len(), 1);
    }

    #[test]
    fn test_mailboxes_report_in_input_order() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirObjectStore::new(tmp.path());
        store.put_object("u1/m1", "", HTML_MESSAGE).unwrap();
        store.put_object("u2/m1", "", HTML_MESSAGE).unwrap();
        store.put_object("u2/m2", "", attachment_message()).unwrap();
        let repo = JsonRepository::in_memory();
        let finished = Mutex::new(Vec::new());
        let progress = |prefix: &str| finished.lock().unwrap().push(prefix.to_string());

        let results = Ingestor::new(&store, &repo)
            .ingest_mailboxes(&["u2/", "u1/", "u3/"], Some(&progress));

        let reports: Vec<IngestReport> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(reports[0].stored, 2);
        assert_eq!(reports[0].attachments, 1);
        assert_eq!(reports[1].stored, 1);
        assert_eq!(reports[2], IngestReport::default());
        assert_eq!(finished.lock().unwrap().len(), 3);
        assert_eq!(repo.emails().unwrap().len(), 3);
    }
}
