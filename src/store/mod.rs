//! Object storage holding raw messages and uploaded attachments.

pub mod dir;

use std::io::Read;

use crate::error::Result;

pub use dir::DirObjectStore;

/// Key/value blob storage addressed by `/`-separated keys.
///
/// Implementations must be shareable across the per-mailbox ingestion threads.
pub trait ObjectStore: Send + Sync {
    /// Keys starting with `prefix`, sorted.
    fn list_objects(&self, prefix: &str) -> Result<Vec<String>>;

    /// Open an object for reading.
    fn get_object(&self, key: &str) -> Result<Box<dyn Read + Send>>;

    /// Create or replace an object.
    fn put_object(&self, key: &str, content_type: &str, data: &[u8]) -> Result<()>;

    fn delete_object(&self, key: &str) -> Result<()>;
}
