//! Directory-backed object store: each key is a file path below a root.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use super::ObjectStore;
use crate::error::{IngestError, Result};

/// Stores objects as plain files. Key segments map onto subdirectories, which
/// are created on write and pruned again when they become empty.
#[derive(Debug, Clone)]
pub struct DirObjectStore {
    root: PathBuf,
}

impl DirObjectStore {
    /// The root does not have to exist yet.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        if !is_valid_key(key) {
            return Err(IngestError::InvalidKey(key.to_string()));
        }
        let mut path = self.root.clone();
        path.extend(key.split('/'));
        Ok(path)
    }

    /// Remove now-empty directories between `path` and the root.
    fn prune_parents(&self, path: &Path) {
        let mut dir = path.parent();
        while let Some(d) = dir {
            if d == self.root.as_path() || fs::remove_dir(d).is_err() {
                break;
            }
            dir = d.parent();
        }
    }
}

impl ObjectStore for DirObjectStore {
    fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        if self.root.is_dir() {
            collect_keys(&self.root, "", &mut keys)?;
        }
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        debug!(prefix, count = keys.len(), "Listed objects");
        Ok(keys)
    }

    fn get_object(&self, key: &str) -> Result<Box<dyn Read + Send>> {
        let path = self.object_path(key)?;
        match File::open(&path) {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(IngestError::ObjectNotFound(key.to_string()))
            }
            Err(e) => Err(IngestError::io(path, e)),
        }
    }

    fn put_object(&self, key: &str, content_type: &str, data: &[u8]) -> Result<()> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| IngestError::io(parent, e))?;
        }
        fs::write(&path, data).map_err(|e| IngestError::io(&path, e))?;
        trace!(key, content_type, size = data.len(), "Stored object");
        Ok(())
    }

    fn delete_object(&self, key: &str) -> Result<()> {
        let path = self.object_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                self.prune_parents(&path);
                trace!(key, "Deleted object");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(IngestError::ObjectNotFound(key.to_string()))
            }
            Err(e) => Err(IngestError::io(path, e)),
        }
    }
}

/// Keys are non-empty, relative, `/`-separated, and never step outside the root.
fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('/')
        && !key.contains(['\\', '\0'])
        && key
            .split('/')
            .all(|seg| !seg.is_empty() && seg != "." && seg != "..")
}

fn collect_keys(dir: &Path, base: &str, keys: &mut Vec<String>) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| IngestError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| IngestError::io(dir, e))?;
        let path = entry.path();
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            debug!(path = %path.display(), "Skipping object with non-UTF-8 name");
            continue;
        };
        let key = if base.is_empty() {
            name.to_string()
        } else {
            format!("{base}/{name}")
        };

        let file_type = entry.file_type().map_err(|e| IngestError::io(&path, e))?;
        if file_type.is_dir() {
            collect_keys(&path, &key, keys)?;
        } else if file_type.is_file() {
            keys.push(key);
        }
    }
    Ok(())
}
