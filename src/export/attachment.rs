//! Extract attachments from a parsed message.

use std::path::{Path, PathBuf};

use crate::model::attachment::RawAttachment;
use crate::model::email::Email;

/// Longest filename kept, in characters.
const MAX_FILENAME_LEN: usize = 150;

/// Write one decoded attachment into `output_dir`.
///
/// `index` is the attachment's 1-based position in the message and names the
/// file when the attachment carried no filename.
pub fn export_attachment(
    attachment: &RawAttachment,
    index: usize,
    output_dir: &Path,
) -> anyhow::Result<PathBuf> {
    let filename = if attachment.file_name.is_empty() {
        format!("attachment_{index}")
    } else {
        sanitize_filename_part(&attachment.file_name, MAX_FILENAME_LEN)
    };
    let path = output_dir.join(&filename);

    // Avoid overwriting: append a counter if needed
    let path = unique_path(&path);
    std::fs::write(&path, &attachment.raw_bytes)?;
    Ok(path)
}

/// Write every attachment of `email` into `output_dir`, creating it if needed.
///
/// A failed write is logged and skipped; the paths written are returned.
pub fn export_all_attachments(email: &Email, output_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)?;
    let mut paths = Vec::new();

    for (i, att) in email.attachments.iter().enumerate() {
        match export_attachment(att, i + 1, output_dir) {
            Ok(path) => paths.push(path),
            Err(e) => {
                tracing::warn!(
                    filename = %att.file_name,
                    error = %e,
                    "Failed to export attachment"
                );
            }
        }
    }

    Ok(paths)
}

/// Sanitize a string for use in filenames.
///
/// Replaces invalid characters with `_` and truncates to `max_len`.
pub fn sanitize_filename_part(s: &str, max_len: usize) -> String {
    let sanitized: String = s
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '@' {
                c
            } else {
                '_'
            }
        })
        .take(max_len)
        .collect();

    // A bare "." or ".." would name a directory.
    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        "unknown".to_string()
    } else {
        sanitized
    }
}

/// If `path` already exists, append a counter to make it unique.
fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let parent = path.parent().unwrap_or(Path::new("."));

    for i in 1..1000 {
        let candidate = if ext.is_empty() {
            parent.join(format!("{stem}_{i}"))
        } else {
            parent.join(format!("{stem}_{i}.{ext}"))
        };
        if !candidate.exists() {
            return candidate;
        }
    }

    parent.join(format!("{stem}_dup.{ext}"))
}
