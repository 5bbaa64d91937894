//! Removal of server-executable files from a copied uploads tree.
//!
//! The uploads directory should only hold static assets. Any file whose name
//! ends in a PHP-style extension or `.htaccess` is deleted unless its content
//! is the stock "Silence is golden" placeholder or empty. This is a structural
//! heuristic, not malware detection.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};
use walkdir::WalkDir;

pub const SUSPICIOUS_EXTENSIONS: [&str; 7] = [
    ".php", ".php3", ".php4", ".php5", ".php7", ".phtml", ".htaccess",
];

/// Placeholder WordPress ships to block directory listings.
pub const PLACEHOLDER_CONTENT: &str = "<?php\n// Silence is golden.\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Extension is not on the denylist.
    Ignored,
    /// Denylisted, but the content is the placeholder or empty.
    Placeholder,
    /// Denylisted and the content could not be read; left in place.
    Unreadable,
    Delete,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SanitizeReport {
    pub scanned_files: usize,
    pub deleted: Vec<PathBuf>,
    pub retained_placeholders: Vec<PathBuf>,
    pub unreadable: Vec<PathBuf>,
    /// Flagged for deletion, but removing the file failed.
    pub delete_failed: Vec<PathBuf>,
}

/// Case-sensitive suffix match against `SUSPICIOUS_EXTENSIONS`.
pub fn is_suspicious_name(file_name: &str) -> bool {
    SUSPICIOUS_EXTENSIONS
        .iter()
        .any(|extension| file_name.ends_with(extension))
}

/// Content equal to the placeholder or empty, after a permissive text decode.
pub fn is_placeholder_content(bytes: &[u8]) -> bool {
    let text = decode_permissive(bytes);
    text.is_empty() || text == PLACEHOLDER_CONTENT
}

pub fn classify(path: &Path) -> Verdict {
    let Some(file_name) = path.file_name() else {
        return Verdict::Ignored;
    };
    if !is_suspicious_name(&file_name.to_string_lossy()) {
        return Verdict::Ignored;
    }
    match fs::read(path) {
        Ok(bytes) if is_placeholder_content(&bytes) => Verdict::Placeholder,
        Ok(_) => Verdict::Delete,
        Err(error) => {
            warn!(path = %path.display(), %error, "cannot read suspicious file; leaving it in place");
            Verdict::Unreadable
        }
    }
}

/// Walk `uploads_dir` and delete every suspicious, non-placeholder file.
/// Running it again on the same tree deletes nothing further. Nothing here
/// aborts the walk: entries that cannot be read or removed are reported.
pub fn sanitize_uploads(uploads_dir: &Path) -> SanitizeReport {
    info!(path = %uploads_dir.display(), "scanning uploads directory");
    let mut report = SanitizeReport::default();

    for entry in WalkDir::new(uploads_dir).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                let path = error
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| uploads_dir.to_path_buf());
                warn!(path = %path.display(), %error, "cannot walk uploads entry");
                report.unreadable.push(path);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        report.scanned_files += 1;

        let path = entry.path();
        match classify(path) {
            Verdict::Ignored => {}
            Verdict::Placeholder => report.retained_placeholders.push(path.to_path_buf()),
            Verdict::Unreadable => report.unreadable.push(path.to_path_buf()),
            Verdict::Delete => match fs::remove_file(path) {
                Ok(()) => {
                    info!(path = %path.display(), "deleted file");
                    report.deleted.push(path.to_path_buf());
                }
                Err(error) => {
                    warn!(path = %path.display(), %error, "failed to delete suspicious file");
                    report.delete_failed.push(path.to_path_buf());
                }
            },
        }
    }

    report
}

/// Text-mode read: invalid UTF-8 sequences are dropped and `\r\n` / `\r`
/// line endings become `\n`.
fn decode_permissive(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
    }
    if text.contains('\r') {
        text = text.replace("\r\n", "\n").replace('\r', "\n");
    }
    text
}
