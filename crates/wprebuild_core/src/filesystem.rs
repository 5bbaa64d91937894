use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::warn;
use walkdir::WalkDir;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CopySummary {
    pub copied_files: usize,
    pub skipped_links: Vec<PathBuf>,
}

/// Names of the immediate subdirectories of `dir`, sorted.
/// Symlinks to directories count, as they do for a shell listing.
pub fn list_subdirectories(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let entry = entry.with_context(|| format!("failed to list {}", dir.display()))?;
        if entry.path().is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Recursively copy `source` into `destination`, merging with anything already
/// there. Symlinks are neither followed nor recreated.
pub fn copy_tree(source: &Path, destination: &Path) -> Result<CopySummary> {
    let mut summary = CopySummary::default();
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.with_context(|| format!("failed to walk {}", source.display()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .with_context(|| format!("{} is outside {}", entry.path().display(), source.display()))?;
        let target = destination.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("failed to create {}", target.display()))?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target).with_context(|| {
                format!(
                    "failed to copy {} to {}",
                    entry.path().display(),
                    target.display()
                )
            })?;
            summary.copied_files += 1;
        } else {
            warn!(path = %entry.path().display(), "skipping symlink or special file");
            summary.skipped_links.push(entry.path().to_path_buf());
        }
    }
    Ok(summary)
}

pub fn dir_is_empty(dir: &Path) -> Result<bool> {
    let mut entries =
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    Ok(entries.next().is_none())
}
