use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use zip::ZipArchive;
use zip::result::ZipError;

/// How a package archive maps onto its destination directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extraction {
    /// Entries land in the destination exactly as named (plugin and theme packages).
    InPlace,
    /// The archive wraps everything in one top-level directory whose contents
    /// are moved up into the destination (the core package).
    Flatten,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<ZipError> for ExtractError {
    fn from(error: ZipError) -> Self {
        match error {
            ZipError::Io(error) if error.kind() != io::ErrorKind::UnexpectedEof => Self::Io(error),
            other => Self::Invalid(other.to_string()),
        }
    }
}

pub fn extract_zip(
    archive_path: &Path,
    destination: &Path,
    extraction: Extraction,
) -> Result<(), ExtractError> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)
        .map_err(|error| ExtractError::Invalid(format!("File is not a zip file ({error})")))?;

    let wrapper = match extraction {
        Extraction::Flatten => Some(single_top_level_dir(&archive)?),
        Extraction::InPlace => None,
    };

    fs::create_dir_all(destination)?;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            return Err(ExtractError::Invalid(format!(
                "entry escapes the destination directory: {}",
                entry.name()
            )));
        };
        let out = destination.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out_file = File::create(&out)?;
        io::copy(&mut entry, &mut out_file).map_err(|error| {
            if error.kind() == io::ErrorKind::InvalidData {
                ExtractError::Invalid(format!("corrupt entry {}: {error}", relative.display()))
            } else {
                ExtractError::Io(error)
            }
        })?;
    }

    if let Some(wrapper) = wrapper {
        flatten_wrapper(destination, &wrapper)?;
    }
    Ok(())
}

/// The one directory every entry of the archive lives under.
fn single_top_level_dir(archive: &ZipArchive<File>) -> Result<PathBuf, ExtractError> {
    let mut roots = BTreeSet::new();
    for name in archive.file_names() {
        let normalized = name.replace('\\', "/");
        match normalized.split_once('/') {
            Some((head, _)) if !head.is_empty() => {
                roots.insert(head.to_string());
            }
            _ => {
                return Err(ExtractError::Invalid(format!(
                    "expected a single top-level directory, found top-level entry {name}"
                )));
            }
        }
    }

    let mut roots = roots.into_iter();
    match (roots.next(), roots.next()) {
        (Some(root), None) => Ok(PathBuf::from(root)),
        (None, _) => Err(ExtractError::Invalid("archive is empty".to_string())),
        (Some(first), Some(second)) => Err(ExtractError::Invalid(format!(
            "expected a single top-level directory, found {first} and {second}"
        ))),
    }
}

fn flatten_wrapper(destination: &Path, wrapper: &Path) -> Result<(), ExtractError> {
    let wrapper_dir = destination.join(wrapper);
    // Move the wrapper aside so a child sharing its name can take its place.
    let mut staging_name = std::ffi::OsString::from(".");
    staging_name.push(wrapper.as_os_str());
    staging_name.push(".flatten");
    let staging_dir = destination.join(staging_name);
    fs::rename(&wrapper_dir, &staging_dir)?;

    for entry in fs::read_dir(&staging_dir)? {
        let entry = entry?;
        let target = destination.join(entry.file_name());
        if target.exists() {
            return Err(ExtractError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("refusing to overwrite {}", target.display()),
            )));
        }
        fs::rename(entry.path(), &target)?;
    }
    fs::remove_dir(&staging_dir)?;
    Ok(())
}
