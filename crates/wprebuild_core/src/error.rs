use std::path::PathBuf;

use thiserror::Error;

/// Failure to obtain or unpack one distribution package.
///
/// `NotFound` and `Network` are the fetch class; `Format` is the archive class.
/// Callers that treat every package failure alike (extensions) only need the
/// `Display` text; the core fetch lets it propagate.
#[derive(Debug, Error)]
pub enum PackageError {
    #[error("not found in package repository (HTTP {status}): {url}")]
    NotFound { url: String, status: u16 },

    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("file is not a usable zip archive ({url}): {reason}")]
    Format { url: String, reason: String },

    #[error("I/O error while handling {url}: {source}")]
    Io {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

impl PackageError {
    pub(crate) fn format(url: &str, reason: impl Into<String>) -> Self {
        Self::Format {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(url: &str, source: std::io::Error) -> Self {
        Self::Io {
            url: url.to_string(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum RebuildError {
    #[error("invalid WordPress installation at {}: missing {}", .root.display(), .missing.join(", "))]
    InvalidInstallation { root: PathBuf, missing: Vec<String> },

    #[error("output directory already exists and is not empty: {}", .0.display())]
    OutputNotEmpty(PathBuf),
}
