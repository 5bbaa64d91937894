use std::path::Path;

use anyhow::Result;

use crate::archive::Extraction;
use crate::config::ResolvedSettings;
use crate::error::PackageError;
use crate::extensions::ExtensionKind;
use crate::fetch::{ArchiveFetcher, HttpTransport, PackageTransport};

/// The distribution host: where the core package lives and how extension
/// slugs map onto download URLs.
pub struct PackageRepository<T> {
    fetcher: ArchiveFetcher<T>,
    core_url: String,
    base_url: String,
}

impl PackageRepository<HttpTransport> {
    pub fn http(settings: &ResolvedSettings) -> Result<Self> {
        let transport = HttpTransport::new(&settings.http)?;
        Ok(Self::new(
            ArchiveFetcher::new(transport),
            &settings.core_url,
            &settings.repository_url,
        ))
    }
}

impl<T: PackageTransport> PackageRepository<T> {
    pub fn new(fetcher: ArchiveFetcher<T>, core_url: &str, base_url: &str) -> Self {
        Self {
            fetcher,
            core_url: core_url.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn core_url(&self) -> &str {
        &self.core_url
    }

    pub fn fetcher(&self) -> &ArchiveFetcher<T> {
        &self.fetcher
    }

    /// `{base}/{plugin|theme}/{slug}.zip`. The slug is the installed directory
    /// name; nothing checks that it matches the repository's canonical slug.
    pub fn extension_url(&self, kind: ExtensionKind, slug: &str) -> String {
        format!("{}/{}/{}.zip", self.base_url, kind.as_str(), slug)
    }

    pub fn install_core(&self, destination: &Path) -> Result<(), PackageError> {
        self.fetcher
            .fetch_and_extract(&self.core_url, destination, Extraction::Flatten)
    }

    pub fn install_extension(
        &self,
        kind: ExtensionKind,
        slug: &str,
        category_dir: &Path,
    ) -> Result<(), PackageError> {
        let url = self.extension_url(kind, slug);
        self.fetcher
            .fetch_and_extract(&url, category_dir, Extraction::InPlace)
    }
}
