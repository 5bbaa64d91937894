use std::fs;
use std::io::{self, BufRead, Stdout, StdinLock, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::fetch::PackageTransport;
use crate::filesystem::list_subdirectories;
use crate::layout::InstallationLayout;
use crate::repository::PackageRepository;

pub const MISSING_LIST_FILENAME: &str = "missing.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionKind {
    Plugin,
    Theme,
}

impl ExtensionKind {
    pub const ALL: [Self; 2] = [Self::Plugin, Self::Theme];

    /// Singular tag, as used in repository URLs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plugin => "plugin",
            Self::Theme => "theme",
        }
    }

    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Plugin => "plugins",
            Self::Theme => "themes",
        }
    }

    pub fn category_dir(self, layout: &InstallationLayout) -> &Path {
        match self {
            Self::Plugin => &layout.plugins_dir,
            Self::Theme => &layout.themes_dir,
        }
    }
}

/// Operator approval before any network activity for a category.
pub trait Confirm {
    fn confirm(&mut self, kind: ExtensionKind, items: &[String]) -> Result<bool>;
}

impl<F> Confirm for F
where
    F: FnMut(ExtensionKind, &[String]) -> bool,
{
    fn confirm(&mut self, kind: ExtensionKind, items: &[String]) -> Result<bool> {
        Ok(self(kind, items))
    }
}

/// Answers yes without asking.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&mut self, kind: ExtensionKind, items: &[String]) -> Result<bool> {
        info!(
            kind = kind.as_str(),
            count = items.len(),
            "confirmation skipped (--yes)"
        );
        Ok(true)
    }
}

/// Lists the items and reads a `y`/`n` answer line.
pub struct ConsolePrompt<R, W> {
    input: R,
    output: W,
}

impl ConsolePrompt<StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsolePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R: BufRead, W: Write> Confirm for ConsolePrompt<R, W> {
    fn confirm(&mut self, kind: ExtensionKind, items: &[String]) -> Result<bool> {
        let label = kind.as_str();
        writeln!(self.output, "Found {} {label}(s):", items.len())?;
        for item in items {
            writeln!(self.output, "- {item}")?;
        }
        write!(
            self.output,
            "Do you want to proceed with downloading and installing these {label}(s)? (y/n): "
        )?;
        self.output.flush()?;

        let mut answer = String::new();
        let read = self
            .input
            .read_line(&mut answer)
            .context("failed to read confirmation answer")?;
        if read == 0 {
            writeln!(self.output)?;
            return Ok(false);
        }
        Ok(answer.trim().eq_ignore_ascii_case("y"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingExtension {
    pub slug: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryReport {
    pub kind: ExtensionKind,
    pub found: Vec<String>,
    pub declined: bool,
    pub installed: Vec<String>,
    pub missing: Vec<MissingExtension>,
    pub missing_list_path: Option<PathBuf>,
}

impl CategoryReport {
    fn new(kind: ExtensionKind, found: Vec<String>) -> Self {
        Self {
            kind,
            found,
            declined: false,
            installed: Vec::new(),
            missing: Vec::new(),
            missing_list_path: None,
        }
    }

    pub fn missing_slugs(&self) -> Vec<&str> {
        self.missing.iter().map(|item| item.slug.as_str()).collect()
    }
}

/// Reinstall every plugin or theme found in `source` from the package
/// repository into `destination`.
///
/// A failure for one slug is recorded and never stops the others. When any
/// slug could not be installed, the list is written to `missing.txt` in the
/// destination category directory.
pub fn install_category<T: PackageTransport>(
    kind: ExtensionKind,
    source: &InstallationLayout,
    destination: &InstallationLayout,
    repository: &PackageRepository<T>,
    confirm: &mut dyn Confirm,
) -> Result<CategoryReport> {
    let source_dir = kind.category_dir(source);
    let destination_dir = kind.category_dir(destination);
    fs::create_dir_all(destination_dir)
        .with_context(|| format!("failed to create {}", destination_dir.display()))?;

    let found = list_subdirectories(source_dir)?;
    let mut report = CategoryReport::new(kind, found);

    if !confirm.confirm(kind, &report.found)? {
        info!(kind = kind.as_str(), "skipping download and installation");
        report.declined = true;
        return Ok(report);
    }

    for slug in &report.found {
        match repository.install_extension(kind, slug, destination_dir) {
            Ok(()) => {
                info!(kind = kind.as_str(), slug = slug.as_str(), "installed");
                report.installed.push(slug.clone());
            }
            Err(error) => {
                warn!(kind = kind.as_str(), slug = slug.as_str(), %error, "download failed");
                report.missing.push(MissingExtension {
                    slug: slug.clone(),
                    reason: error.to_string(),
                });
            }
        }
    }

    if !report.missing.is_empty() {
        let path = destination_dir.join(MISSING_LIST_FILENAME);
        fs::write(&path, report.missing_slugs().join("\n"))
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(
            kind = kind.as_str(),
            count = report.missing.len(),
            path = %path.display(),
            "wrote missing list"
        );
        report.missing_list_path = Some(path);
    }

    Ok(report)
}
