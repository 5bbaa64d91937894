use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::RebuildError;
use crate::extensions::{CategoryReport, Confirm, ExtensionKind, install_category};
use crate::fetch::PackageTransport;
use crate::filesystem::{CopySummary, copy_tree, dir_is_empty};
use crate::layout::{
    InstallationLayout, absolute_path, inspect_installation, normalize_for_display,
    rebuilt_root_for,
};
use crate::repository::PackageRepository;
use crate::sanitize::{SanitizeReport, sanitize_uploads};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildStage {
    ValidateSource,
    CreateOutputTree,
    FetchCore,
    InstallExtensions(ExtensionKind),
    CopyUploads,
    SanitizeUploads,
    CopyConfig,
    Done,
}

impl fmt::Display for RebuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidateSource => f.write_str("validate-source"),
            Self::CreateOutputTree => f.write_str("create-output-tree"),
            Self::FetchCore => f.write_str("fetch-core"),
            Self::InstallExtensions(kind) => write!(f, "install-{}", kind.dir_name()),
            Self::CopyUploads => f.write_str("copy-uploads"),
            Self::SanitizeUploads => f.write_str("sanitize-uploads"),
            Self::CopyConfig => f.write_str("copy-config"),
            Self::Done => f.write_str("done"),
        }
    }
}

/// A validated source installation and where its rebuild will go.
#[derive(Debug, Clone)]
pub struct RebuildPlan {
    pub source: InstallationLayout,
    pub output: InstallationLayout,
}

impl RebuildPlan {
    pub fn diagnostics(&self) -> String {
        format!(
            "source:\n{}\noutput_root={}",
            self.source.diagnostics(),
            normalize_for_display(&self.output.root)
        )
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadsOutcome {
    Absent,
    Copied {
        copy: CopySummary,
        sanitize: SanitizeReport,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct RebuildReport {
    pub source_root: PathBuf,
    pub output_root: PathBuf,
    pub core_url: String,
    pub categories: Vec<CategoryReport>,
    pub uploads: UploadsOutcome,
    pub config_copied: bool,
}

impl RebuildReport {
    pub fn category(&self, kind: ExtensionKind) -> Option<&CategoryReport> {
        self.categories.iter().find(|report| report.kind == kind)
    }

    pub fn missing_count(&self) -> usize {
        self.categories
            .iter()
            .map(|report| report.missing.len())
            .sum()
    }
}

/// Resolve and validate the source; nothing is written.
pub fn plan_rebuild(source_dir: &Path) -> Result<RebuildPlan> {
    log_stage(RebuildStage::ValidateSource);
    let source_root = absolute_path(source_dir)?;
    let source = InstallationLayout::new(&source_root);
    let status = inspect_installation(&source);
    if !status.is_valid() {
        return Err(RebuildError::InvalidInstallation {
            root: source_root,
            missing: status.missing(),
        }
        .into());
    }

    let output = InstallationLayout::new(rebuilt_root_for(&source_root)?);
    Ok(RebuildPlan { source, output })
}

/// Run every stage after validation. Extension failures, missing uploads and a
/// missing config file are recorded in the report; only output-tree creation,
/// the core package and real I/O errors abort the run.
pub fn execute_rebuild<T: PackageTransport>(
    plan: &RebuildPlan,
    repository: &PackageRepository<T>,
    confirm: &mut dyn Confirm,
) -> Result<RebuildReport> {
    let RebuildPlan { source, output } = plan;

    log_stage(RebuildStage::CreateOutputTree);
    create_output_root(&output.root)?;
    info!(path = %output.root.display(), "created rebuilt directory");

    log_stage(RebuildStage::FetchCore);
    repository
        .install_core(&output.root)
        .with_context(|| format!("failed to install WordPress core from {}", repository.core_url()))?;
    info!(url = repository.core_url(), "downloaded WordPress core");

    let mut categories = Vec::with_capacity(ExtensionKind::ALL.len());
    for kind in ExtensionKind::ALL {
        log_stage(RebuildStage::InstallExtensions(kind));
        categories.push(install_category(kind, source, output, repository, confirm)?);
    }

    log_stage(RebuildStage::CopyUploads);
    let uploads = if source.uploads_dir.is_dir() {
        let copy = copy_tree(&source.uploads_dir, &output.uploads_dir)?;
        log_stage(RebuildStage::SanitizeUploads);
        let sanitize = sanitize_uploads(&output.uploads_dir);
        info!(
            path = %output.uploads_dir.display(),
            deleted = sanitize.deleted.len(),
            "scanned and cleaned uploads directory"
        );
        UploadsOutcome::Copied { copy, sanitize }
    } else {
        info!(
            path = %source.uploads_dir.display(),
            "uploads directory does not exist, skipping"
        );
        UploadsOutcome::Absent
    };

    log_stage(RebuildStage::CopyConfig);
    let config_copied = if source.config_path.exists() {
        fs::copy(&source.config_path, &output.config_path).with_context(|| {
            format!(
                "failed to copy {} to {}",
                source.config_path.display(),
                output.config_path.display()
            )
        })?;
        true
    } else {
        warn!(
            path = %source.config_path.display(),
            "config file does not exist in the original directory"
        );
        false
    };

    log_stage(RebuildStage::Done);
    Ok(RebuildReport {
        source_root: source.root.clone(),
        output_root: output.root.clone(),
        core_url: repository.core_url().to_string(),
        categories,
        uploads,
        config_copied,
    })
}

fn create_output_root(root: &Path) -> Result<()> {
    if root.exists() && !dir_is_empty(root)? {
        return Err(RebuildError::OutputNotEmpty(root.to_path_buf()).into());
    }
    fs::create_dir_all(root).with_context(|| format!("failed to create {}", root.display()))
}

fn log_stage(stage: RebuildStage) {
    tracing::debug!(%stage, "entering stage");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::tempdir;

    use super::{UploadsOutcome, execute_rebuild, plan_rebuild};
    use crate::error::RebuildError;
    use crate::extensions::ExtensionKind;
    use crate::fetch::ArchiveFetcher;
    use crate::repository::PackageRepository;
    use crate::sanitize::PLACEHOLDER_CONTENT;
    use crate::testing::{MemoryTransport, zip_bytes};

    const CORE_URL: &str = "https://core.example/latest.zip";
    const BASE: &str = "https://downloads.example";

    fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, content).expect("write");
    }

    fn core_package() -> Vec<u8> {
        zip_bytes(&[
            ("wordpress/", None),
            ("wordpress/index.php", Some("<?php // front controller")),
            ("wordpress/wp-includes/version.php", Some("<?php $wp_version = '6.5';")),
            ("wordpress/wp-content/index.php", Some(PLACEHOLDER_CONTENT)),
            ("wordpress/wp-content/plugins/index.php", Some(PLACEHOLDER_CONTENT)),
            ("wordpress/wp-content/themes/index.php", Some(PLACEHOLDER_CONTENT)),
        ])
    }

    fn scaffold_site(root: &Path) {
        write_file(&root.join("wp-config.php"), "<?php define('DB_NAME', 'site');");
        write_file(&root.join("wp-content/plugins/foo/foo.php"), "<?php // infected foo");
        write_file(&root.join("wp-content/plugins/bar/bar.php"), "<?php // infected bar");
        write_file(&root.join("wp-content/themes/baz/style.css"), "/* infected baz */");
        write_file(&root.join("wp-content/uploads/note.txt"), "keep me");
        write_file(
            &root.join("wp-content/uploads/2024/01/evil.php"),
            "<?php eval(base64_decode($_POST['p']));",
        );
    }

    fn repository() -> PackageRepository<MemoryTransport> {
        let transport = MemoryTransport::default()
            .with_package(CORE_URL, core_package())
            .with_package(
                &format!("{BASE}/plugin/foo.zip"),
                zip_bytes(&[("foo/", None), ("foo/foo.php", Some("<?php // clean foo"))]),
            )
            .with_package(
                &format!("{BASE}/theme/baz.zip"),
                zip_bytes(&[("baz/style.css", Some("/* clean baz */"))]),
            );
        PackageRepository::new(ArchiveFetcher::new(transport), CORE_URL, BASE)
    }

    fn always_yes(_: ExtensionKind, _: &[String]) -> bool {
        true
    }

    #[test]
    fn rebuild_produces_clean_tree_with_anomaly_manifest() {
        let temp = tempdir().expect("tempdir");
        let source_root = temp.path().join("site");
        scaffold_site(&source_root);

        let plan = plan_rebuild(&source_root).expect("plan");
        assert_eq!(plan.output.root, temp.path().join("site-rebuilt"));
        let report = execute_rebuild(&plan, &repository(), &mut always_yes).expect("rebuild");

        let out = temp.path().join("site-rebuilt");
        assert!(out.join("index.php").is_file());
        assert!(out.join("wp-includes/version.php").is_file());
        assert!(!out.join("wordpress").exists());
        assert_eq!(
            fs::read_to_string(out.join("wp-content/plugins/foo/foo.php")).expect("read foo"),
            "<?php // clean foo"
        );
        assert!(!out.join("wp-content/plugins/bar").exists());
        assert_eq!(
            fs::read_to_string(out.join("wp-content/plugins/missing.txt")).expect("read missing"),
            "bar"
        );
        assert!(out.join("wp-content/themes/baz/style.css").is_file());
        assert!(!out.join("wp-content/themes/missing.txt").exists());
        assert!(out.join("wp-content/uploads/note.txt").is_file());
        assert!(!out.join("wp-content/uploads/2024/01/evil.php").exists());
        assert_eq!(
            fs::read_to_string(out.join("wp-config.php")).expect("read config"),
            "<?php define('DB_NAME', 'site');"
        );

        assert!(report.config_copied);
        assert_eq!(report.missing_count(), 1);
        let plugins = report.category(ExtensionKind::Plugin).expect("plugin report");
        assert_eq!(plugins.found, vec!["bar".to_string(), "foo".to_string()]);
        assert_eq!(plugins.missing_slugs(), vec!["bar"]);
        match &report.uploads {
            UploadsOutcome::Copied { copy, sanitize } => {
                assert_eq!(copy.copied_files, 2);
                assert_eq!(sanitize.deleted.len(), 1);
            }
            UploadsOutcome::Absent => panic!("uploads should have been copied"),
        }

        let json = serde_json::to_value(&report).expect("serialize report");
        assert_eq!(json["uploads"]["status"], "copied");
        assert_eq!(json["categories"][0]["kind"], "plugin");
    }

    #[test]
    fn invalid_source_creates_no_output() {
        let temp = tempdir().expect("tempdir");
        let source_root = temp.path().join("site");
        write_file(&source_root.join("wp-config.php"), "<?php");
        fs::create_dir_all(source_root.join("wp-content/plugins")).expect("create plugins");

        let error = plan_rebuild(&source_root).expect_err("must fail");
        match error.downcast_ref::<RebuildError>() {
            Some(RebuildError::InvalidInstallation { missing, .. }) => {
                assert_eq!(missing, &vec!["wp-content/themes/".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!temp.path().join("site-rebuilt").exists());
    }

    #[test]
    fn missing_core_package_is_fatal() {
        let temp = tempdir().expect("tempdir");
        let source_root = temp.path().join("site");
        scaffold_site(&source_root);
        let repository =
            PackageRepository::new(ArchiveFetcher::new(MemoryTransport::default()), CORE_URL, BASE);

        let plan = plan_rebuild(&source_root).expect("plan");
        let error = execute_rebuild(&plan, &repository, &mut always_yes).expect_err("must fail");

        assert!(error.to_string().contains("WordPress core"));
        assert_eq!(repository.fetcher().transport().requests(), vec![CORE_URL.to_string()]);
        assert!(!temp.path().join("site-rebuilt/wp-content/plugins").exists());
    }

    #[test]
    fn absent_uploads_are_skipped_and_declines_are_reported() {
        let temp = tempdir().expect("tempdir");
        let source_root = temp.path().join("site");
        scaffold_site(&source_root);
        fs::remove_dir_all(source_root.join("wp-content/uploads")).expect("remove uploads");

        let plan = plan_rebuild(&source_root).expect("plan");
        let mut decline_all = |_: ExtensionKind, _: &[String]| false;
        let report = execute_rebuild(&plan, &repository(), &mut decline_all).expect("rebuild");

        assert!(matches!(report.uploads, UploadsOutcome::Absent));
        assert!(report.categories.iter().all(|category| category.declined));
        assert_eq!(report.missing_count(), 0);
        let out = temp.path().join("site-rebuilt");
        assert!(!out.join("wp-content/uploads").exists());
        assert!(!out.join("wp-content/plugins/foo").exists());
        assert!(!out.join("wp-content/plugins/missing.txt").exists());
        assert!(out.join("wp-config.php").is_file());
    }

    #[test]
    fn existing_non_empty_output_is_refused() {
        let temp = tempdir().expect("tempdir");
        let source_root = temp.path().join("site");
        scaffold_site(&source_root);
        write_file(&temp.path().join("site-rebuilt/index.php"), "<?php // old run");

        let plan = plan_rebuild(&source_root).expect("plan");
        let error = execute_rebuild(&plan, &repository(), &mut always_yes).expect_err("must fail");

        assert!(matches!(
            error.downcast_ref::<RebuildError>(),
            Some(RebuildError::OutputNotEmpty(_))
        ));
    }
}
