use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};

pub const CONFIG_FILENAME: &str = "wp-config.php";
pub const CONTENT_DIRNAME: &str = "wp-content";
pub const UPLOADS_DIRNAME: &str = "uploads";
pub const REBUILT_SUFFIX: &str = "-rebuilt";

/// Paths of one WordPress installation, source or rebuilt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationLayout {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub content_dir: PathBuf,
    pub themes_dir: PathBuf,
    pub plugins_dir: PathBuf,
    pub uploads_dir: PathBuf,
}

impl InstallationLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let content_dir = root.join(CONTENT_DIRNAME);
        Self {
            config_path: root.join(CONFIG_FILENAME),
            themes_dir: content_dir.join("themes"),
            plugins_dir: content_dir.join("plugins"),
            uploads_dir: content_dir.join(UPLOADS_DIRNAME),
            content_dir,
            root,
        }
    }

    pub fn diagnostics(&self) -> String {
        format!(
            "root={}\nconfig_path={}\ncontent_dir={}\nthemes_dir={}\nplugins_dir={}\nuploads_dir={}",
            normalize_for_display(&self.root),
            normalize_for_display(&self.config_path),
            normalize_for_display(&self.content_dir),
            normalize_for_display(&self.themes_dir),
            normalize_for_display(&self.plugins_dir),
            normalize_for_display(&self.uploads_dir),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationStatus {
    pub config_exists: bool,
    pub content_exists: bool,
    pub themes_exists: bool,
    pub plugins_exists: bool,
    pub uploads_exists: bool,
}

impl InstallationStatus {
    pub fn is_valid(&self) -> bool {
        self.config_exists && self.content_exists && self.themes_exists && self.plugins_exists
    }

    /// Required elements that are absent, in check order.
    pub fn missing(&self) -> Vec<String> {
        let checks = [
            (self.config_exists, CONFIG_FILENAME.to_string()),
            (self.content_exists, format!("{CONTENT_DIRNAME}/")),
            (self.themes_exists, format!("{CONTENT_DIRNAME}/themes/")),
            (self.plugins_exists, format!("{CONTENT_DIRNAME}/plugins/")),
        ];
        checks
            .into_iter()
            .filter_map(|(present, label)| (!present).then_some(label))
            .collect()
    }
}

pub fn inspect_installation(layout: &InstallationLayout) -> InstallationStatus {
    InstallationStatus {
        config_exists: layout.config_path.is_file(),
        content_exists: layout.content_dir.is_dir(),
        themes_exists: layout.themes_dir.is_dir(),
        plugins_exists: layout.plugins_dir.is_dir(),
        uploads_exists: layout.uploads_dir.is_dir(),
    }
}

/// True when `directory` has the minimum shape of a WordPress installation.
/// A path that does not exist is simply invalid.
pub fn validate_installation(directory: &Path) -> bool {
    inspect_installation(&InstallationLayout::new(directory)).is_valid()
}

/// Absolute, lexically normalized form of `path` (symlinks are not resolved).
pub fn absolute_path(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("failed to read current directory")?
            .join(path)
    };
    Ok(normalize_pathbuf(&absolute))
}

/// `{parent}/{basename}-rebuilt` for an absolute source root.
pub fn rebuilt_root_for(source_root: &Path) -> Result<PathBuf> {
    let Some(name) = source_root.file_name() else {
        bail!(
            "cannot derive an output directory name from {}",
            normalize_for_display(source_root)
        );
    };
    let parent = source_root.parent().unwrap_or_else(|| Path::new("/"));
    let mut rebuilt_name = name.to_os_string();
    rebuilt_name.push(REBUILT_SUFFIX);
    Ok(parent.join(rebuilt_name))
}

pub fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn normalize_pathbuf(path: &Path) -> PathBuf {
    let mut output = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => output.push(prefix.as_os_str()),
            Component::RootDir => output.push(Path::new(std::path::MAIN_SEPARATOR_STR)),
            Component::CurDir => {}
            Component::ParentDir => {
                output.pop();
            }
            Component::Normal(part) => output.push(part),
        }
    }
    output
}
