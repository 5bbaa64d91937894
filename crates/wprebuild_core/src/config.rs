use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CORE_URL: &str = "https://wordpress.org/latest.zip";
pub const DEFAULT_REPOSITORY_URL: &str = "https://downloads.wordpress.org";
pub const DEFAULT_USER_AGENT: &str = concat!("wprebuild/", env!("CARGO_PKG_VERSION"));
/// Whole-request limit; 0 means none. Core packages are tens of megabytes.
pub const DEFAULT_TIMEOUT_MS: u64 = 0;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_RETRIES: usize = 2;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;

pub const CONFIG_ENV: &str = "WPREBUILD_CONFIG";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct RebuildConfig {
    #[serde(default)]
    pub repository: RepositorySection,
    #[serde(default)]
    pub http: HttpSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct RepositorySection {
    pub core_url: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct HttpSection {
    pub user_agent: Option<String>,
    pub timeout_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub retries: Option<usize>,
    pub retry_delay_ms: Option<u64>,
}

/// Effective settings after env > config file > default resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSettings {
    pub core_url: String,
    pub repository_url: String,
    pub http: HttpSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    pub user_agent: String,
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub retries: usize,
    pub retry_delay_ms: u64,
}

impl RebuildConfig {
    pub fn resolve(&self) -> ResolvedSettings {
        self.resolve_with_lookup(|key| env::var(key).ok())
    }

    pub fn resolve_with_lookup<F>(&self, lookup_env: F) -> ResolvedSettings
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_text = |key: &str| {
            lookup_env(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let core_url = env_text("WPREBUILD_CORE_URL")
            .or_else(|| self.repository.core_url.clone())
            .unwrap_or_else(|| DEFAULT_CORE_URL.to_string());
        let repository_url = env_text("WPREBUILD_REPOSITORY_URL")
            .or_else(|| self.repository.base_url.clone())
            .unwrap_or_else(|| DEFAULT_REPOSITORY_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let user_agent = env_text("WPREBUILD_USER_AGENT")
            .or_else(|| self.http.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let timeout_ms = env_text("WPREBUILD_HTTP_TIMEOUT_MS")
            .and_then(|value| value.parse::<u64>().ok())
            .or(self.http.timeout_ms)
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        let connect_timeout_ms = env_text("WPREBUILD_HTTP_CONNECT_TIMEOUT_MS")
            .and_then(|value| value.parse::<u64>().ok())
            .or(self.http.connect_timeout_ms)
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS);
        let retries = env_text("WPREBUILD_HTTP_RETRIES")
            .and_then(|value| value.parse::<usize>().ok())
            .or(self.http.retries)
            .unwrap_or(DEFAULT_RETRIES);
        let retry_delay_ms = env_text("WPREBUILD_HTTP_RETRY_DELAY_MS")
            .and_then(|value| value.parse::<u64>().ok())
            .or(self.http.retry_delay_ms)
            .unwrap_or(DEFAULT_RETRY_DELAY_MS);

        ResolvedSettings {
            core_url,
            repository_url,
            http: HttpSettings {
                user_agent,
                timeout_ms,
                connect_timeout_ms,
                retries,
                retry_delay_ms,
            },
        }
    }
}

/// Config file location: explicit flag, then `WPREBUILD_CONFIG`, else none.
pub fn resolve_config_path(flag: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = flag {
        return Some(path.to_path_buf());
    }
    env::var(CONFIG_ENV)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Load a RebuildConfig from TOML. No path means defaults; a named file must exist.
pub fn load_config(config_path: Option<&Path>) -> Result<RebuildConfig> {
    let Some(config_path) = config_path else {
        return Ok(RebuildConfig::default());
    };
    if !config_path.exists() {
        bail!("config file not found: {}", config_path.display());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: RebuildConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}
