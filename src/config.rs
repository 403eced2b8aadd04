//! Project configuration for ksd.
//!
//! Configuration lives in `ksd.yaml` (or `.ksd.yaml`) at the source root,
//! falling back to `config.yaml` in the user configuration directory. Every
//! field is optional and command-line flags take precedence.
//!
//! ```yaml
//! endpoint: https://help.kusto.windows.net/Samples
//! out_dir: kout
//! excluded_paths:
//!   - "scratch/**"
//! auth:
//!   client_id: 00000000-0000-0000-0000-000000000000
//!   tenant_id: 00000000-0000-0000-0000-000000000000
//!   credential_provider: github
//! sync:
//!   retries: 3
//!   retry_delay_ms: 1000
//!   request_timeout_ms: 60000
//! ```

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::build::OUT_DIR;

/// Config file names searched for in the source root.
pub const DEFAULT_CONFIG_NAMES: &[&str] = &["ksd.yaml", ".ksd.yaml"];

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ProjectConfig {
    /// Database endpoint, e.g. `https://<cluster>.kusto.windows.net/<database>`
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Name of the build output directory under the source root
    #[serde(default)]
    pub out_dir: Option<String>,
    /// Glob patterns, relative to the source root, of sources to skip
    #[serde(default)]
    pub excluded_paths: Vec<String>,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Non-secret authentication settings. Client secrets are only accepted
/// from the command line or `KSD_CLIENT_SECRET`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub credential_provider: Option<String>,
}

/// Settings for submitting command files.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    /// Extra attempts for a file after a transient failure
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl ProjectConfig {
    /// Parse a config from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: ProjectConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Find and load the config for `root`.
    ///
    /// Returns the default config and `None` when no file exists.
    pub fn discover(root: &Path) -> anyhow::Result<(Self, Option<PathBuf>)> {
        let candidates = DEFAULT_CONFIG_NAMES
            .iter()
            .map(|name| root.join(name))
            .chain(user_config_path());

        for path in candidates {
            if path.is_file() {
                let config = Self::parse_file(&path).map_err(|e| {
                    anyhow::anyhow!("parsing config {}: {}", path.display(), e)
                })?;
                return Ok((config, Some(path)));
            }
        }
        Ok((Self::default(), None))
    }

    /// Returns the output directory name (defaults to `kout`).
    pub fn out_dir(&self) -> &str {
        self.out_dir.as_deref().unwrap_or(OUT_DIR)
    }

    /// Check if a path should be excluded based on excluded_paths patterns.
    /// `path` is relative to the source root.
    pub fn is_path_excluded(&self, path: &Path) -> bool {
        if self.excluded_paths.is_empty() {
            return false;
        }

        let path_str = path.to_string_lossy().replace('\\', "/");

        for pattern in &self.excluded_paths {
            if let Ok(glob) = globset::Glob::new(pattern) {
                if glob.compile_matcher().is_match(&path_str) {
                    return true;
                }
            }
        }
        false
    }
}

/// Path of the per-user config file, if the platform has a config directory.
pub fn user_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "ksd").map(|dirs| dirs.config_dir().join("config.yaml"))
}

/// Validate a config.
pub fn validate(config: &ProjectConfig) -> anyhow::Result<()> {
    if let Some(out_dir) = &config.out_dir {
        let path = Path::new(out_dir);
        if out_dir.is_empty() || path.is_absolute() || path.components().count() != 1 {
            anyhow::bail!(
                "invalid out_dir {:?}, must be a single directory name",
                out_dir
            );
        }
    }

    if let Some(endpoint) = &config.endpoint {
        crate::client::Endpoint::parse(endpoint)
            .map_err(|e| anyhow::anyhow!("invalid endpoint {:?}: {}", endpoint, e))?;
    }

    if let Some(provider) = &config.auth.credential_provider {
        provider
            .parse::<crate::client::CredentialProvider>()
            .map_err(|e| anyhow::anyhow!("{}", e))?;
    }

    for pattern in &config.excluded_paths {
        globset::Glob::new(pattern)
            .map_err(|e| anyhow::anyhow!("invalid excluded_paths pattern {:?}: {}", pattern, e))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_config() {
        let yaml = r#"
endpoint: https://help.kusto.windows.net/Samples
excluded_paths:
  - "scratch/**"
auth:
  client_id: my-app
  tenant_id: my-tenant
sync:
  retries: 5
"#;
        let config: ProjectConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config.endpoint.as_deref(),
            Some("https://help.kusto.windows.net/Samples")
        );
        assert_eq!(config.auth.client_id.as_deref(), Some("my-app"));
        assert_eq!(config.sync.retries, 5);
        assert_eq!(config.sync.retry_delay_ms, 1000);
        assert_eq!(config.out_dir(), "kout");
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_empty_config_defaults() {
        let config: ProjectConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.endpoint.is_none());
        assert_eq!(config.sync.retries, 3);
        assert_eq!(config.sync.request_timeout_ms, 60_000);
        assert!(config.excluded_paths.is_empty());
    }

    #[test]
    fn test_excluded_paths() {
        let config = ProjectConfig {
            excluded_paths: vec!["scratch/**".to_string(), "**/*.draft.kql".to_string()],
            ..Default::default()
        };

        assert!(config.is_path_excluded(Path::new("scratch/a.kql")));
        assert!(config.is_path_excluded(Path::new("sales/totals.draft.kql")));
        assert!(!config.is_path_excluded(Path::new("sales/totals.kql")));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = ProjectConfig {
            out_dir: Some("a/b".to_string()),
            ..Default::default()
        };
        assert!(validate(&config).is_err());

        let config = ProjectConfig {
            endpoint: Some("https://help.kusto.windows.net".to_string()),
            ..Default::default()
        };
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("endpoint must target a database"));

        let config = ProjectConfig {
            excluded_paths: vec!["[".to_string()],
            ..Default::default()
        };
        assert!(validate(&config).is_err());

        let mut config = ProjectConfig::default();
        config.auth.credential_provider = Some("gitlab".to_string());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_discover_in_root() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(".ksd.yaml"), "out_dir: built\n").unwrap();

        let (config, path) = ProjectConfig::discover(temp.path()).unwrap();
        assert_eq!(config.out_dir(), "built");
        assert_eq!(path, Some(temp.path().join(".ksd.yaml")));
    }

    #[test]
    fn test_discover_reports_invalid_yaml() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("ksd.yaml"), "sync: [not, a, map]\n").unwrap();

        let err = ProjectConfig::discover(temp.path()).unwrap_err();
        assert!(err.to_string().contains("parsing config"));
    }
}
