use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for roomservice
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    /// Account and branch devices are fetched from unless overridden on the command line
    #[serde(default)]
    pub target: TargetConfig,

    /// GitHub API settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// Manifest file locations, relative to the checkout root
    #[serde(default)]
    pub manifest: ManifestConfig,

    /// Dependency declaration settings
    #[serde(default)]
    pub dependencies: DependencyConfig,

    /// External sync command
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Default target remote and branch
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    /// GitHub account device repositories are looked up under
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Revision written for repositories that do not declare one
    #[serde(default = "default_branch")]
    pub branch: String,
}

/// GitHub configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitHubConfig {
    /// API base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// File holding an API token on its first line
    #[serde(default = "default_token_file")]
    pub token_file: String,

    /// Repositories requested per page
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

/// Manifest configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ManifestConfig {
    /// Overlay manifest written by roomservice
    #[serde(default = "default_local_manifest")]
    pub local: String,

    /// Main manifest consulted when looking up installed devices
    #[serde(default = "default_base_manifest")]
    pub base: String,

    /// Default manifest consulted for path conflicts
    #[serde(default = "default_default_manifest")]
    pub default: String,

    /// Remote alias written on new project entries
    #[serde(default = "default_remote_alias")]
    pub remote_alias: String,
}

/// Dependency declaration configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DependencyConfig {
    /// Prefix of the declaration file, e.g. `XOS` for `XOS.dependencies`
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

/// Sync command configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    /// Program to run
    #[serde(default = "default_sync_command")]
    pub command: String,

    /// Arguments passed before the project paths
    #[serde(default = "default_sync_args")]
    pub args: Vec<String>,
}

/// Manifest locations resolved against a checkout root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestPaths {
    pub local: PathBuf,
    pub base: PathBuf,
    pub default: PathBuf,
}

// Default value functions
fn default_remote() -> String {
    "halogenOS".to_string()
}
fn default_branch() -> String {
    "XOS-7.0".to_string()
}
fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_token_file() -> String {
    "~/api_token".to_string()
}
fn default_per_page() -> u32 {
    100
}
fn default_local_manifest() -> String {
    ".repo/local_manifests/XOS_manifest.xml".to_string()
}
fn default_base_manifest() -> String {
    ".repo/manifest.xml".to_string()
}
fn default_default_manifest() -> String {
    ".repo/manifests/default.xml".to_string()
}
fn default_remote_alias() -> String {
    "github".to_string()
}
fn default_prefix() -> String {
    "XOS".to_string()
}
fn default_sync_command() -> String {
    "repo".to_string()
}
fn default_sync_args() -> Vec<String> {
    vec!["sync".to_string(), "--force-sync".to_string()]
}

// Default implementations
impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            remote: default_remote(),
            branch: default_branch(),
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token_file: default_token_file(),
            per_page: default_per_page(),
        }
    }
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            local: default_local_manifest(),
            base: default_base_manifest(),
            default: default_default_manifest(),
            remote_alias: default_remote_alias(),
        }
    }
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            command: default_sync_command(),
            args: default_sync_args(),
        }
    }
}

impl ManifestConfig {
    /// Resolve the configured manifest locations against a checkout root
    pub fn resolve(&self, root: &Path) -> ManifestPaths {
        ManifestPaths {
            local: root.join(&self.local),
            base: root.join(&self.base),
            default: root.join(&self.default),
        }
    }
}

impl Config {
    /// Load configuration from the default location or create a default config
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            let mut config = Self::default();

            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
            }

            config.save(&config_path)?;

            tracing::info!("Created default configuration at: {:?}", config_path);
            config.expand_paths()?;
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.expand_paths()?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("roomservice").join("config.yml"))
    }

    /// Expand `~` and environment variables in configured paths
    pub fn expand_paths(&mut self) -> Result<()> {
        self.github.token_file = shellexpand::full(&self.github.token_file)
            .context("Failed to expand token_file path")?
            .into_owned();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    fn setup_test_config_dir() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_dir = temp_dir.path().join("roomservice");
        std::fs::create_dir_all(&config_dir).expect("Failed to create config dir");
        (temp_dir, config_dir)
    }

    #[test]
    fn test_config_default_values() {
        let config = Config::default();

        assert_eq!(config.target.remote, "halogenOS");
        assert_eq!(config.target.branch, "XOS-7.0");
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.github.token_file, "~/api_token");
        assert_eq!(config.manifest.local, ".repo/local_manifests/XOS_manifest.xml");
        assert_eq!(config.manifest.remote_alias, "github");
        assert_eq!(config.dependencies.prefix, "XOS");
        assert_eq!(config.sync.command, "repo");
        assert_eq!(config.sync.args, vec!["sync", "--force-sync"]);
    }

    #[test]
    fn test_manifest_paths_resolve_against_root() {
        let config = Config::default();
        let paths = config.manifest.resolve(Path::new("/src/xos"));

        assert_eq!(
            paths.local,
            PathBuf::from("/src/xos/.repo/local_manifests/XOS_manifest.xml")
        );
        assert_eq!(paths.base, PathBuf::from("/src/xos/.repo/manifest.xml"));
        assert_eq!(paths.default, PathBuf::from("/src/xos/.repo/manifests/default.xml"));
    }

    #[test]
    #[serial]
    fn test_expand_paths() {
        env::set_var("TEST_ROOMSERVICE_HOME", "/test/home");

        let mut config = Config::default();
        config.github.token_file = "${TEST_ROOMSERVICE_HOME}/api_token".to_string();

        config.expand_paths().expect("Failed to expand paths");

        assert_eq!(config.github.token_file, "/test/home/api_token");

        env::remove_var("TEST_ROOMSERVICE_HOME");
    }

    #[test]
    fn test_config_load_nonexistent_file() {
        let nonexistent_path = Path::new("/nonexistent/path/config.yml");
        let result = Config::load(nonexistent_path);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_save_and_load() {
        let (_temp_dir, config_dir) = setup_test_config_dir();
        let config_path = config_dir.join("config.yml");

        let mut config = Config::default();
        config.target.remote = "someorg".to_string();
        config.target.branch = "XOS-8.1".to_string();
        config.github.token_file = "/custom/token".to_string();
        config.sync.args = vec!["sync".to_string(), "-c".to_string()];

        config.save(&config_path).expect("Failed to save config");

        let loaded_config = Config::load(&config_path).expect("Failed to load config");

        assert_eq!(loaded_config.target.remote, "someorg");
        assert_eq!(loaded_config.target.branch, "XOS-8.1");
        assert_eq!(loaded_config.github.token_file, "/custom/token");
        assert_eq!(loaded_config.sync.args, vec!["sync", "-c"]);
    }

    #[test]
    fn test_config_default_path_xdg() {
        let default_path = Config::default_config_path().expect("Failed to get default path");
        assert!(default_path.to_string_lossy().contains("roomservice"));
        assert!(default_path.to_string_lossy().ends_with("config.yml"));
    }

    #[test]
    fn test_yaml_parsing_with_partial_sections() {
        let yaml_content = r#"
target:
  remote: "someorg"
github:
  api_url: "http://localhost:8080"
  per_page: 30
manifest:
  remote_alias: "origin"
"#;

        let config: Config = serde_yaml::from_str(yaml_content).expect("Failed to parse YAML");

        assert_eq!(config.target.remote, "someorg");
        assert_eq!(config.target.branch, "XOS-7.0");
        assert_eq!(config.github.api_url, "http://localhost:8080");
        assert_eq!(config.github.per_page, 30);
        assert_eq!(config.github.token_file, "~/api_token");
        assert_eq!(config.manifest.remote_alias, "origin");
        assert_eq!(config.manifest.base, ".repo/manifest.xml");
        assert_eq!(config.dependencies.prefix, "XOS");
    }
}
