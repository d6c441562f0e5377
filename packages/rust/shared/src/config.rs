//! Application configuration for SeedHub.
//!
//! User config lives at `~/.seedhub/seedhub.toml`.
//! CLI flags (and their env fallbacks) override config file values, which
//! override defaults. The resolved [`HubConfig`] is built once at startup and
//! passed by reference; core code never reads the environment itself.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HubError, Result};
use crate::types::ManifestKind;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "seedhub.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".seedhub";

/// Hub row name when neither `owner/repo` nor the root directory names it.
const DEFAULT_HUB_NAME: &str = "hub";

// ---------------------------------------------------------------------------
// Config structs (matching seedhub.toml schema)
// ---------------------------------------------------------------------------

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default)]
    pub hub: HubSection,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub outputs: OutputsConfig,

    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub manifests: ManifestPaths,

    #[serde(default)]
    pub merge: MergeConfig,
}

/// `[hub]` section: the repository the index is published from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubSection {
    /// Hub repository owner. The local hub row is skipped when empty.
    #[serde(default)]
    pub owner: String,

    /// Hub repository name.
    #[serde(default)]
    pub repo: String,

    /// Branch recorded for the locally synthesized hub row.
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Local checkout of the hub repository.
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

impl Default for HubSection {
    fn default() -> Self {
        Self {
            owner: String::new(),
            repo: String::new(),
            branch: default_branch(),
            root: default_root(),
        }
    }
}

impl HubSection {
    /// `owner/repo`, or `None` if the hub is not configured.
    pub fn full_name(&self) -> Option<String> {
        if self.owner.is_empty() || self.repo.is_empty() {
            None
        } else {
            Some(format!("{}/{}", self.owner, self.repo))
        }
    }
}

fn default_branch() -> String {
    "main".into()
}
fn default_root() -> PathBuf {
    PathBuf::from(".")
}

/// `[sources]` section: where the tracked repository list comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Declarative registry (`modules: [{owner, repo}]`), relative to the hub root.
    #[serde(default = "default_registry_path")]
    pub registry_path: PathBuf,

    /// Topic used for discovery when the registry is empty.
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Restrict discovery to repositories of this user/org. Falls back to `hub.owner`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_owner: Option<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            registry_path: default_registry_path(),
            topic: default_topic(),
            topic_owner: None,
        }
    }
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("registry/modules.yml")
}
fn default_topic() -> String {
    "seed-module".into()
}

/// `[outputs]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputsConfig {
    /// Persisted index, relative to the hub root. `.json` or `.yml`.
    #[serde(default = "default_artifact_path")]
    pub artifact_path: PathBuf,

    /// Document carrying the health markers, relative to the hub root.
    #[serde(default = "default_document_path")]
    pub document_path: PathBuf,
}

impl Default for OutputsConfig {
    fn default() -> Self {
        Self {
            artifact_path: default_artifact_path(),
            document_path: default_document_path(),
        }
    }
}

fn default_artifact_path() -> PathBuf {
    PathBuf::from("pulse/module_index.json")
}
fn default_document_path() -> PathBuf {
    PathBuf::from("README.md")
}

/// `[github]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// REST API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Raw content base URL.
    #[serde(default = "default_raw_base")]
    pub raw_base: String,

    /// Name of the env var holding the token (never store the token itself).
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            raw_base: default_raw_base(),
            token_env: default_token_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl GitHubConfig {
    /// Read the token from the configured env var; empty counts as unset.
    pub fn token_from_env(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

fn default_api_base() -> String {
    "https://api.github.com".into()
}
fn default_raw_base() -> String {
    "https://raw.githubusercontent.com".into()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".into()
}
fn default_timeout_secs() -> u64 {
    20
}

/// `[manifests]` section: repository-relative manifest paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestPaths {
    #[serde(default = "default_statuses")]
    pub statuses: String,
    #[serde(default = "default_glossary")]
    pub glossary: String,
    #[serde(default = "default_tags")]
    pub tags: String,
}

impl Default for ManifestPaths {
    fn default() -> Self {
        Self {
            statuses: default_statuses(),
            glossary: default_glossary(),
            tags: default_tags(),
        }
    }
}

impl ManifestPaths {
    pub fn path(&self, kind: ManifestKind) -> &str {
        match kind {
            ManifestKind::Statuses => &self.statuses,
            ManifestKind::Glossary => &self.glossary,
            ManifestKind::Tags => &self.tags,
        }
    }
}

fn default_statuses() -> String {
    "seeds/statuses.yml".into()
}
fn default_glossary() -> String {
    "seeds/glossary.yml".into()
}
fn default_tags() -> String {
    "seeds/tags.yml".into()
}

/// `[merge]` section: hub-merge and harvest modes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Merge plan, relative to the hub root.
    #[serde(default = "default_plan_path")]
    pub plan_path: PathBuf,

    /// Seed file names collected by `harvest` from each module's `seeds/`.
    #[serde(default = "default_harvest_seeds")]
    pub harvest_seeds: Vec<String>,

    /// Output directory for harvested seeds, relative to the hub root.
    #[serde(default = "default_harvest_out_dir")]
    pub harvest_out_dir: PathBuf,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            plan_path: default_plan_path(),
            harvest_seeds: default_harvest_seeds(),
            harvest_out_dir: default_harvest_out_dir(),
        }
    }
}

fn default_plan_path() -> PathBuf {
    PathBuf::from("pulse/merge_plan.yml")
}
fn default_harvest_seeds() -> Vec<String> {
    vec!["glossary.yml".into(), "tags.yml".into()]
}
fn default_harvest_out_dir() -> PathBuf {
    PathBuf::from("seeds")
}

impl HubConfig {
    /// Resolve a hub-relative path against `hub.root`; absolute paths pass through.
    pub fn hub_path(&self, relative: &Path) -> PathBuf {
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.hub.root.join(relative)
        }
    }

    /// Name of the hub's own index row: `owner/repo` when configured, else
    /// the name of the hub root directory, else `hub`.
    pub fn hub_name(&self) -> String {
        if let Some(full) = self.hub.full_name() {
            return full;
        }
        std::fs::canonicalize(&self.hub.root)
            .unwrap_or_else(|_| self.hub.root.clone())
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty() && *n != ".")
            .map(str::to_string)
            .unwrap_or_else(|| DEFAULT_HUB_NAME.to_string())
    }

    /// Owner to scope topic discovery to, if any.
    pub fn discovery_owner(&self) -> Option<&str> {
        self.sources
            .topic_owner
            .as_deref()
            .or(Some(self.hub.owner.as_str()))
            .filter(|o| !o.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.seedhub/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| HubError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.seedhub/seedhub.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the config from the default location. Returns defaults if the file does not exist.
pub fn load_config() -> Result<HubConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(HubConfig::default());
    }

    load_config_from(&path)
}

/// Load the config from a specific file path. The file must exist.
pub fn load_config_from(path: &Path) -> Result<HubConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| HubError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| HubError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| HubError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = HubConfig::default();
    let content = toml::to_string_pretty(&config).map_err(|e| HubError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| HubError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
