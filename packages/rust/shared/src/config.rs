//! Application configuration for ctaflow.
//!
//! User config lives at `~/.ctaflow/ctaflow.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::environment::{Environment, EnvironmentProvider, derive_publish_url};
use crate::error::{CtaFlowError, Result};
use crate::types::DEFAULT_VARIATION;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "ctaflow.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".ctaflow";

// ---------------------------------------------------------------------------
// Config structs (matching ctaflow.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Deployment environment.
    #[serde(default)]
    pub environment: EnvironmentConfig,

    /// Remote endpoints.
    #[serde(default)]
    pub endpoints: EndpointsConfig,

    /// Persisted query identifiers.
    #[serde(default)]
    pub queries: QueriesConfig,

    /// The list fragment used for tag-driven resolution.
    #[serde(default)]
    pub dynamic_list: DynamicListConfig,

    /// Repository-path to site-path mapping.
    #[serde(default)]
    pub path_mapping: PathMappingConfig,
}

/// `[environment]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Whether requests run in authoring mode.
    #[serde(default)]
    pub is_author: bool,

    /// Authoring host base URL.
    #[serde(default)]
    pub author_url: String,

    /// Site hostname; the publish URL is derived from it when `publish_url` is unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Explicit publish host base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_url: Option<String>,
}

impl EnvironmentConfig {
    /// The effective publish base URL, or `""` when neither source is set.
    pub fn publish_base_url(&self) -> String {
        match (&self.publish_url, &self.hostname) {
            (Some(url), _) if !url.is_empty() => url.trim_end_matches('/').to_string(),
            (_, Some(host)) if !host.is_empty() => derive_publish_url(host),
            _ => String::new(),
        }
    }
}

impl From<&EnvironmentConfig> for Environment {
    fn from(config: &EnvironmentConfig) -> Self {
        Self {
            is_author: config.is_author,
            author_base_url: config.author_url.trim_end_matches('/').to_string(),
            publish_base_url: config.publish_base_url(),
        }
    }
}

/// The `[environment]` section is the environment source for CLI runs.
impl EnvironmentProvider for EnvironmentConfig {
    fn environment(&self) -> Environment {
        Environment::from(self)
    }
}

/// `[endpoints]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsConfig {
    /// Wrapper service that proxies publish-side queries.
    #[serde(default)]
    pub wrapper_service_url: String,

    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            wrapper_service_url: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

/// `[queries]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueriesConfig {
    /// Fetches one fragment by path and variation.
    #[serde(default = "default_cta_by_path")]
    pub cta_by_path: String,

    /// Fetches a dynamic list fragment (and its tags) by path.
    #[serde(default = "default_dynamic_list_by_path")]
    pub dynamic_list_by_path: String,

    /// Fetches every fragment carrying a tag.
    #[serde(default = "default_cta_list_by_tag")]
    pub cta_list_by_tag: String,
}

impl Default for QueriesConfig {
    fn default() -> Self {
        Self {
            cta_by_path: default_cta_by_path(),
            dynamic_list_by_path: default_dynamic_list_by_path(),
            cta_list_by_tag: default_cta_list_by_tag(),
        }
    }
}

fn default_cta_by_path() -> String {
    "/graphql/execute.json/ref-demo-eds/CTAByPath".into()
}
fn default_dynamic_list_by_path() -> String {
    "/graphql/execute.json/ref-demo-eds/DynamicCTAListByPath".into()
}
fn default_cta_list_by_tag() -> String {
    "/graphql/execute.json/ref-demo-eds/CTAListByTag".into()
}

/// `[dynamic_list]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicListConfig {
    /// Repository path of the list fragment used by tag-driven resolution.
    #[serde(default = "default_dynamic_list_path")]
    pub path: String,

    /// Variation of that fragment.
    #[serde(default = "default_variation")]
    pub variation: String,
}

impl Default for DynamicListConfig {
    fn default() -> Self {
        Self {
            path: default_dynamic_list_path(),
            variation: default_variation(),
        }
    }
}

fn default_dynamic_list_path() -> String {
    "/content/dam/fragments/dynamic-cta-list".into()
}
fn default_variation() -> String {
    DEFAULT_VARIATION.into()
}

/// `[path_mapping]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathMappingConfig {
    /// Only hrefs whose path starts with this prefix are mapped.
    #[serde(default = "default_content_prefix")]
    pub content_prefix: String,

    /// Location of the site's `paths.json`. Mapping is disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths_json_url: Option<String>,
}

impl Default for PathMappingConfig {
    fn default() -> Self {
        Self {
            content_prefix: default_content_prefix(),
            paths_json_url: None,
        }
    }
}

fn default_content_prefix() -> String {
    "/content/".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.ctaflow/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CtaFlowError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.ctaflow/ctaflow.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CtaFlowError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| CtaFlowError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CtaFlowError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CtaFlowError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CtaFlowError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the endpoints needed by the configured environment are present.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let env = &config.environment;

    if env.is_author {
        if env.author_url.is_empty() {
            return Err(CtaFlowError::config(
                "author mode requires [environment].author_url",
            ));
        }
        return Ok(());
    }

    if config.endpoints.wrapper_service_url.is_empty() {
        return Err(CtaFlowError::config(
            "publish mode requires [endpoints].wrapper_service_url",
        ));
    }
    if env.publish_base_url().is_empty() {
        return Err(CtaFlowError::config(
            "publish mode requires [environment].publish_url or [environment].hostname",
        ));
    }
    url::Url::parse(&config.endpoints.wrapper_service_url).map_err(|e| {
        CtaFlowError::config(format!(
            "invalid wrapper_service_url '{}': {e}",
            config.endpoints.wrapper_service_url
        ))
    })?;

    Ok(())
}
