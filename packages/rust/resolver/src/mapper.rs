//! Repository-path → site-path mapping.
//!
//! On publish, CTA targets authored as repository paths (`/content/...`) must be
//! rewritten into the published site's URL space. The site declares the rewrite
//! rules in a `paths.json` of the form:
//!
//! ```json
//! { "mappings": ["/content/site/:/", "/content/site/footer:/footer"] }
//! ```
//!
//! A source ending in `/` maps a whole subtree; any other source maps one path.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use ctaflow_shared::{CtaFlowError, Result};

/// Timeout for fetching `paths.json`.
const PATHS_JSON_TIMEOUT_SECS: u64 = 10;

/// Async lookup from repository path to site path.
///
/// `Ok(None)` means there is no mapping for the path. Errors are reported to
/// the caller, which keeps the unmapped href.
#[async_trait]
pub trait PathMapper: Send + Sync {
    async fn map_path(&self, path: &str) -> Result<Option<String>>;
}

/// Mapper with no mappings.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPathMapper;

#[async_trait]
impl PathMapper for NoopPathMapper {
    async fn map_path(&self, _path: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// MappingTable
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PathsJson {
    #[serde(default)]
    mappings: Vec<String>,
}

/// Parsed `source:target` rules, longest source first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingTable {
    rules: Vec<(String, String)>,
}

impl MappingTable {
    /// Parse the body of a `paths.json` file. Malformed rules are skipped.
    pub fn from_json(body: &str) -> Result<Self> {
        let parsed: PathsJson = serde_json::from_str(body)
            .map_err(|e| CtaFlowError::Mapping(format!("invalid paths.json: {e}")))?;
        Ok(Self::from_rules(parsed.mappings.iter().map(String::as_str)))
    }

    /// Build a table from `source:target` strings.
    pub fn from_rules<'a>(rules: impl IntoIterator<Item = &'a str>) -> Self {
        let mut rules: Vec<(String, String)> = rules
            .into_iter()
            .filter_map(|rule| {
                let (source, target) = rule.split_once(':')?;
                if source.is_empty() || target.is_empty() {
                    return None;
                }
                Some((source.to_string(), target.to_string()))
            })
            .collect();
        rules.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Map `path`, ignoring a trailing `.html`.
    pub fn lookup(&self, path: &str) -> Option<String> {
        let path = path.strip_suffix(".html").unwrap_or(path);

        for (source, target) in &self.rules {
            match source.strip_suffix('/') {
                Some(dir) => {
                    if path == dir {
                        return Some(target.clone());
                    }
                    if let Some(rest) = path.strip_prefix(source.as_str()) {
                        if rest.is_empty() {
                            return Some(target.clone());
                        }
                        return Some(format!("{}/{rest}", target.trim_end_matches('/')));
                    }
                }
                None if path == source.as_str() => return Some(target.clone()),
                None => {}
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// PathsJsonMapper
// ---------------------------------------------------------------------------

/// [`PathMapper`] that loads the site's `paths.json` on first use.
///
/// The file is fetched at most once. A failed load is logged and leaves the
/// mapper empty for its lifetime, so every later lookup misses.
#[derive(Debug)]
pub struct PathsJsonMapper {
    client: Client,
    url: String,
    table: OnceCell<Option<MappingTable>>,
}

impl PathsJsonMapper {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(PATHS_JSON_TIMEOUT_SECS))
            .build()
            .map_err(|e| CtaFlowError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, url))
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            table: OnceCell::new(),
        }
    }

    /// Mapper preloaded with a table; never touches the network.
    pub fn from_table(table: MappingTable) -> Self {
        Self {
            client: Client::new(),
            url: String::new(),
            table: OnceCell::new_with(Some(Some(table))),
        }
    }

    async fn table(&self) -> Option<&MappingTable> {
        self.table
            .get_or_init(|| async {
                match self.load().await {
                    Ok(table) => Some(table),
                    Err(e) => {
                        warn!(url = %self.url, error = %e, "paths.json unavailable, paths stay unmapped");
                        None
                    }
                }
            })
            .await
            .as_ref()
    }

    #[instrument(skip_all, fields(url = %self.url))]
    async fn load(&self) -> Result<MappingTable> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| CtaFlowError::Mapping(format!("{}: {e}", self.url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CtaFlowError::Mapping(format!("{}: HTTP {status}", self.url)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CtaFlowError::Mapping(format!("{}: failed to read body: {e}", self.url)))?;

        let table = MappingTable::from_json(&body)?;
        info!(rules = table.len(), "paths.json loaded");
        Ok(table)
    }
}

#[async_trait]
impl PathMapper for PathsJsonMapper {
    async fn map_path(&self, path: &str) -> Result<Option<String>> {
        let mapped = self.table().await.and_then(|table| table.lookup(path));
        debug!(path, mapped = mapped.as_deref().unwrap_or(""), "paths.json lookup");
        Ok(mapped)
    }
}
