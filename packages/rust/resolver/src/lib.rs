//! CTA reference → href resolution.
//!
//! Resolution has two halves:
//! - [`resolve_reference`]: a pure function of the reference and the environment
//! - [`ReferenceResolver::resolve`]: adds the publish-only path-mapping step,
//!   which can only ever replace the href, never fail the resolution

mod mapper;

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, warn};
use url::Url;

use ctaflow_shared::{CtaReference, Environment, PathRef, UNRESOLVED_HREF};

pub use mapper::{MappingTable, NoopPathMapper, PathMapper, PathsJsonMapper};

/// Default repository prefix for paths eligible for mapping.
pub const DEFAULT_CONTENT_PREFIX: &str = "/content/";

static ABSOLUTE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https?://").expect("valid absolute-URL pattern"));

/// Whether `href` is an absolute http(s) URL.
pub fn is_absolute(href: &str) -> bool {
    ABSOLUTE_URL.is_match(href)
}

/// Resolve a CTA reference for `env`, without path mapping.
pub fn resolve_reference(reference: Option<&CtaReference>, env: &Environment) -> String {
    match reference {
        None => UNRESOLVED_HREF.to_string(),
        Some(CtaReference::PlainUrl(url)) => resolve_plain(url, env),
        Some(CtaReference::PathRef(path_ref)) => resolve_path_ref(path_ref, env),
    }
}

fn resolve_plain(url: &str, env: &Environment) -> String {
    if url.is_empty() {
        return UNRESOLVED_HREF.to_string();
    }
    if is_absolute(url) {
        return url.to_string();
    }
    format!("{}{url}", env.active_base_url())
}

fn resolve_path_ref(path_ref: &PathRef, env: &Environment) -> String {
    let path = non_empty(&path_ref.path);

    if env.is_author {
        if let Some(author_url) = non_empty(&path_ref.author_url) {
            return author_url.to_string();
        }
        return match path {
            Some(path) => format!("{}{path}", env.author_base_url),
            None => UNRESOLVED_HREF.to_string(),
        };
    }

    // Publish paths are already site-relative; the mapping step handles the rest.
    path.or_else(|| non_empty(&path_ref.publish_url))
        .unwrap_or(UNRESOLVED_HREF)
        .to_string()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// ReferenceResolver
// ---------------------------------------------------------------------------

/// Resolves CTA references, mapping repository paths to site paths on publish.
#[derive(Clone)]
pub struct ReferenceResolver {
    mapper: Arc<dyn PathMapper>,
    content_prefix: String,
}

impl ReferenceResolver {
    pub fn new(mapper: Arc<dyn PathMapper>, content_prefix: impl Into<String>) -> Self {
        Self {
            mapper,
            content_prefix: content_prefix.into(),
        }
    }

    /// Resolver that never maps paths.
    pub fn unmapped() -> Self {
        Self::new(Arc::new(NoopPathMapper), DEFAULT_CONTENT_PREFIX)
    }

    /// Resolve `reference` to an href. Never fails; `"#"` means unresolved.
    pub async fn resolve(&self, reference: Option<&CtaReference>, env: &Environment) -> String {
        let href = resolve_reference(reference, env);
        if env.is_author {
            return href;
        }
        self.map_publish_href(href).await
    }

    async fn map_publish_href(&self, href: String) -> String {
        let candidate = if is_absolute(&href) {
            match Url::parse(&href) {
                Ok(url) => url.path().to_string(),
                Err(e) => {
                    warn!(%href, error = %e, "failed to parse CTA href for mapping");
                    return href;
                }
            }
        } else {
            href.clone()
        };

        if !candidate.starts_with(&self.content_prefix) {
            return href;
        }

        match self.mapper.map_path(&candidate).await {
            Ok(Some(mapped)) if !mapped.is_empty() => {
                debug!(from = %candidate, to = %mapped, "mapped CTA path");
                mapped
            }
            Ok(_) => href,
            Err(e) => {
                warn!(%href, error = %e, "failed to map CTA path, keeping unmapped href");
                href
            }
        }
    }
}

impl std::fmt::Debug for ReferenceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceResolver")
            .field("content_prefix", &self.content_prefix)
            .finish_non_exhaustive()
    }
}
