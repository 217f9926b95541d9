//! Per-call deployment environment (author vs. publish).
//!
//! Environment detection itself happens outside ctaflow; callers hand in a
//! pre-computed [`Environment`] value, usually through an [`EnvironmentProvider`].

use serde::{Deserialize, Serialize};

/// Deployment context for one resolution call. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Whether the caller is rendering inside the authoring host.
    pub is_author: bool,
    /// Base URL of the authoring host, without trailing slash.
    pub author_base_url: String,
    /// Base URL of the publish host, without trailing slash.
    pub publish_base_url: String,
}

impl Environment {
    /// Authoring-mode environment.
    pub fn author(author_base_url: impl Into<String>, publish_base_url: impl Into<String>) -> Self {
        Self {
            is_author: true,
            author_base_url: author_base_url.into(),
            publish_base_url: publish_base_url.into(),
        }
    }

    /// Publish-mode environment.
    pub fn publish(author_base_url: impl Into<String>, publish_base_url: impl Into<String>) -> Self {
        Self {
            is_author: false,
            author_base_url: author_base_url.into(),
            publish_base_url: publish_base_url.into(),
        }
    }

    /// Base URL that relative references are prefixed with in this environment.
    pub fn active_base_url(&self) -> &str {
        if self.is_author {
            &self.author_base_url
        } else {
            &self.publish_base_url
        }
    }

    /// Label used in logs.
    pub fn mode(&self) -> &'static str {
        if self.is_author { "author" } else { "publish" }
    }
}

/// Supplies the environment snapshot for a resolution call.
pub trait EnvironmentProvider: Send + Sync {
    fn environment(&self) -> Environment;
}

/// Derive the publish base URL from an author hostname.
///
/// The first `author` in the hostname becomes `publish` and a single
/// trailing slash is dropped.
pub fn derive_publish_url(hostname: &str) -> String {
    let swapped = hostname.replacen("author", "publish", 1);
    match swapped.strip_suffix('/') {
        Some(trimmed) => trimmed.to_string(),
        None => swapped,
    }
}
