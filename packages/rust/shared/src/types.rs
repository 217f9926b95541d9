//! Core domain types for content-fragment resolution.

use serde::{Deserialize, Serialize};

/// Model title that marks a fragment as a pointer to a tag-driven list.
pub const DYNAMIC_CTA_LIST_MODEL: &str = "Dynamic CTA List";

/// Href emitted when a CTA cannot be resolved.
pub const UNRESOLVED_HREF: &str = "#";

/// Variation used when none is authored.
pub const DEFAULT_VARIATION: &str = "master";

// ---------------------------------------------------------------------------
// CtaReference
// ---------------------------------------------------------------------------

/// Repository reference carried by an object-shaped CTA.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRef {
    /// Repository path (`_path`), e.g. `/content/site/en/offers`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Fully-qualified URL on the authoring host (`_authorUrl`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_url: Option<String>,
    /// Fully-qualified URL on the publish host (`_publishUrl`, falling back to `_url`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_url: Option<String>,
}

/// A CTA link target as authored on a fragment.
///
/// The headless endpoint returns either a bare string or a reference object;
/// both shapes are captured here so resolution can match exhaustively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CtaReference {
    /// A literal URL or site-relative path.
    PlainUrl(String),
    /// A reference to a repository resource.
    PathRef(PathRef),
}

// ---------------------------------------------------------------------------
// ContentFragment
// ---------------------------------------------------------------------------

/// Environment-specific renditions of the fragment's banner image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannerImage {
    pub author_url: Option<String>,
    pub publish_url: Option<String>,
}

/// A structured content record as returned by the headless endpoint,
/// normalized so that absent text is an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFragment {
    pub title: String,
    pub subtitle: String,
    /// Description markup (rich text), or its plaintext when no markup is available.
    pub description: String,
    pub banner_image: BannerImage,
    pub cta: Option<CtaReference>,
    pub cta_label: String,
    /// Title of the content model this fragment was authored against.
    pub model_title: String,
    /// Repository path of the fragment itself (`_path`).
    pub path: Option<String>,
    /// Variation the endpoint served (`_variation`).
    pub variation: Option<String>,
}

impl ContentFragment {
    /// Whether this fragment is a dynamic list that must be expanded by tag.
    pub fn is_dynamic_list(&self) -> bool {
        self.model_title == DYNAMIC_CTA_LIST_MODEL
    }

    /// Image URL appropriate for the given environment, or `""`.
    pub fn image_url(&self, is_author: bool) -> &str {
        let url = if is_author {
            self.banner_image.author_url.as_deref()
        } else {
            self.banner_image.publish_url.as_deref()
        };
        url.unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// DynamicListSeed
// ---------------------------------------------------------------------------

/// The starting point of a dynamic list expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicListSeed {
    /// Repository path of the list fragment.
    pub list_path: String,
    /// Variation of the list fragment.
    pub variation: String,
    /// Tags to fetch items for, in submission order.
    pub tags: Vec<String>,
}

// ---------------------------------------------------------------------------
// RenderRecord
// ---------------------------------------------------------------------------

/// The pipeline's normalized output unit, ready for presentation.
///
/// Every text field is present; absent source values are empty strings and
/// `href` falls back to [`UNRESOLVED_HREF`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRecord {
    /// Editor resource URN for the fragment variation.
    pub item_id: String,
    pub image_url: String,
    pub href: String,
    pub title: String,
    pub subtitle: String,
    pub description_html: String,
    pub cta_label: String,
}

impl RenderRecord {
    /// Build the editor resource URN for a fragment path and variation.
    pub fn item_id_for(content_path: &str, variation: &str) -> String {
        format!("urn:aemconnection:{content_path}/jcr:content/data/{variation}")
    }
}
