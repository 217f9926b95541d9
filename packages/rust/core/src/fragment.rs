//! Extraction of content fragments from query responses, and their
//! conversion into [`RenderRecord`]s.
//!
//! Responses are read leniently: a missing or oddly-typed field becomes an
//! empty string (or an absent CTA) rather than an error. Only a missing item
//! is reported, as [`CtaFlowError::MissingData`].

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use ctaflow_resolver::ReferenceResolver;
use ctaflow_shared::{
    BannerImage, ContentFragment, CtaFlowError, CtaReference, Environment, PathRef, RenderRecord,
    Result,
};

/// Raw fragment as the endpoint returns it. Every field is optional and untyped.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawFragment {
    title: Value,
    subtitle: Value,
    description: Value,
    bannerimage: Value,
    ctaurl: Value,
    ctalabel: Value,
    #[serde(rename = "_model")]
    model: Value,
    #[serde(rename = "_path")]
    path: Value,
    #[serde(rename = "_variation")]
    variation: Value,
}

// ---------------------------------------------------------------------------
// Response extraction
// ---------------------------------------------------------------------------

/// The fragment returned by the by-path query (`data.ctaByPath.item`).
pub fn extract_single(response: &Value) -> Result<ContentFragment> {
    let item = response.pointer("/data/ctaByPath/item").filter(|v| !v.is_null());
    match item {
        Some(item) => parse_fragment(item),
        None => Err(CtaFlowError::missing_data(
            "no data.ctaByPath.item in response",
        )),
    }
}

/// The tag a dynamic list points at (`data.dynamicCtaListByPath.item.tags[0]`).
pub fn extract_list_tag(response: &Value) -> Result<String> {
    let tags = response
        .pointer("/data/dynamicCtaListByPath/item/tags")
        .ok_or_else(|| CtaFlowError::missing_data("no data.dynamicCtaListByPath.item.tags in response"))?;

    match tags {
        Value::Array(values) => values
            .first()
            .map(text)
            .ok_or_else(|| CtaFlowError::missing_data("dynamic list has no tags")),
        Value::String(tag) => Ok(tag.clone()),
        other => Err(CtaFlowError::missing_data(format!(
            "unexpected tags value: {other}"
        ))),
    }
}

/// Every fragment returned by the by-tag query (`data.ctaList.items`), in response order.
pub fn extract_tagged_items(response: &Value) -> Result<Vec<ContentFragment>> {
    let items = response
        .pointer("/data/ctaList/items")
        .and_then(Value::as_array)
        .ok_or_else(|| CtaFlowError::missing_data("no data.ctaList.items array in response"))?;

    let fragments = items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match parse_fragment(item) {
            Ok(fragment) => Some(fragment),
            Err(e) => {
                warn!(index, error = %e, "skipping malformed list item");
                None
            }
        })
        .collect();

    Ok(fragments)
}

/// Parse one fragment object.
pub fn parse_fragment(item: &Value) -> Result<ContentFragment> {
    if !item.is_object() {
        return Err(CtaFlowError::missing_data(format!(
            "fragment is not an object: {item}"
        )));
    }
    let raw = RawFragment::deserialize(item)
        .map_err(|e| CtaFlowError::missing_data(format!("unreadable fragment: {e}")))?;

    Ok(ContentFragment {
        title: text(&raw.title),
        subtitle: text(&raw.subtitle),
        description: description(&raw.description),
        banner_image: BannerImage {
            author_url: optional_text(raw.bannerimage.get("_authorUrl")),
            publish_url: optional_text(raw.bannerimage.get("_publishUrl")),
        },
        cta: parse_cta(&raw.ctaurl),
        cta_label: text(&raw.ctalabel),
        model_title: raw.model.get("title").map(text).unwrap_or_default(),
        path: optional_text(Some(&raw.path)),
        variation: optional_text(Some(&raw.variation)),
    })
}

/// Map the polymorphic `ctaurl` field onto [`CtaReference`].
fn parse_cta(value: &Value) -> Option<CtaReference> {
    match value {
        Value::String(url) if !url.is_empty() => Some(CtaReference::PlainUrl(url.clone())),
        Value::Object(fields) => Some(CtaReference::PathRef(PathRef {
            path: optional_text(fields.get("_path")),
            author_url: optional_text(fields.get("_authorUrl")),
            publish_url: optional_text(fields.get("_publishUrl"))
                .or_else(|| optional_text(fields.get("_url"))),
        })),
        _ => None,
    }
}

/// Rich-text description: markup if present, plaintext otherwise.
fn description(value: &Value) -> String {
    match value {
        Value::Object(_) => optional_text(value.get("html"))
            .or_else(|| optional_text(value.get("plaintext")))
            .unwrap_or_default(),
        other => text(other),
    }
}

/// Scalar as display text; anything else is `""`.
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn optional_text(value: Option<&Value>) -> Option<String> {
    value.map(text).filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Convert a fragment into its render record, resolving the CTA href.
pub async fn render_record(
    fragment: &ContentFragment,
    item_id: &str,
    resolver: &ReferenceResolver,
    env: &Environment,
) -> RenderRecord {
    let href = resolver.resolve(fragment.cta.as_ref(), env).await;

    RenderRecord {
        item_id: item_id.to_string(),
        image_url: fragment.image_url(env.is_author).to_string(),
        href,
        title: fragment.title.clone(),
        subtitle: fragment.subtitle.clone(),
        description_html: fragment.description.clone(),
        cta_label: fragment.cta_label.clone(),
    }
}
