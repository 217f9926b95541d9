//! Dynamic CTA list expansion.
//!
//! A fragment resolves through a small state machine:
//!
//! ```text
//! Single ───────────────────────────────────────────────► AllResolved
//! ListSeed(Discover) ──list query──┐
//!                                  ├──► FetchByTag ──────► AllResolved
//! ListSeed(Explicit tags) ─────────┘         (any failure) ► Aborted
//! ```
//!
//! `FetchByTag` issues one by-tag query per tag concurrently. A failing tag
//! contributes no records; the others are kept, in tag submission order.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use ctaflow_resolver::ReferenceResolver;
use ctaflow_shared::{
    ContentFragment, CtaFlowError, DEFAULT_VARIATION, DynamicListSeed, Environment, RenderRecord,
    Result,
};
use ctaflow_transport::{ContentFetcher, QueryRequest, RequestBuilder};

use crate::fragment::{extract_list_tag, extract_tagged_items, render_record};

/// Where a list's tags come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagSource {
    /// Ask the list-by-path query for the list's tag.
    Discover,
    /// Tags supplied by the caller; entries may hold comma-separated lists.
    Explicit(Vec<String>),
}

/// One step of a fragment's resolution.
#[derive(Debug)]
pub enum ExpansionState {
    /// A plain fragment: exactly one record.
    Single(ContentFragment),
    /// A dynamic list whose tags are not yet known.
    ListSeed {
        list_path: String,
        variation: String,
        source: TagSource,
    },
    /// Tags are known; items are fetched per tag.
    FetchByTag(DynamicListSeed),
    /// Terminal: every surviving record, possibly none.
    AllResolved(Vec<RenderRecord>),
    /// Terminal: the fragment's discovery chain failed.
    Aborted(CtaFlowError),
}

impl ExpansionState {
    /// Initial state for a fetched primary fragment.
    ///
    /// A dynamic list seeds from its own `_path`/`_variation`, falling back to
    /// the path it was requested by and the default variation.
    pub fn classify(fragment: ContentFragment, requested_path: &str) -> Self {
        if !fragment.is_dynamic_list() {
            return Self::Single(fragment);
        }
        Self::ListSeed {
            list_path: fragment
                .path
                .unwrap_or_else(|| requested_path.to_string()),
            variation: fragment
                .variation
                .unwrap_or_else(|| DEFAULT_VARIATION.to_string()),
            source: TagSource::Discover,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::AllResolved(_) | Self::Aborted(_))
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Single(_) => "single",
            Self::ListSeed { .. } => "list_seed",
            Self::FetchByTag(_) => "fetch_by_tag",
            Self::AllResolved(_) => "all_resolved",
            Self::Aborted(_) => "aborted",
        }
    }
}

/// Split, trim and drop empty tags, keeping first-seen order.
///
/// `["a", "", ",b"]` becomes `["a", "b"]`.
pub fn split_tags<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    raw.iter()
        .flat_map(|entry| entry.as_ref().split(','))
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(String::from)
        .collect()
}

/// Drives [`ExpansionState`] to a terminal state.
#[derive(Clone)]
pub struct DynamicListExpander {
    fetcher: Arc<dyn ContentFetcher>,
    requests: RequestBuilder,
    resolver: ReferenceResolver,
    list_by_path_query: String,
    by_tag_query: String,
}

impl DynamicListExpander {
    pub fn new(
        fetcher: Arc<dyn ContentFetcher>,
        requests: RequestBuilder,
        resolver: ReferenceResolver,
        list_by_path_query: impl Into<String>,
        by_tag_query: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            requests,
            resolver,
            list_by_path_query: list_by_path_query.into(),
            by_tag_query: by_tag_query.into(),
        }
    }

    /// Run `state` until it is terminal. `item_id` is stamped on every record.
    pub async fn run(
        &self,
        mut state: ExpansionState,
        item_id: &str,
        env: &Environment,
    ) -> ExpansionState {
        while !state.is_terminal() {
            debug!(state = state.name(), "expansion step");
            state = self.step(state, item_id, env).await;
        }
        state
    }

    /// Advance one state.
    pub async fn step(
        &self,
        state: ExpansionState,
        item_id: &str,
        env: &Environment,
    ) -> ExpansionState {
        match state {
            ExpansionState::Single(fragment) => {
                let record = render_record(&fragment, item_id, &self.resolver, env).await;
                ExpansionState::AllResolved(vec![record])
            }
            ExpansionState::ListSeed {
                list_path,
                variation,
                source,
            } => {
                let raw_tags = match source {
                    TagSource::Explicit(tags) => tags,
                    TagSource::Discover => {
                        match self.discover_tag(&list_path, &variation, env).await {
                            Ok(tag) => vec![tag],
                            Err(e) => return ExpansionState::Aborted(e),
                        }
                    }
                };
                ExpansionState::FetchByTag(DynamicListSeed {
                    list_path,
                    variation,
                    tags: split_tags(raw_tags.as_slice()),
                })
            }
            ExpansionState::FetchByTag(seed) => {
                if seed.tags.is_empty() {
                    warn!(list_path = %seed.list_path, "dynamic list has no usable tags, nothing to fetch");
                    return ExpansionState::AllResolved(Vec::new());
                }
                ExpansionState::AllResolved(self.fetch_all_tags(&seed, item_id, env).await)
            }
            terminal => terminal,
        }
    }

    /// Ask the list-by-path query which tag the list points at.
    async fn discover_tag(&self, list_path: &str, variation: &str, env: &Environment) -> Result<String> {
        let query = QueryRequest::by_path(&self.list_by_path_query, list_path, variation);
        let request = self.requests.build(&query, env);
        let response = self.fetcher.fetch(&request).await?;
        let tag = extract_list_tag(&response)?;
        info!(list_path, tag = %tag, "dynamic list tag discovered");
        Ok(tag)
    }

    /// Fetch every tag concurrently; results keep tag submission order.
    async fn fetch_all_tags(
        &self,
        seed: &DynamicListSeed,
        item_id: &str,
        env: &Environment,
    ) -> Vec<RenderRecord> {
        let fetches = seed
            .tags
            .iter()
            .map(|tag| self.fetch_tag(tag, seed, item_id, env));

        let mut records = Vec::new();
        for (tag, result) in seed.tags.iter().zip(join_all(fetches).await) {
            match result {
                Ok(tag_records) => {
                    debug!(tag = %tag, count = tag_records.len(), "tag resolved");
                    records.extend(tag_records);
                }
                Err(e) => warn!(
                    tag = %tag,
                    list_path = %seed.list_path,
                    variation = %seed.variation,
                    is_author = env.is_author,
                    kind = e.kind(),
                    error = %e,
                    "tag fetch failed, tag contributes no records"
                ),
            }
        }
        records
    }

    async fn fetch_tag(
        &self,
        tag: &str,
        seed: &DynamicListSeed,
        item_id: &str,
        env: &Environment,
    ) -> Result<Vec<RenderRecord>> {
        let query = QueryRequest::by_tag(&self.by_tag_query, tag, &seed.list_path, &seed.variation);
        let request = self.requests.build(&query, env);
        let response = self.fetcher.fetch(&request).await?;
        let fragments = extract_tagged_items(&response)?;

        let renders = fragments
            .iter()
            .map(|fragment| render_record(fragment, item_id, &self.resolver, env));
        Ok(join_all(renders).await)
    }
}

impl std::fmt::Debug for DynamicListExpander {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicListExpander")
            .field("list_by_path_query", &self.list_by_path_query)
            .field("by_tag_query", &self.by_tag_query)
            .finish_non_exhaustive()
    }
}
