//! Transport request construction for persisted queries.
//!
//! Author mode talks to the authoring host directly with a `GET` whose
//! parameters are `;`-separated path segments. Publish mode goes through a
//! wrapper service with a JSON `POST`. Every request carries a fresh `ts`
//! cache-buster taken from the injected [`Clock`].

use std::sync::Arc;

use serde::Serialize;

use ctaflow_shared::Environment;

/// Parameter keys that travel in the wrapper body rather than the query path.
const FRAGMENT_KEYS: [&str; 2] = ["path", "variation"];

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of cache-busting timestamps.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock frozen at a single instant, for deterministic requests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Query request
// ---------------------------------------------------------------------------

/// Ordered `key=value` parameters. Serialization order is insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter, keeping earlier ones in place.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.push((key.into(), value.into()));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `k=v` segments, in order.
    fn segments(&self) -> impl Iterator<Item = String> + '_ {
        self.iter().map(|(k, v)| format!("{k}={v}"))
    }
}

/// The fragment a query is issued on behalf of. The wrapper service needs it
/// for every publish-side request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentContext {
    pub path: String,
    pub variation: String,
}

/// A persisted query invocation, independent of environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    /// Persisted query identifier, e.g. `/graphql/execute.json/site/CTAByPath`.
    pub query_id: String,
    pub params: QueryParams,
    pub fragment: FragmentContext,
}

impl QueryRequest {
    /// Query addressed by fragment path and variation.
    pub fn by_path(
        query_id: impl Into<String>,
        path: impl Into<String>,
        variation: impl Into<String>,
    ) -> Self {
        let path = path.into();
        let variation = variation.into();
        Self {
            query_id: query_id.into(),
            params: QueryParams::new()
                .with("path", path.clone())
                .with("variation", variation.clone()),
            fragment: FragmentContext { path, variation },
        }
    }

    /// Query addressed by tag, issued on behalf of a list fragment.
    pub fn by_tag(
        query_id: impl Into<String>,
        tag: impl Into<String>,
        list_path: impl Into<String>,
        list_variation: impl Into<String>,
    ) -> Self {
        Self {
            query_id: query_id.into(),
            params: QueryParams::new().with("tag", tag),
            fragment: FragmentContext {
                path: list_path.into(),
                variation: list_variation.into(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Transport request
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post => f.write_str("POST"),
        }
    }
}

/// A fully-built request, ready for a [`crate::ContentFetcher`].
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub url: String,
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

/// JSON body accepted by the publish-side wrapper service.
#[derive(Debug, Serialize)]
struct WrapperBody<'a> {
    #[serde(rename = "graphQLPath")]
    graphql_path: String,
    #[serde(rename = "cfPath")]
    cf_path: &'a str,
    variation: String,
}

// ---------------------------------------------------------------------------
// RequestBuilder
// ---------------------------------------------------------------------------

/// Builds [`TransportRequest`]s for the current environment.
///
/// Not idempotent: each call stamps the request with the clock's current time.
/// Inputs are not validated.
#[derive(Clone)]
pub struct RequestBuilder {
    wrapper_url: String,
    clock: Arc<dyn Clock>,
}

impl RequestBuilder {
    pub fn new(wrapper_url: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            wrapper_url: wrapper_url.into(),
            clock,
        }
    }

    /// Build the request for `query` in `env`.
    pub fn build(&self, query: &QueryRequest, env: &Environment) -> TransportRequest {
        let ts = self.clock.now_millis();
        let headers = vec![("Content-Type".to_string(), "application/json".to_string())];

        if env.is_author {
            let segments: Vec<String> = query
                .params
                .segments()
                .chain(std::iter::once(format!("ts={ts}")))
                .collect();

            return TransportRequest {
                url: format!(
                    "{}{};{}",
                    env.author_base_url,
                    query.query_id,
                    segments.join(";")
                ),
                method: HttpMethod::Get,
                headers,
                body: None,
            };
        }

        let extra: Vec<String> = query
            .params
            .iter()
            .filter(|(k, _)| !FRAGMENT_KEYS.contains(k))
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        let mut graphql_path = format!("{}{}", env.publish_base_url, query.query_id);
        if !extra.is_empty() {
            graphql_path.push(';');
            graphql_path.push_str(&extra.join(";"));
            graphql_path.push_str(&format!(";ts={ts}"));
        }

        let body = WrapperBody {
            graphql_path,
            cf_path: &query.fragment.path,
            variation: format!("{};ts={ts}", query.fragment.variation),
        };

        TransportRequest {
            url: self.wrapper_url.clone(),
            method: HttpMethod::Post,
            headers,
            // Serializing a struct of strings cannot fail.
            body: serde_json::to_value(&body).ok(),
        }
    }
}

impl std::fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("wrapper_url", &self.wrapper_url)
            .finish_non_exhaustive()
    }
}
