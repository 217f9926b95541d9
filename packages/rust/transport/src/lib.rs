//! Request building and the content-fetch boundary.
//!
//! - [`RequestBuilder`] turns a [`QueryRequest`] into an environment-specific
//!   [`TransportRequest`].
//! - [`ContentFetcher`] is the network seam; [`HttpFetcher`] implements it
//!   with `reqwest`. A request is attempted once and never retried.

mod request;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use ctaflow_shared::{CtaFlowError, Result};

pub use request::{
    Clock, FixedClock, FragmentContext, HttpMethod, QueryParams, QueryRequest, RequestBuilder,
    SystemClock, TransportRequest,
};

/// Default timeout in seconds for content queries.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// User-Agent string for content requests.
const USER_AGENT: &str = concat!("ctaflow/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// ContentFetcher
// ---------------------------------------------------------------------------

/// Performs one network round-trip and returns the parsed JSON body.
///
/// Failures are reported as [`CtaFlowError::Transport`] (non-2xx),
/// [`CtaFlowError::Parse`] (body is not JSON) or [`CtaFlowError::Network`].
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, request: &TransportRequest) -> Result<serde_json::Value>;
}

// ---------------------------------------------------------------------------
// HttpFetcher
// ---------------------------------------------------------------------------

/// Options for the HTTP client.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Timeout for HTTP requests in seconds.
    pub timeout_secs: u64,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// [`ContentFetcher`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Build a fetcher with its own HTTP client.
    pub fn new(opts: &FetchOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(opts.timeout_secs))
            .build()
            .map_err(|e| CtaFlowError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    #[instrument(skip_all, fields(method = %request.method, url = %request.url))]
    async fn fetch(&self, request: &TransportRequest) -> Result<serde_json::Value> {
        let url = &request.url;

        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.to_string());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CtaFlowError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CtaFlowError::Transport {
                status: status.as_u16(),
                url: url.clone(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| CtaFlowError::Network(format!("{url}: failed to read body: {e}")))?;

        debug!(bytes = body.len(), "content response received");

        serde_json::from_str(&body).map_err(|e| CtaFlowError::parse(format!("{url}: {e}")))
    }
}
