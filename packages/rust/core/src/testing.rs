//! Scripted [`ContentFetcher`] for pipeline tests.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use ctaflow_shared::{CtaFlowError, Result};
use ctaflow_transport::{ContentFetcher, TransportRequest};

enum Reply {
    Json(Value),
    Status(u16),
    Unparseable,
}

/// Answers requests from a list of `(pattern, reply)` rules.
///
/// A rule matches when its pattern occurs in the request key (the URL for
/// author requests, the body's `graphQLPath` for wrapper requests) and is
/// followed by `;` or the end of the key. Unmatched requests get a 404.
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    rules: Vec<(String, Reply)>,
    seen: Mutex<Vec<TransportRequest>>,
}

impl ScriptedFetcher {
    pub(crate) fn respond(mut self, pattern: &str, body: Value) -> Self {
        self.rules.push((pattern.to_string(), Reply::Json(body)));
        self
    }

    pub(crate) fn fail(mut self, pattern: &str, status: u16) -> Self {
        self.rules.push((pattern.to_string(), Reply::Status(status)));
        self
    }

    pub(crate) fn unparseable(mut self, pattern: &str) -> Self {
        self.rules.push((pattern.to_string(), Reply::Unparseable));
        self
    }

    pub(crate) fn request_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub(crate) fn requests(&self) -> Vec<TransportRequest> {
        self.seen.lock().unwrap().clone()
    }
}

fn request_key(request: &TransportRequest) -> String {
    request
        .body
        .as_ref()
        .and_then(|body| body.get("graphQLPath"))
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| request.url.clone())
}

fn matches(key: &str, pattern: &str) -> bool {
    key.match_indices(pattern).any(|(at, _)| {
        let rest = &key[at + pattern.len()..];
        rest.is_empty() || rest.starts_with(';')
    })
}

#[async_trait]
impl ContentFetcher for ScriptedFetcher {
    async fn fetch(&self, request: &TransportRequest) -> Result<Value> {
        self.seen.lock().unwrap().push(request.clone());
        let key = request_key(request);

        let reply = self
            .rules
            .iter()
            .find(|(pattern, _)| matches(&key, pattern))
            .map(|(_, reply)| reply);

        match reply {
            Some(Reply::Json(body)) => Ok(body.clone()),
            Some(Reply::Status(status)) => Err(CtaFlowError::Transport {
                status: *status,
                url: request.url.clone(),
            }),
            Some(Reply::Unparseable) => Err(CtaFlowError::parse(format!(
                "{}: expected value at line 1 column 1",
                request.url
            ))),
            None => Err(CtaFlowError::Transport {
                status: 404,
                url: request.url.clone(),
            }),
        }
    }
}
