//! End-to-end resolution: content path → primary query → expansion → records.

use std::sync::Arc;

use tracing::{error, info, instrument};

use ctaflow_resolver::{NoopPathMapper, PathMapper, PathsJsonMapper, ReferenceResolver};
use ctaflow_shared::{
    AppConfig, ContentFragment, CtaFlowError, DEFAULT_VARIATION, DynamicListConfig, Environment, QueriesConfig,
    RenderRecord, Result,
};
use ctaflow_transport::{
    ContentFetcher, FetchOptions, HttpFetcher, QueryRequest, RequestBuilder, SystemClock,
};

use crate::expander::{DynamicListExpander, ExpansionState, TagSource};
use crate::fragment::extract_single;

/// Query ids and list defaults used by the pipeline.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub queries: QueriesConfig,
    /// List fragment that tag-driven resolution runs on behalf of.
    pub dynamic_list: DynamicListConfig,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            queries: config.queries.clone(),
            dynamic_list: config.dynamic_list.clone(),
        }
    }
}

/// Normalize an authored variation name: trimmed, lowercase, spaces as
/// underscores, `master` when empty.
pub fn normalize_variation(raw: &str) -> String {
    let normalized = raw.trim().to_lowercase().replace(' ', "_");
    if normalized.is_empty() {
        DEFAULT_VARIATION.to_string()
    } else {
        normalized
    }
}

/// Composes request building, fetching, expansion and href resolution.
///
/// Both entry points are infallible: every failure is logged and turns into
/// fewer (possibly zero) records.
#[derive(Clone)]
pub struct ResolutionPipeline {
    fetcher: Arc<dyn ContentFetcher>,
    requests: RequestBuilder,
    expander: DynamicListExpander,
    config: PipelineConfig,
}

impl ResolutionPipeline {
    pub fn new(
        fetcher: Arc<dyn ContentFetcher>,
        requests: RequestBuilder,
        resolver: ReferenceResolver,
        config: PipelineConfig,
    ) -> Self {
        let expander = DynamicListExpander::new(
            fetcher.clone(),
            requests.clone(),
            resolver,
            config.queries.dynamic_list_by_path.clone(),
            config.queries.cta_list_by_tag.clone(),
        );
        Self {
            fetcher,
            requests,
            expander,
            config,
        }
    }

    /// Wire up the HTTP fetcher, wall clock and path mapper described by `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(&FetchOptions {
            timeout_secs: config.endpoints.timeout_secs,
        })?;

        let mapper: Arc<dyn PathMapper> = match &config.path_mapping.paths_json_url {
            Some(url) if !url.is_empty() => Arc::new(PathsJsonMapper::new(url.clone())?),
            _ => Arc::new(NoopPathMapper),
        };

        Ok(Self::new(
            Arc::new(fetcher),
            RequestBuilder::new(
                config.endpoints.wrapper_service_url.clone(),
                Arc::new(SystemClock),
            ),
            ReferenceResolver::new(mapper, config.path_mapping.content_prefix.clone()),
            PipelineConfig::from(config),
        ))
    }

    /// Resolve the fragment at `content_path` into render records.
    ///
    /// A plain fragment yields one record; a dynamic list yields one record per
    /// item of its tag, in response order.
    #[instrument(skip_all, fields(content_path = %content_path, variation = %variation, mode = env.mode()))]
    pub async fn resolve(
        &self,
        content_path: &str,
        variation: &str,
        env: &Environment,
    ) -> Vec<RenderRecord> {
        let variation = normalize_variation(variation);

        let state = match self.fetch_primary(content_path, &variation, env).await {
            Ok(fragment) => ExpansionState::classify(fragment, content_path),
            Err(e) => ExpansionState::Aborted(e),
        };

        let item_id = RenderRecord::item_id_for(content_path, &variation);
        let terminal = self.expander.run(state, &item_id, env).await;
        let records = finish(terminal, content_path, &variation, env);

        info!(count = records.len(), "fragment resolved");
        records
    }

    /// Resolve every item carrying one of `tags` on behalf of the configured
    /// dynamic list fragment.
    ///
    /// Entries may hold comma-separated lists; empty tags are skipped. A tag
    /// whose fetch fails contributes no records.
    #[instrument(skip_all, fields(tags = tags.len(), mode = env.mode()))]
    pub async fn resolve_by_tags<S: AsRef<str>>(
        &self,
        tags: &[S],
        env: &Environment,
    ) -> Vec<RenderRecord> {
        let list = &self.config.dynamic_list;
        let state = ExpansionState::ListSeed {
            list_path: list.path.clone(),
            variation: list.variation.clone(),
            source: TagSource::Explicit(tags.iter().map(|t| t.as_ref().to_string()).collect()),
        };

        let item_id = RenderRecord::item_id_for(&list.path, &list.variation);
        let terminal = self.expander.run(state, &item_id, env).await;
        let records = finish(terminal, &list.path, &list.variation, env);

        info!(count = records.len(), "tags resolved");
        records
    }

    async fn fetch_primary(
        &self,
        content_path: &str,
        variation: &str,
        env: &Environment,
    ) -> Result<ContentFragment> {
        let query = QueryRequest::by_path(&self.config.queries.cta_by_path, content_path, variation);
        let request = self.requests.build(&query, env);
        let response = self.fetcher.fetch(&request).await?;
        extract_single(&response)
    }
}

impl std::fmt::Debug for ResolutionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionPipeline")
            .field("requests", &self.requests)
            .field("expander", &self.expander)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Unwrap a terminal state, logging an aborted resolution with its context.
fn finish(
    state: ExpansionState,
    content_path: &str,
    variation: &str,
    env: &Environment,
) -> Vec<RenderRecord> {
    match state {
        ExpansionState::AllResolved(records) => records,
        ExpansionState::Aborted(e) => {
            log_abort(&e, content_path, variation, env);
            Vec::new()
        }
        other => {
            error!(?other, content_path, "expansion stopped in a non-terminal state");
            Vec::new()
        }
    }
}

fn log_abort(e: &CtaFlowError, content_path: &str, variation: &str, env: &Environment) {
    error!(
        kind = e.kind(),
        error = %e,
        content_path,
        variation,
        is_author = env.is_author,
        "content fragment resolution aborted"
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{Value, json};

    use ctaflow_resolver::{MappingTable, resolve_reference};
    use ctaflow_transport::FixedClock;

    use super::*;
    use crate::testing::ScriptedFetcher;

    const AUTHOR: &str = "https://author.example.com";
    const PUBLISH: &str = "https://publish.example.com";
    const WRAPPER: &str = "https://wrapper.example.com/fetch-cf";

    fn author() -> Environment {
        Environment::author(AUTHOR, PUBLISH)
    }

    fn publish() -> Environment {
        Environment::publish(AUTHOR, PUBLISH)
    }

    fn load_fixture(name: &str) -> Value {
        let path = format!("../../../fixtures/json/{name}");
        let content = std::fs::read_to_string(&path)
            .unwrap_or_else(|_| panic!("missing fixture: {path}"));
        serde_json::from_str(&content).expect("fixture is JSON")
    }

    fn pipeline(fetcher: Arc<ScriptedFetcher>) -> ResolutionPipeline {
        pipeline_with(fetcher, ReferenceResolver::unmapped())
    }

    fn pipeline_with(fetcher: Arc<ScriptedFetcher>, resolver: ReferenceResolver) -> ResolutionPipeline {
        ResolutionPipeline::new(
            fetcher,
            RequestBuilder::new(WRAPPER, Arc::new(FixedClock(1))),
            resolver,
            PipelineConfig::default(),
        )
    }

    fn queries() -> QueriesConfig {
        QueriesConfig::default()
    }

    #[test]
    fn variation_normalization() {
        assert_eq!(normalize_variation("  Summer Sale "), "summer_sale");
        assert_eq!(normalize_variation("MASTER"), "master");
        assert_eq!(normalize_variation(""), "master");
        assert_eq!(normalize_variation("   "), "master");
    }

    #[tokio::test]
    async fn single_fragment_yields_one_record() {
        let response = load_fixture("cta-by-path.fixture.json");
        let fetcher = Arc::new(ScriptedFetcher::default().respond(&queries().cta_by_path, response.clone()));

        let records = pipeline(fetcher.clone())
            .resolve("/content/dam/site/fragments/summer-cta", "master", &author())
            .await;

        assert_eq!(records.len(), 1);
        let fragment = extract_single(&response).unwrap();
        assert_eq!(records[0].href, resolve_reference(fragment.cta.as_ref(), &author()));
        assert_eq!(records[0].title, "Just Do It");
        assert_eq!(
            records[0].item_id,
            "urn:aemconnection:/content/dam/site/fragments/summer-cta/jcr:content/data/master"
        );

        let requests = fetcher.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].url.ends_with(";path=/content/dam/site/fragments/summer-cta;variation=master;ts=1"));
    }

    #[tokio::test]
    async fn dynamic_list_expands_to_tagged_items() {
        let q = queries();
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .respond(&q.cta_by_path, load_fixture("dynamic-list-by-path.fixture.json"))
                .respond(&q.dynamic_list_by_path, json!({
                    "data": { "dynamicCtaListByPath": { "item": { "tags": ["t1"] } } }
                }))
                .respond(&format!("{};tag=t1", q.cta_list_by_tag), load_fixture("cta-list-by-tag.fixture.json")),
        );

        let env = author();
        let records = pipeline(fetcher.clone())
            .resolve("/content/dam/site/fragments/summer-list", "master", &env)
            .await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "Run");
        assert_eq!(records[0].href, format!("{AUTHOR}/content/site/en/run"));
        assert_eq!(records[1].title, "Train");
        assert_eq!(records[1].href, "https://www.example.com/train");
        assert_eq!(records[1].image_url, "");
        assert_eq!(records[1].subtitle, "");

        let requests = fetcher.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[1].url.contains(";path=/content/dam/site/fragments/summer-list;variation=master;"));
    }

    #[tokio::test]
    async fn list_seed_fixture_flows_through_discovery() {
        let q = queries();
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .respond(&q.cta_by_path, load_fixture("dynamic-list-by-path.fixture.json"))
                .respond(&q.dynamic_list_by_path, load_fixture("dynamic-list-tags.fixture.json"))
                .respond(&format!("{};tag=site:summer", q.cta_list_by_tag), load_fixture("cta-list-by-tag.fixture.json")),
        );

        let records = pipeline(fetcher)
            .resolve("/content/dam/site/fragments/summer-list", "", &author())
            .await;
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn primary_failures_yield_no_records() {
        let q = queries();
        let env = author();

        let status = Arc::new(ScriptedFetcher::default().fail(&q.cta_by_path, 500));
        assert!(pipeline(status).resolve("/content/dam/x", "master", &env).await.is_empty());

        let garbage = Arc::new(ScriptedFetcher::default().unparseable(&q.cta_by_path));
        assert!(pipeline(garbage).resolve("/content/dam/x", "master", &env).await.is_empty());

        let missing = Arc::new(ScriptedFetcher::default().respond(&q.cta_by_path, json!({ "data": {} })));
        assert!(pipeline(missing).resolve("/content/dam/x", "master", &env).await.is_empty());

        let odd = Arc::new(ScriptedFetcher::default().respond(&q.cta_by_path, json!([1, 2, 3])));
        assert!(pipeline(odd).resolve("/content/dam/x", "master", &env).await.is_empty());
    }

    #[tokio::test]
    async fn secondary_failures_yield_no_records() {
        let q = queries();
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .respond(&q.cta_by_path, load_fixture("dynamic-list-by-path.fixture.json"))
                .respond(&q.dynamic_list_by_path, json!({
                    "data": { "dynamicCtaListByPath": { "item": { "tags": ["t1"] } } }
                }))
                .unparseable(&format!("{};tag=t1", q.cta_list_by_tag)),
        );

        let records = pipeline(fetcher.clone())
            .resolve("/content/dam/site/fragments/summer-list", "master", &author())
            .await;
        assert!(records.is_empty());
        assert_eq!(fetcher.request_count(), 3);
    }

    #[tokio::test]
    async fn tags_skip_empty_segments() {
        let q = queries();
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .respond(&format!("{};tag=a", q.cta_list_by_tag), json!({
                    "data": { "ctaList": { "items": [ { "title": "from a" } ] } }
                }))
                .respond(&format!("{};tag=b", q.cta_list_by_tag), json!({
                    "data": { "ctaList": { "items": [ { "title": "from b" } ] } }
                })),
        );

        let records = pipeline(fetcher.clone())
            .resolve_by_tags(&["a", "", ",b"], &author())
            .await;

        let titles: Vec<&str> = records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["from a", "from b"]);
        assert_eq!(fetcher.request_count(), 2);
        assert!(records.iter().all(|r| r.href == "#"));
        assert_eq!(
            records[0].item_id,
            "urn:aemconnection:/content/dam/fragments/dynamic-cta-list/jcr:content/data/master"
        );
    }

    #[tokio::test]
    async fn publish_requests_go_through_wrapper_and_map_paths() {
        let q = queries();
        let fetcher = Arc::new(
            ScriptedFetcher::default().respond(&format!("{PUBLISH}{}", q.cta_by_path), load_fixture("cta-by-path.fixture.json")),
        );
        let mapper = Arc::new(PathsJsonMapper::from_table(MappingTable::from_rules(["/content/site/:/"])));
        let resolver = ReferenceResolver::new(mapper, "/content/");

        let records = pipeline_with(fetcher.clone(), resolver)
            .resolve("/content/dam/site/fragments/summer-cta", "master", &publish())
            .await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].href, "/en/summer");
        assert_eq!(records[0].image_url, "https://publish.example.com/content/dam/site/banner.jpg");

        let requests = fetcher.requests();
        assert_eq!(requests[0].url, WRAPPER);
        let body = requests[0].body.as_ref().unwrap();
        assert_eq!(body["cfPath"], "/content/dam/site/fragments/summer-cta");
        assert_eq!(body["variation"], "master;ts=1");
    }

    #[tokio::test]
    async fn test_resolve_with_mock_server() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        let q = queries();

        Mock::given(method("GET"))
            .and(path(format!("{};path=/content/dam/list;variation=master;ts=1", q.cta_by_path)))
            .respond_with(ResponseTemplate::new(200).set_body_json(load_fixture("dynamic-list-by-path.fixture.json")))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!(
                "{};path=/content/dam/site/fragments/summer-list;variation=master;ts=1",
                q.dynamic_list_by_path
            )))
            .respond_with(ResponseTemplate::new(200).set_body_json(load_fixture("dynamic-list-tags.fixture.json")))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("{};tag=site:summer;ts=1", q.cta_list_by_tag)))
            .respond_with(ResponseTemplate::new(200).set_body_json(load_fixture("cta-list-by-tag.fixture.json")))
            .mount(&server)
            .await;

        let pipeline = ResolutionPipeline::new(
            Arc::new(HttpFetcher::new(&FetchOptions::default()).unwrap()),
            RequestBuilder::new(WRAPPER, Arc::new(FixedClock(1))),
            ReferenceResolver::unmapped(),
            PipelineConfig::default(),
        );

        let env = Environment::author(server.uri(), PUBLISH);
        let records = pipeline.resolve("/content/dam/list", "master", &env).await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].href, format!("{}/content/site/en/run", server.uri()));
        assert_eq!(records[0].image_url, "https://author.example.com/content/dam/site/run.jpg");
    }

    #[tokio::test]
    async fn test_publish_list_with_mock_server() {
        use wiremock::matchers::{body_partial_json, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        let q = queries();

        Mock::given(method("POST"))
            .and(path("/fetch-cf"))
            .and(body_partial_json(json!({
                "graphQLPath": format!("{PUBLISH}{}", q.cta_by_path),
                "cfPath": "/content/dam/list",
                "variation": "master;ts=1",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(load_fixture("dynamic-list-by-path.fixture.json")))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/fetch-cf"))
            .and(body_partial_json(json!({
                "graphQLPath": format!("{PUBLISH}{}", q.dynamic_list_by_path),
                "cfPath": "/content/dam/site/fragments/summer-list",
                "variation": "master;ts=1",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(load_fixture("dynamic-list-tags.fixture.json")))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/fetch-cf"))
            .and(body_partial_json(json!({
                "graphQLPath": format!("{PUBLISH}{};tag=site:summer;ts=1", q.cta_list_by_tag),
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(load_fixture("cta-list-by-tag.fixture.json")))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/paths.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "mappings": ["/content/site/:/"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mapper = PathsJsonMapper::new(format!("{}/paths.json", server.uri())).unwrap();
        let pipeline = ResolutionPipeline::new(
            Arc::new(HttpFetcher::new(&FetchOptions::default()).unwrap()),
            RequestBuilder::new(format!("{}/fetch-cf", server.uri()), Arc::new(FixedClock(1))),
            ReferenceResolver::new(Arc::new(mapper), "/content/"),
            PipelineConfig::default(),
        );

        let records = pipeline.resolve("/content/dam/list", "master", &publish()).await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "Run");
        assert_eq!(records[0].href, "/en/run");
        assert_eq!(records[0].image_url, "https://publish.example.com/content/dam/site/run.jpg");
        assert_eq!(records[1].href, "https://www.example.com/train");
        assert!(records.iter().all(|r| {
            r.item_id == "urn:aemconnection:/content/dam/list/jcr:content/data/master"
        }));
    }

    #[tokio::test]
    async fn test_resolve_server_error_is_empty() {
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let pipeline = ResolutionPipeline::new(
            Arc::new(HttpFetcher::new(&FetchOptions::default()).unwrap()),
            RequestBuilder::new(format!("{}/fetch-cf", server.uri()), Arc::new(FixedClock(1))),
            ReferenceResolver::unmapped(),
            PipelineConfig::default(),
        );

        let records = pipeline.resolve("/content/dam/x", "master", &publish()).await;
        assert!(records.is_empty());
    }

    #[test]
    fn from_config_builds_pipeline() {
        let mut config = AppConfig::default();
        config.path_mapping.paths_json_url = Some("https://www.example.com/paths.json".into());
        assert!(ResolutionPipeline::from_config(&config).is_ok());
    }
}
