//! Catalog client for the OpenSanctions data and entity services.

use std::fmt::Debug;
use std::str::FromStr;
use std::time::Duration;

use enum_dispatch::enum_dispatch;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::CatalogClientConfig;
use crate::error::CatalogClientError;
use crate::mock::MockClient;
use crate::types::{Dataset, DatasetDetails, Entity, Index, Issue, IssueIndex, RawIndex};

/// Caching directive passed along with a request.
///
/// This is a hint to the HTTP layer and any caches in between,
/// freshness is not managed here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CachePreference {
    /// No directive, every call is a fresh round trip as far as we are concerned.
    #[default]
    Default,
    /// Prefer a cached response, even a stale one, over contacting the origin.
    ForceCache,
}

impl CachePreference {
    fn cache_control(self) -> Option<HeaderValue> {
        match self {
            CachePreference::Default => None,
            CachePreference::ForceCache => Some(HeaderValue::from_static("max-stale")),
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog trait
// ---------------------------------------------------------------------------

/// Read access to the catalog.
///
/// Implementors provide the three fetches, the remaining lookups are derived
/// from them. Nothing is memoized: every derived lookup performs its own fetch,
/// so two lookups may observe different states of the remote catalog.
#[enum_dispatch]
#[allow(async_fn_in_trait)]
pub trait ClientTrait {
    /// Fetch and reshape the catalog index.
    async fn fetch_index(&self) -> Result<Index, CatalogClientError>;

    /// All datasets of the current index, in index order.
    async fn get_datasets(&self) -> Result<Vec<Dataset>, CatalogClientError> {
        Ok(self.fetch_index().await?.datasets)
    }

    /// The first dataset whose name matches exactly.
    async fn get_dataset_by_name(
        &self,
        name: impl AsRef<str> + Send + Sync,
    ) -> Result<Option<Dataset>, CatalogClientError> {
        let name = name.as_ref();
        let datasets = self.get_datasets().await?;
        Ok(datasets.into_iter().find(|dataset| dataset.name() == name))
    }

    /// Rendered description and metadata split off the named dataset.
    async fn get_dataset_details(
        &self,
        name: impl AsRef<str> + Send + Sync,
    ) -> Result<Option<DatasetDetails>, CatalogClientError> {
        let mut index = self.fetch_index().await?;
        Ok(index.details.remove(name.as_ref()))
    }

    /// All issues of the issues feed, unchanged.
    async fn get_issues(&self) -> Result<Vec<Issue>, CatalogClientError>;

    /// Issues whose `dataset` equals the name of `dataset`.
    ///
    /// Passing `None` selects the issues that are not associated with any
    /// dataset, it does not select all issues.
    async fn get_dataset_issues(
        &self,
        dataset: Option<&Dataset>,
    ) -> Result<Vec<Issue>, CatalogClientError> {
        let name = dataset.map(Dataset::name);
        let issues = self.get_issues().await?;
        Ok(issues
            .into_iter()
            .filter(|issue| issue.belongs_to(name))
            .collect())
    }

    /// Look up a single entity.
    ///
    /// Returns `Ok(None)` if the API does not answer with a success status,
    /// which covers both unknown ids and failed requests.
    async fn get_entity_by_id(
        &self,
        id: impl AsRef<str> + Send + Sync,
    ) -> Result<Option<Entity>, CatalogClientError>;
}

/// Either a client for the actual catalog services,
/// or a mock client for testing.
#[derive(Debug)]
#[enum_dispatch(ClientTrait)]
pub enum Client {
    Catalog(CatalogClient),
    Mock(MockClient),
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// A client for the catalog services.
pub struct CatalogClient {
    client: reqwest::Client,
    config: CatalogClientConfig,
}

impl Debug for CatalogClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogClient")
            .field("index_url", &self.config.index_url)
            .field("api_url", &self.config.api_url)
            .finish_non_exhaustive()
    }
}

impl CatalogClient {
    /// Create a new catalog client from configuration.
    pub fn new(config: CatalogClientConfig) -> Result<Self, CatalogClientError> {
        config.validate()?;
        let client = build_http_client(&config)?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &CatalogClientConfig {
        &self.config
    }

    /// Update the client configuration and recreate the client.
    pub fn update_config(
        &mut self,
        update: impl FnOnce(&mut CatalogClientConfig),
    ) -> Result<(), CatalogClientError> {
        let mut modified_config = self.config.clone();
        update(&mut modified_config);
        *self = Self::new(modified_config)?;
        Ok(())
    }

    /// GET `url` and parse the body as JSON, without any caching directive.
    ///
    /// Fails if the request cannot be sent, if the server answers with a
    /// non-success status, or if the body is not JSON. An error status is
    /// reported as [CatalogClientError::Request] rather than by attempting to
    /// parse the error page.
    pub async fn fetch_json_url(&self, url: &str) -> Result<Value, CatalogClientError> {
        self.fetch_json(url, CachePreference::Default).await
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &str,
        cache: CachePreference,
    ) -> Result<T, CatalogClientError> {
        let mut request = self.client.get(url);
        if let Some(value) = cache.cache_control() {
            request = request.header(header::CACHE_CONTROL, value);
        }

        debug!(url, ?cache, "sending catalog request");
        let response = request.send().await?.error_for_status()?;
        let body = response.bytes().await?;
        debug!(url, bytes = body.len(), "received catalog response");

        serde_json::from_slice(&body).map_err(|source| CatalogClientError::Decode {
            url: url.to_string(),
            source,
        })
    }

    fn entity_url(&self, id: &str) -> String {
        format!("{}/entities/{id}", self.config.api_url.trim_end_matches('/'))
    }
}

impl ClientTrait for CatalogClient {
    #[instrument(skip_all, fields(index_url = %self.config.index_url))]
    async fn fetch_index(&self) -> Result<Index, CatalogClientError> {
        let raw: RawIndex = self
            .fetch_json(&self.config.index_url, CachePreference::ForceCache)
            .await?;
        let index = Index::from_raw(raw, &self.config.base_url);
        debug!(
            n_datasets = index.datasets.len(),
            n_details = index.details.len(),
            "transformed catalog index"
        );
        Ok(index)
    }

    #[instrument(skip_all, fields(issues_url = %self.config.issues_url))]
    async fn get_issues(&self) -> Result<Vec<Issue>, CatalogClientError> {
        let url = &self.config.issues_url;
        let feed: IssueIndex = serde_json::from_value(self.fetch_json_url(url).await?)
            .map_err(|source| CatalogClientError::Decode {
                url: url.clone(),
                source,
            })?;
        debug!(n_issues = feed.issues.len(), "received issues");
        Ok(feed.issues)
    }

    #[instrument(skip_all, fields(id = %id.as_ref()))]
    async fn get_entity_by_id(
        &self,
        id: impl AsRef<str> + Send + Sync,
    ) -> Result<Option<Entity>, CatalogClientError> {
        let url = self.entity_url(id.as_ref());
        debug!(%url, "requesting entity");
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            debug!(%status, "entity not available");
            return Ok(None);
        }

        let body = response.bytes().await?;
        let entity = serde_json::from_slice(&body)
            .map_err(|source| CatalogClientError::Decode { url, source })?;
        Ok(Some(entity))
    }
}

// ---------------------------------------------------------------------------
// HTTP client builder
// ---------------------------------------------------------------------------

fn build_http_client(config: &CatalogClientConfig) -> Result<reqwest::Client, CatalogClientError> {
    let mut headers = HeaderMap::new();

    for (key, value) in &config.extra_headers {
        headers.insert(
            header::HeaderName::from_str(key).map_err(
                |e: reqwest::header::InvalidHeaderName| CatalogClientError::Other(e.to_string()),
            )?,
            header::HeaderValue::from_str(value).map_err(
                |e: reqwest::header::InvalidHeaderValue| CatalogClientError::Other(e.to_string()),
            )?,
        );
    }

    debug!(
        index_url = %config.index_url,
        issues_url = %config.issues_url,
        api_url = %config.api_url,
        extra_headers = config.extra_headers.len(),
        "building catalog HTTP client"
    );

    let client_builder = reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(15))
        .timeout(Duration::from_secs(60));

    let client_builder = if let Some(ref user_agent) = config.user_agent {
        client_builder.user_agent(user_agent)
    } else {
        client_builder
    };

    client_builder
        .build()
        .map_err(|e| CatalogClientError::Other(e.to_string()))
}

#[cfg(test)]
pub mod tests {
    use std::collections::BTreeMap;

    use httpmock::Method::GET;
    use httpmock::MockServer;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tracing_subscriber::layer::SubscriberExt;

    use super::*;

    const INDEX_PATH: &str = "/datasets/latest/index.json";
    const ISSUES_PATH: &str = "/datasets/latest/issues.json";
    const BASE_URL: &str = "https://www.opensanctions.org";

    fn client_config(server: &MockServer) -> CatalogClientConfig {
        CatalogClientConfig {
            base_url: BASE_URL.to_string(),
            api_url: server.url("/api"),
            index_url: server.url(INDEX_PATH),
            issues_url: server.url(ISSUES_PATH),
            extra_headers: BTreeMap::new(),
            user_agent: None,
        }
    }

    fn index_body() -> Value {
        json!({
            "datasets": [
                {"name": "eu_fsf", "type": "source", "description": "**x**"},
                {"name": "sanctions", "type": "collection", "sources": ["eu_fsf"]},
            ],
            "model": {"schemata": {}},
        })
    }

    fn issues_body() -> Value {
        json!({
            "issues": [
                {"id": 1, "dataset": "eu_fsf", "message": "bad date"},
                {"id": 2, "dataset": "other", "message": "bad name"},
                {"id": 3, "message": "crawler crashed"},
            ],
        })
    }

    #[tokio::test]
    async fn fetch_index_prefers_cache_and_transforms() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path(INDEX_PATH)
                .header("cache-control", "max-stale");
            then.status(200).json_body(index_body());
        });

        let client = CatalogClient::new(client_config(&server)).unwrap();
        let index = client.fetch_index().await.unwrap();
        mock.assert();

        let names = index.datasets.iter().map(Dataset::name).collect::<Vec<_>>();
        assert_eq!(names, vec!["eu_fsf", "sanctions"]);
        assert!(index.datasets[1].is_collection());
        assert_eq!(index.model, json!({"schemata": {}}));
        assert_eq!(index.details.len(), 2);
    }

    #[tokio::test]
    async fn get_datasets_injects_links() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path(INDEX_PATH);
            then.status(200).json_body(index_body());
        });

        let client = CatalogClient::new(client_config(&server)).unwrap();
        let datasets = client.get_datasets().await.unwrap();
        for dataset in &datasets {
            assert_eq!(dataset.link(), format!("/datasets/{}/", dataset.name()));
            assert_eq!(
                dataset.opensanctions_url(),
                format!("{BASE_URL}{}", dataset.link())
            );
        }
    }

    /// Every lookup fetches the index again.
    #[tokio::test]
    async fn lookups_fetch_index_every_time() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET).path(INDEX_PATH);
            then.status(200).json_body(index_body());
        });

        let client = CatalogClient::new(client_config(&server)).unwrap();
        let dataset = client.get_dataset_by_name("eu_fsf").await.unwrap();
        let details = client.get_dataset_details("eu_fsf").await.unwrap();
        mock.assert_hits(2);

        assert_eq!(dataset.unwrap().name(), "eu_fsf");
        let details = details.unwrap();
        assert!(details.description.contains("<strong>x</strong>"));
        assert_eq!(details.targets, None);
        assert_eq!(details.resources, None);
    }

    #[tokio::test]
    async fn unknown_names_are_not_errors() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path(INDEX_PATH);
            then.status(200).json_body(index_body());
        });

        let client = CatalogClient::new(client_config(&server)).unwrap();
        assert_eq!(client.get_dataset_by_name("EU_FSF").await.unwrap(), None);
        assert_eq!(client.get_dataset_details("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn issues_are_fetched_without_cache_directive() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path(ISSUES_PATH)
                .header_missing("cache-control");
            then.status(200).json_body(issues_body());
        });

        let client = CatalogClient::new(client_config(&server)).unwrap();
        let issues = client.get_issues().await.unwrap();
        mock.assert();
        assert_eq!(issues.len(), 3);
        assert_eq!(issues[2].message(), Some("crawler crashed"));
    }

    #[tokio::test]
    async fn dataset_issues_match_by_name() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path(INDEX_PATH);
            then.status(200).json_body(index_body());
        });
        server.mock(|when, then| {
            when.method(GET).path(ISSUES_PATH);
            then.status(200).json_body(issues_body());
        });

        let client = CatalogClient::new(client_config(&server)).unwrap();
        let dataset = client.get_dataset_by_name("eu_fsf").await.unwrap().unwrap();

        let issues = client.get_dataset_issues(Some(&dataset)).await.unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].id(), Some(&json!(1)));
    }

    #[tokio::test]
    async fn dataset_issues_without_dataset_selects_unassociated() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path(ISSUES_PATH);
            then.status(200).json_body(issues_body());
        });

        let client = CatalogClient::new(client_config(&server)).unwrap();
        let issues = client.get_dataset_issues(None).await.unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].id(), Some(&json!(3)));
    }

    #[tokio::test]
    async fn entity_by_id() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET).path("/api/entities/Q7747");
            then.status(200).json_body(json!({
                "id": "Q7747",
                "caption": "Vladimir Putin",
                "schema": "Person",
                "properties": {"name": ["Vladimir Putin"]},
                "datasets": ["eu_fsf"],
                "target": true,
            }));
        });

        let client = CatalogClient::new(client_config(&server)).unwrap();
        let entity = client.get_entity_by_id("Q7747").await.unwrap().unwrap();
        mock.assert();
        assert_eq!(entity.id, "Q7747");
        assert_eq!(entity.schema(), Some("Person"));
        assert_eq!(entity.datasets(), vec!["eu_fsf"]);
        assert!(entity.is_target());
    }

    #[tokio::test]
    async fn entity_non_success_is_none() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/api/entities/missing");
            then.status(404).json_body(json!({"detail": "not found"}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/entities/broken");
            then.status(500).body("<html>oops</html>");
        });

        let client = CatalogClient::new(client_config(&server)).unwrap();
        assert_eq!(client.get_entity_by_id("missing").await.unwrap(), None);
        assert_eq!(client.get_entity_by_id("broken").await.unwrap(), None);
    }

    #[tokio::test]
    async fn invalid_json_is_a_decode_error() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path(ISSUES_PATH);
            then.status(200).body("not json");
        });

        let client = CatalogClient::new(client_config(&server)).unwrap();
        let result = client.get_issues().await;
        assert!(
            matches!(result, Err(CatalogClientError::Decode { .. })),
            "expected Decode, found: {result:?}"
        );
    }

    #[tokio::test]
    async fn index_error_status_is_propagated() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path(INDEX_PATH);
            then.status(503);
        });

        let client = CatalogClient::new(client_config(&server)).unwrap();
        let result = client.get_datasets().await;
        assert!(
            matches!(&result, Err(CatalogClientError::Request(err)) if err.status() == Some(reqwest::StatusCode::SERVICE_UNAVAILABLE)),
            "expected Request error, found: {result:?}"
        );
    }

    #[tokio::test]
    async fn fetch_json_url_returns_untyped_body() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/anything.json");
            then.status(200).json_body(json!([1, "two", null]));
        });

        let client = CatalogClient::new(client_config(&server)).unwrap();
        let value = client
            .fetch_json_url(&server.url("/anything.json"))
            .await
            .unwrap();
        assert_eq!(value, json!([1, "two", null]));
    }

    #[tokio::test]
    async fn fetch_json_url_error_status_is_a_request_error() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/gone.json");
            then.status(404).json_body(json!({"detail": "not found"}));
        });

        let client = CatalogClient::new(client_config(&server)).unwrap();
        let result = client.fetch_json_url(&server.url("/gone.json")).await;
        assert!(
            matches!(&result, Err(CatalogClientError::Request(err)) if err.status() == Some(reqwest::StatusCode::NOT_FOUND)),
            "expected Request error, found: {result:?}"
        );
    }

    #[tokio::test]
    async fn index_with_unnamed_record_keeps_other_datasets() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path(INDEX_PATH);
            then.status(200).json_body(json!({
                "datasets": [{"name": "eu_fsf"}, {"title": "no name"}],
                "model": {},
            }));
        });

        let client = CatalogClient::new(client_config(&server)).unwrap();
        let dataset = client.get_dataset_by_name("eu_fsf").await.unwrap().unwrap();
        assert_eq!(dataset.link(), "/datasets/eu_fsf/");
    }

    #[tokio::test]
    async fn issues_with_odd_field_types_do_not_fail_the_feed() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path(ISSUES_PATH);
            then.status(200).json_body(json!({
                "issues": [
                    {"id": 1, "level": 30, "dataset": "eu_fsf"},
                    {"id": 2, "timestamp": 1700000000, "data": null},
                ],
            }));
        });

        let client = CatalogClient::new(client_config(&server)).unwrap();
        let issues = client.get_issues().await.unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].fields["level"], json!(30));
        assert_eq!(client.get_dataset_issues(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn extra_headers_and_user_agent_set_on_all_requests() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.header("x-site", "staging")
                .header("user-agent", "site-catalog-tests");
            then.status(200).json_body(issues_body());
        });

        let mut extra_headers = BTreeMap::new();
        extra_headers.insert("x-site".to_string(), "staging".to_string());
        let config = CatalogClientConfig {
            extra_headers,
            user_agent: Some("site-catalog-tests".to_string()),
            ..client_config(&server)
        };

        let client = CatalogClient::new(config).unwrap();
        let _ = client.get_issues().await;
        mock.assert();
    }

    #[tokio::test]
    async fn update_config_rebuilds_client() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET).path("/other/issues.json");
            then.status(200).json_body(json!({"issues": []}));
        });

        let mut client = CatalogClient::new(client_config(&server)).unwrap();
        client
            .update_config(|config| config.issues_url = server.url("/other/issues.json"))
            .unwrap();
        assert!(client.get_issues().await.unwrap().is_empty());
        mock.assert();
    }

    #[test]
    fn invalid_header_name_is_rejected() {
        let mut config = CatalogClientConfig::default();
        config
            .extra_headers
            .insert("bad header".to_string(), "value".to_string());
        let result = CatalogClient::new(config);
        assert!(matches!(result, Err(CatalogClientError::Other(_))));
    }

    #[tokio::test]
    async fn dispatches_through_client_enum() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path(INDEX_PATH);
            then.status(200).json_body(index_body());
        });

        let subscriber = tracing_subscriber::Registry::default()
            .with(tracing_subscriber::fmt::layer().with_test_writer());
        let _subscriber_guard = tracing::subscriber::set_default(subscriber);

        let client = Client::from(CatalogClient::new(client_config(&server)).unwrap());
        let datasets = client.get_datasets().await.unwrap();
        assert_eq!(datasets.len(), 2);
    }
}
