//! REST implementation of [`ClusterAccessor`] for Elasticsearch and
//! OpenSearch clusters, optionally SigV4-signed for AWS managed domains.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{Method, Url};

use indexctl::cluster::{is_reserved_index, BulkCopyStarted, ClusterAccessor, IndexMetadata};
use indexctl::cluster::{TaskProgress, TaskStatus};

use crate::config::ClusterConfig;
use crate::sigv4::Signer;
use crate::types::{
    ClusterSettingsRequest, CreateIndexRequest, CreateIndexResponse, IndexSettingsEntry,
    ReindexDest, ReindexRequest, ReindexResponse, ReindexSource, StatsResponse, TaskResponse,
};
use crate::{error_message, ClusterError};

const SIGNING_SERVICE: &str = "es";

pub struct ElasticClient {
    config: ClusterConfig,
    http: reqwest::Client,
}

impl ElasticClient {
    pub fn new(config: ClusterConfig) -> Result<Self, ClusterError> {
        Url::parse(&config.endpoint)
            .map_err(|e| ClusterError::Url(format!("{}: {}", config.endpoint, e)))?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClusterError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, http })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, ClusterError> {
        let raw = format!("{}{}", self.config.endpoint, path);
        let mut url = Url::parse(&raw).map_err(|e| ClusterError::Url(format!("{raw}: {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, ClusterError> {
        let url = self.url(path, query)?;
        let payload = match body {
            Some(body) => serde_json::to_vec(body)
                .map_err(|e| ClusterError::Malformed(format!("request body: {e}")))?,
            None => Vec::new(),
        };

        let mut request = self.http.request(method.clone(), url.clone());
        if body.is_some() {
            request = request.header(reqwest::header::CONTENT_TYPE, "application/json");
        }
        if let (Some(region), Some(credentials)) = (&self.config.region, &self.config.credentials)
        {
            let signer = Signer {
                credentials,
                region,
                service: SIGNING_SERVICE,
            };
            for (name, value) in signer.sign(method.as_str(), &url, &payload, chrono::Utc::now()) {
                request = request.header(name, value);
            }
        }

        tracing::debug!(method = %method, path = %path, "cluster request");
        let response = request.body(payload).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ClusterError::Status {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| ClusterError::Malformed(format!("{} {}: {}", method, path, e)))
    }

    async fn send_typed<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> Result<T, ClusterError> {
        let value = self.send(method.clone(), path, query, body).await?;
        serde_json::from_value(value)
            .map_err(|e| ClusterError::Malformed(format!("{} {}: {}", method, path, e)))
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, ClusterError> {
    serde_json::to_value(value).map_err(|e| ClusterError::Malformed(format!("request body: {e}")))
}

fn parse_creation_date(name: &str, index: &serde_json::Value) -> Result<i64, ClusterError> {
    let raw = index.get("creation_date").ok_or_else(|| {
        ClusterError::Malformed(format!("index {name} has no creation_date setting"))
    })?;
    let parsed = match raw {
        serde_json::Value::String(s) => s.parse::<i64>().ok(),
        serde_json::Value::Number(n) => n.as_i64(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        ClusterError::Malformed(format!("index {name} has invalid creation_date {raw}"))
    })
}

#[async_trait]
impl ClusterAccessor for ElasticClient {
    async fn list_index_names(&self) -> indexctl::Result<Vec<String>> {
        let stats: StatsResponse = self.send_typed(Method::GET, "/_stats", &[], None).await?;
        Ok(stats
            .indices
            .into_keys()
            .filter(|name| !is_reserved_index(name))
            .collect())
    }

    async fn index_metadata(
        &self,
        names: &[String],
    ) -> indexctl::Result<BTreeMap<String, IndexMetadata>> {
        if names.is_empty() {
            return Ok(BTreeMap::new());
        }
        let joined = names
            .iter()
            .map(|name| urlencoding::encode(name).into_owned())
            .collect::<Vec<_>>()
            .join(",");
        let path = format!("/{}/_settings", joined);
        let entries: BTreeMap<String, IndexSettingsEntry> =
            self.send_typed(Method::GET, &path, &[], None).await?;

        let mut metadata = BTreeMap::new();
        for (name, entry) in entries {
            let creation_date = parse_creation_date(&name, &entry.settings.index)?;
            metadata.insert(
                name,
                IndexMetadata {
                    creation_date,
                    settings: entry.settings.index,
                },
            );
        }
        Ok(metadata)
    }

    async fn create_index(
        &self,
        name: &str,
        mappings: &serde_json::Value,
        settings: &serde_json::Value,
    ) -> indexctl::Result<String> {
        let body = to_json(&CreateIndexRequest { mappings, settings })?;
        let path = format!("/{}", urlencoding::encode(name));
        let response: CreateIndexResponse = self
            .send_typed(Method::PUT, &path, &[], Some(&body))
            .await?;
        Ok(response.index.unwrap_or_else(|| name.to_string()))
    }

    async fn delete_index(&self, name: &str) -> indexctl::Result<()> {
        let path = format!("/{}", urlencoding::encode(name));
        self.send(Method::DELETE, &path, &[], None).await?;
        Ok(())
    }

    async fn start_bulk_copy(
        &self,
        source: &str,
        destination: &str,
    ) -> indexctl::Result<BulkCopyStarted> {
        let body = to_json(&ReindexRequest {
            source: ReindexSource { index: source },
            dest: ReindexDest {
                index: destination,
                version_type: "internal",
            },
        })?;
        let response: ReindexResponse = self
            .send_typed(
                Method::POST,
                "/_reindex",
                &[("refresh", "true"), ("wait_for_completion", "false")],
                Some(&body),
            )
            .await?;
        let task_id = response.task.ok_or_else(|| {
            ClusterError::Malformed(format!(
                "reindex from {source} to {destination} returned no task id"
            ))
        })?;
        Ok(BulkCopyStarted {
            task_id,
            failures: response.failures.iter().map(|f| f.to_string()).collect(),
        })
    }

    async fn poll_task(&self, task_id: &str) -> indexctl::Result<TaskStatus> {
        let path = format!("/_tasks/{}", task_id);
        let response: TaskResponse = self.send_typed(Method::GET, &path, &[], None).await?;
        let counters = &response.task.status;
        Ok(TaskStatus {
            completed: response.completed,
            error: response.error.as_ref().map(|e| e.message()),
            progress: TaskProgress {
                done: counters.created + counters.updated,
                total: counters.total,
            },
            description: response.task.description.clone(),
            node: response.task.node.clone(),
            failures: response
                .response
                .map(|r| r.failures.iter().map(|f| f.to_string()).collect())
                .unwrap_or_default(),
        })
    }

    async fn put_cluster_setting(
        &self,
        key: &str,
        value: serde_json::Value,
    ) -> indexctl::Result<()> {
        let mut persistent = serde_json::Map::new();
        persistent.insert(key.to_string(), value);
        let body = to_json(&ClusterSettingsRequest { persistent })?;
        self.send(Method::PUT, "/_cluster/settings", &[], Some(&body))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AwsCredentials;
    use indexctl::IndexctlError;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ElasticClient {
        ElasticClient::new(ClusterConfig::new(&server.uri())).unwrap()
    }

    #[test]
    fn test_rejects_unparseable_endpoint() {
        let result = ElasticClient::new(ClusterConfig::new("http://exa mple.com"));
        assert!(matches!(result, Err(ClusterError::Url(_))));
    }

    #[tokio::test]
    async fn test_list_hides_reserved_indices() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_all": {},
                "indices": {
                    "products-b": {"uuid": "x"},
                    ".kibana_1": {"uuid": "y"},
                    "orders-a": {"uuid": "z"}
                }
            })))
            .mount(&server)
            .await;

        let names = client(&server).list_index_names().await.unwrap();
        assert_eq!(names, vec!["orders-a", "products-b"]);
    }

    #[tokio::test]
    async fn test_index_metadata_parses_creation_date() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a,b/_settings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "a": {"settings": {"index": {"creation_date": "1700000000000", "number_of_shards": "1"}}},
                "b": {"settings": {"index": {"creation_date": "1700000005000", "number_of_shards": "3"}}}
            })))
            .mount(&server)
            .await;

        let metadata = client(&server)
            .index_metadata(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(metadata["a"].creation_date, 1_700_000_000_000);
        assert_eq!(metadata["b"].creation_date, 1_700_000_005_000);
        assert_eq!(metadata["b"].settings["number_of_shards"], "3");
    }

    #[tokio::test]
    async fn test_index_metadata_missing_creation_date() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "a": {"settings": {"index": {}}}
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .index_metadata(&["a".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("creation_date"));
    }

    #[tokio::test]
    async fn test_index_metadata_of_nothing_skips_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let metadata = client(&server).index_metadata(&[]).await.unwrap();
        assert!(metadata.is_empty());
    }

    #[tokio::test]
    async fn test_create_index_sends_mappings_and_settings() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/products-a"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({
                "mappings": {"properties": {"sku": {"type": "keyword"}}},
                "settings": {"number_of_shards": 1}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "acknowledged": true,
                "shards_acknowledged": true,
                "index": "products-a"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let name = client(&server)
            .create_index(
                "products-a",
                &json!({"properties": {"sku": {"type": "keyword"}}}),
                &json!({"number_of_shards": 1}),
            )
            .await
            .unwrap();
        assert_eq!(name, "products-a");
    }

    #[tokio::test]
    async fn test_create_index_error_carries_reason() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "type": "resource_already_exists_exception",
                    "reason": "index [products-a/abc] already exists"
                },
                "status": 400
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .create_index("products-a", &json!({}), &json!({}))
            .await
            .unwrap_err();
        match err {
            IndexctlError::Cluster(msg) => {
                assert!(msg.starts_with("400"));
                assert!(msg.contains("resource_already_exists_exception"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete_index() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/products-a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"acknowledged": true})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).delete_index("products-a").await.unwrap();
    }

    #[tokio::test]
    async fn test_start_bulk_copy_runs_async_reindex() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_reindex"))
            .and(query_param("refresh", "true"))
            .and(query_param("wait_for_completion", "false"))
            .and(body_json(json!({
                "source": {"index": "products-a"},
                "dest": {"index": "products-b", "version_type": "internal"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task": "n1:42"})))
            .expect(1)
            .mount(&server)
            .await;

        let started = client(&server)
            .start_bulk_copy("products-a", "products-b")
            .await
            .unwrap();
        assert_eq!(started.task_id, "n1:42");
        assert!(started.failures.is_empty());
    }

    #[tokio::test]
    async fn test_start_bulk_copy_without_task_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"took": 3})))
            .mount(&server)
            .await;

        let err = client(&server)
            .start_bulk_copy("a", "b")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no task id"));
    }

    #[tokio::test]
    async fn test_poll_task_reports_progress_and_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_tasks/n1:42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "completed": true,
                "task": {
                    "node": "n1",
                    "id": 42,
                    "description": "reindex from [products-a] to [products-b]",
                    "status": {"total": 10, "created": 7, "updated": 1}
                },
                "response": {"failures": [{"index": "products-b", "cause": {"type": "mapper_parsing_exception"}}]}
            })))
            .mount(&server)
            .await;

        let status = client(&server).poll_task("n1:42").await.unwrap();
        assert!(status.completed);
        assert_eq!(status.progress, TaskProgress { done: 8, total: 10 });
        assert_eq!(status.node, "n1");
        assert_eq!(status.failures.len(), 1);
        assert!(status.failures[0].contains("mapper_parsing_exception"));
        assert!(status.error.is_none());
    }

    #[tokio::test]
    async fn test_put_cluster_setting_is_persistent() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/_cluster/settings"))
            .and(body_json(json!({"persistent": {"action.auto_create_index": "false"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"acknowledged": true})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .put_cluster_setting("action.auto_create_index", json!("false"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_signed_requests_carry_authorization() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_stats"))
            .and(header_exists("authorization"))
            .and(header_exists("x-amz-date"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"indices": {}})))
            .expect(1)
            .mount(&server)
            .await;

        let config = ClusterConfig::new(&server.uri()).with_signing(
            "eu-west-1",
            AwsCredentials {
                access_key_id: "AKID".into(),
                secret_access_key: "secret".into(),
                session_token: None,
            },
        );
        let client = ElasticClient::new(config).unwrap();
        assert!(client.list_index_names().await.unwrap().is_empty());
    }
}
