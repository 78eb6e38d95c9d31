//! [`DocumentStore`] backed by a remote [Chroma](https://www.trychroma.com/) server.
//!
//! Speaks the Chroma REST API v2 with HTTP basic authentication. A client is
//! created unconnected; [`ChromaClient::connect`] checks the server heartbeat
//! with the configured credentials and only then enables collection
//! operations. Every request carries the configured timeout and is sent
//! exactly once.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;

use super::{Collection, DocumentStore, InsertBatch, QueryResult, StoreError, Where};
use crate::config::StoreConfig;

pub struct ChromaClient {
    config: StoreConfig,
    base_url: String,
    http: Option<reqwest::Client>,
}

#[derive(Debug, Deserialize)]
struct CollectionModel {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    #[serde(default)]
    ids: Vec<String>,
    #[serde(default)]
    documents: Option<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Option<Vec<Option<Map<String, Value>>>>,
}

impl ChromaClient {
    pub fn new(config: StoreConfig) -> Self {
        let base_url = config.base_url();
        Self {
            config,
            base_url,
            http: None,
        }
    }

    /// Point the client at an explicit base URL instead of
    /// `scheme://host:port` (used for proxies and tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create a client for `config` and connect it.
    pub async fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut client = Self::new(config);
        client.connect().await?;
        Ok(client)
    }

    pub fn is_connected(&self) -> bool {
        self.http.is_some()
    }

    /// Open a session. Fails with [`StoreError::Connection`] on transport
    /// errors, timeouts, rejected credentials or an unhealthy server.
    pub async fn connect(&mut self) -> Result<(), StoreError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()
            .map_err(|e| StoreError::Connection(format!("failed to build HTTP client: {e}")))?;

        let url = format!("{}/api/v2/heartbeat", self.base_url);
        let response = self
            .authorize(http.get(&url))
            .send()
            .await
            .map_err(|e| self.transport_error("heartbeat", e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(StoreError::Connection(format!(
                "Chroma rejected the credentials (HTTP {status})"
            )));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StoreError::Connection(format!(
                "Chroma heartbeat failed (HTTP {status}): {text}"
            )));
        }

        tracing::info!(url = %self.base_url, "connected to Chroma");
        self.http = Some(http);
        Ok(())
    }

    fn session(&self) -> Result<&reqwest::Client, StoreError> {
        self.http.as_ref().ok_or(StoreError::NotConnected)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.username {
            Some(user) => request.basic_auth(user, self.config.password.as_ref()),
            None => request,
        }
    }

    fn transport_error(&self, op: &str, e: reqwest::Error) -> StoreError {
        if e.is_timeout() {
            StoreError::Connection(format!(
                "Chroma {op} timed out after {}s",
                self.config.timeout_secs
            ))
        } else {
            StoreError::Connection(format!("Chroma {op} failed: {e}"))
        }
    }

    fn collections_url(&self) -> String {
        format!(
            "{}/api/v2/tenants/{}/databases/{}/collections",
            self.base_url, self.config.tenant, self.config.database
        )
    }

    fn collection_url(&self, collection: &Collection, path: &str) -> String {
        format!("{}/{}{}", self.collections_url(), collection.id, path)
    }

    /// Send one request and return the status and raw body.
    async fn send(
        &self,
        op: &str,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<(StatusCode, String), StoreError> {
        let http = self.session()?;
        let mut request = self.authorize(http.request(method, url));
        if let Some(body) = body {
            request = request.json(body);
        }
        tracing::debug!(op, url, "Chroma request");

        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(op, e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(op, e))?;
        Ok((status, text))
    }

    async fn get_records(
        &self,
        collection: &Collection,
        body: &Value,
    ) -> Result<GetResponse, StoreError> {
        let url = self.collection_url(collection, "/get");
        let (status, text) = self.send("get", Method::POST, &url, Some(body)).await?;
        if !status.is_success() {
            return Err(StoreError::Query(format!(
                "Chroma get error (HTTP {status}): {text}"
            )));
        }
        serde_json::from_str(&text)
            .map_err(|e| StoreError::Query(format!("failed to parse Chroma response: {e}")))
    }
}

#[async_trait]
impl DocumentStore for ChromaClient {
    async fn get_or_create_collection(&self, name: &str) -> Result<Collection, StoreError> {
        let body = json!({
            "name": name,
            "get_or_create": true,
        });
        let (status, text) = self
            .send(
                "create collection",
                Method::POST,
                &self.collections_url(),
                Some(&body),
            )
            .await?;

        if !status.is_success() {
            return Err(StoreError::Collection(format!(
                "Chroma get_or_create '{name}' failed (HTTP {status}): {text}"
            )));
        }

        let model: CollectionModel = serde_json::from_str(&text).map_err(|e| {
            StoreError::Collection(format!("failed to parse Chroma collection: {e}"))
        })?;
        Ok(Collection {
            id: model.id,
            name: model.name,
        })
    }

    async fn delete_collection(&self, name: &str) -> Result<bool, StoreError> {
        let url = format!("{}/{}", self.collections_url(), name);
        let (status, text) = self
            .send("delete collection", Method::DELETE, &url, None)
            .await?;

        if status.is_success() {
            tracing::info!(collection = name, "collection deleted");
            return Ok(true);
        }
        if status == StatusCode::NOT_FOUND || text.contains("does not exist") {
            tracing::warn!(collection = name, "collection does not exist; nothing to delete");
            return Ok(false);
        }
        Err(StoreError::Collection(format!(
            "Chroma delete '{name}' failed (HTTP {status}): {text}"
        )))
    }

    async fn insert(
        &self,
        collection: &Collection,
        batch: InsertBatch,
    ) -> Result<usize, StoreError> {
        self.session()?;
        batch.validate()?;
        if batch.is_empty() {
            return Ok(0);
        }

        let existing = self
            .get_records(collection, &json!({ "ids": batch.ids, "include": [] }))
            .await?;
        if !existing.ids.is_empty() {
            return Err(StoreError::Insert(format!(
                "{} id(s) already present in '{}': {}",
                existing.ids.len(),
                collection.name,
                existing.ids.join(", ")
            )));
        }

        let body = serde_json::to_value(&batch)
            .map_err(|e| StoreError::Insert(format!("failed to encode batch: {e}")))?;
        let url = self.collection_url(collection, "/add");
        let (status, text) = self.send("add", Method::POST, &url, Some(&body)).await?;

        if !status.is_success() {
            return Err(StoreError::Insert(format!(
                "Chroma add error (HTTP {status}): {text}"
            )));
        }

        tracing::info!(collection = %collection.name, count = batch.len(), "records inserted");
        Ok(batch.len())
    }

    async fn query(
        &self,
        collection: &Collection,
        filter: Option<&Where>,
        limit: Option<usize>,
    ) -> Result<QueryResult, StoreError> {
        self.session()?;
        let mut body = json!({ "include": ["documents", "metadatas"] });
        if let Some(filter) = filter {
            filter.validate()?;
            body["where"] = filter.to_json();
        }
        if let Some(limit) = limit {
            body["limit"] = json!(limit);
        }

        let response = self.get_records(collection, &body).await?;
        let n = response.ids.len();
        Ok(QueryResult {
            ids: response.ids,
            documents: response.documents.unwrap_or_else(|| vec![None; n]),
            metadatas: response.metadatas.unwrap_or_else(|| vec![None; n]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const COLLECTIONS: &str = "/api/v2/tenants/default_tenant/databases/default_database/collections";

    fn config() -> StoreConfig {
        StoreConfig {
            username: Some("admin".into()),
            password: Some("secret".into()),
            timeout_secs: 5,
            ..StoreConfig::default()
        }
    }

    async fn connected(server: &MockServer) -> ChromaClient {
        Mock::given(method("GET"))
            .and(path("/api/v2/heartbeat"))
            .and(header("authorization", "Basic YWRtaW46c2VjcmV0"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"nanosecond heartbeat": 1})),
            )
            .mount(server)
            .await;
        let mut client = ChromaClient::new(config()).with_base_url(server.uri());
        client.connect().await.unwrap();
        client
    }

    fn users() -> Collection {
        Collection {
            id: "c-1".into(),
            name: "user_info".into(),
        }
    }

    fn batch(ids: &[&str]) -> InsertBatch {
        InsertBatch {
            ids: ids.iter().map(|s| s.to_string()).collect(),
            documents: ids.iter().map(|_| r#"{"pet":false}"#.to_string()).collect(),
            metadatas: ids.iter().map(|_| Map::new()).collect(),
            embeddings: Some(ids.iter().map(|_| vec![0.5, 0.5]).collect()),
        }
    }

    #[test]
    fn base_url_follows_config() {
        let client = ChromaClient::new(StoreConfig {
            host: "chroma.internal".into(),
            ..StoreConfig::default()
        });
        assert_eq!(client.base_url(), "http://chroma.internal:7878");
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn operations_before_connect_fail() {
        let client = ChromaClient::new(config());
        assert!(matches!(
            client.get_or_create_collection("user_info").await,
            Err(StoreError::NotConnected)
        ));
        assert!(matches!(
            client.delete_collection("user_info").await,
            Err(StoreError::NotConnected)
        ));
        assert!(matches!(
            client.insert(&users(), batch(&["1"])).await,
            Err(StoreError::NotConnected)
        ));
        assert!(matches!(
            client.query(&users(), None, Some(1)).await,
            Err(StoreError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn rejected_credentials_are_connection_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/heartbeat"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let mut client = ChromaClient::new(config()).with_base_url(server.uri());
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, StoreError::Connection(_)));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn unreachable_server_is_connection_error() {
        let mut client =
            ChromaClient::new(config()).with_base_url("http://127.0.0.1:1");
        assert!(matches!(
            client.connect().await,
            Err(StoreError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn get_or_create_posts_name() {
        let server = MockServer::start().await;
        let client = connected(&server).await;

        Mock::given(method("POST"))
            .and(path(COLLECTIONS))
            .and(body_partial_json(json!({"name": "user_info", "get_or_create": true})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "c-1", "name": "user_info"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let collection = client.get_or_create_collection("user_info").await.unwrap();
        assert_eq!(collection, users());
    }

    #[tokio::test]
    async fn delete_missing_collection_is_not_fatal() {
        let server = MockServer::start().await;
        let client = connected(&server).await;

        Mock::given(method("DELETE"))
            .and(path(format!("{COLLECTIONS}/ghost")))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(json!({"error": "NotFoundError", "message": "Collection [ghost] does not exist"})),
            )
            .mount(&server)
            .await;

        assert!(!client.delete_collection("ghost").await.unwrap());
    }

    #[tokio::test]
    async fn delete_server_error_is_collection_error() {
        let server = MockServer::start().await;
        let client = connected(&server).await;

        Mock::given(method("DELETE"))
            .and(path(format!("{COLLECTIONS}/user_info")))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        assert!(matches!(
            client.delete_collection("user_info").await,
            Err(StoreError::Collection(_))
        ));
    }

    #[tokio::test]
    async fn insert_checks_conflicts_then_adds() {
        let server = MockServer::start().await;
        let client = connected(&server).await;

        Mock::given(method("POST"))
            .and(path(format!("{COLLECTIONS}/c-1/get")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ids": []})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{COLLECTIONS}/c-1/add")))
            .and(body_partial_json(json!({"ids": ["1", "2"]})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let n = client.insert(&users(), batch(&["1", "2"])).await.unwrap();
        assert_eq!(n, 2);
    }

    #[tokio::test]
    async fn insert_rejects_existing_ids_without_adding() {
        let server = MockServer::start().await;
        let client = connected(&server).await;

        Mock::given(method("POST"))
            .and(path(format!("{COLLECTIONS}/c-1/get")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ids": ["2"]})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{COLLECTIONS}/c-1/add")))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let err = client
            .insert(&users(), batch(&["1", "2"]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Insert(ref m) if m.contains("already present")));
    }

    #[tokio::test]
    async fn query_sends_filter_and_limit() {
        let server = MockServer::start().await;
        let client = connected(&server).await;

        Mock::given(method("POST"))
            .and(path(format!("{COLLECTIONS}/c-1/get")))
            .and(body_partial_json(json!({
                "where": {"user_id": {"$eq": "C1"}},
                "limit": 5
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ids": ["1"],
                "documents": ["{\"pet\":false}"],
                "metadatas": [{"user_id": "C1", "category": "A"}]
            })))
            .mount(&server)
            .await;

        let filter = Where::eq("user_id", "C1");
        let result = client
            .query(&users(), Some(&filter), Some(5))
            .await
            .unwrap();
        assert_eq!(result.ids, vec!["1"]);
        assert_eq!(result.documents[0].as_deref(), Some("{\"pet\":false}"));
        assert_eq!(result.metadatas[0].as_ref().unwrap()["category"], "A");
    }

    #[tokio::test]
    async fn malformed_filter_never_reaches_server() {
        let server = MockServer::start().await;
        let client = connected(&server).await;

        let filter = Where::And(vec![Where::eq("a", "1")]);
        assert!(matches!(
            client.query(&users(), Some(&filter), None).await,
            Err(StoreError::Query(_))
        ));
    }
}
