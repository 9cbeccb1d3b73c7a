//! Dgraph HTTP client.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{DoccacheError, DoccacheResult};
use crate::queries::dql::Request;
use crate::schema::Schema;
use crate::store::GraphStore;

/// Header Dgraph Cloud and ACL-less deployments accept for API keys.
const AUTH_HEADER: &str = "X-Auth-Token";

/// Configuration for connecting to Dgraph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DgraphConfig {
    /// Alpha HTTP endpoint.
    pub url: String,
    pub auth_token: Option<String>,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for DgraphConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            auth_token: None,
            timeout_secs: 30,
        }
    }
}

/// Health entry reported by `/health`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthInfo {
    #[serde(default)]
    pub instance: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<DgraphMessage>,
}

#[derive(Debug, Deserialize)]
struct DgraphMessage {
    message: String,
}

#[derive(Debug, Default, Deserialize)]
struct MutationData {
    #[serde(default)]
    uids: HashMap<String, String>,
}

/// Client for a Dgraph alpha over its HTTP API.
#[derive(Clone)]
pub struct DgraphClient {
    base_url: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl DgraphClient {
    /// Create a client without contacting the server.
    pub fn new(config: &DgraphConfig) -> DoccacheResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
            client,
        })
    }

    /// Create a client and check the server answers, so an unreachable
    /// Dgraph fails here instead of on the first event.
    pub async fn connect(config: &DgraphConfig) -> DoccacheResult<Self> {
        let client = Self::new(config)?;
        client.health().await?;
        Ok(client)
    }

    /// Create a client with default configuration.
    pub async fn connect_default() -> DoccacheResult<Self> {
        Self::connect(&DgraphConfig::default()).await
    }

    /// Query `/health`.
    pub async fn health(&self) -> DoccacheResult<Vec<HealthInfo>> {
        let response = self.request(reqwest::Method::GET, "/health").send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DoccacheError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    /// Base URL this client talks to.
    pub fn url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.auth_token {
            Some(token) => builder.header(AUTH_HEADER, token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned + Default>(&self, builder: reqwest::RequestBuilder) -> DoccacheResult<T> {
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DoccacheError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Envelope<T> = response.json().await?;
        if !envelope.errors.is_empty() {
            let messages: Vec<String> = envelope.errors.into_iter().map(|e| e.message).collect();
            return Err(DoccacheError::Store(messages.join("; ")));
        }
        Ok(envelope.data.unwrap_or_default())
    }
}

#[async_trait]
impl GraphStore for DgraphClient {
    async fn update_schema(&self, schema: &Schema) -> DoccacheResult<()> {
        let text = schema.render();
        debug!(types = schema.types.len(), predicates = schema.predicates.len(), "Altering Dgraph schema");

        let builder = self
            .request(reqwest::Method::POST, "/alter")
            .header(CONTENT_TYPE, "application/dql")
            .body(text);

        self.send::<Value>(builder).await.map(|_| ()).map_err(|e| match e {
            DoccacheError::Store(msg) => DoccacheError::Schema(msg),
            other => other,
        })
    }

    async fn query(&self, request: &Request) -> DoccacheResult<Value> {
        let rendered = request.render();
        debug!(query = %rendered.text, "Running Dgraph query");

        let builder = self
            .request(reqwest::Method::POST, "/query")
            .json(&json!({
                "query": rendered.text,
                "variables": rendered.variables,
            }));
        self.send(builder).await
    }

    async fn mutate(&self, graph: &Value, delete: bool) -> DoccacheResult<HashMap<String, String>> {
        let body = if delete {
            json!({ "delete": graph })
        } else {
            json!({ "set": graph })
        };
        debug!(delete, "Running Dgraph mutation");

        let builder = self
            .request(reqwest::Method::POST, "/mutate?commitNow=true")
            .json(&body);
        let data: MutationData = self.send(builder).await?;
        Ok(data.uids)
    }
}
