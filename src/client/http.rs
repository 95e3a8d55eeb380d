//! REST adapter for the [`RemoteClient`] contract.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::time::Duration;
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::models::Entity;
use crate::sync::{Connectivity, RemoteClient, RemoteEntity, RemoteError};

/// Errors building a client from configuration.
#[derive(Debug)]
pub enum ClientConfigError {
    /// Sync is not configured
    NotConfigured,
    /// The underlying HTTP client could not be built
    Build(String),
}

impl std::fmt::Display for ClientConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientConfigError::NotConfigured => write!(
                f,
                "Sync not configured. Add server_url and api_key to config."
            ),
            ClientConfigError::Build(e) => write!(f, "HTTP client error: {}", e),
        }
    }
}

impl std::error::Error for ClientConfigError {}

/// Request body for create and update: the client id next to the payload fields.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WriteBody<'a, E> {
    client_id: Uuid,
    #[serde(flatten)]
    payload: &'a E,
}

/// Talks to `/api/{kind}` on a mintboard-compatible backend.
#[derive(Debug, Clone)]
pub struct HttpRemoteClient<E> {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> HttpRemoteClient<E> {
    pub fn new(
        server_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ClientConfigError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientConfigError::Build(e.to_string()))?;

        Ok(Self::with_client(http, server_url, api_key))
    }

    /// Reuses an existing reqwest client, e.g. one shared across kinds.
    pub fn with_client(http: reqwest::Client, server_url: &str, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: normalize_base_url(server_url),
            api_key: api_key.into(),
            _entity: PhantomData,
        }
    }

    /// Creates a client from the `sync` config section.
    pub fn from_config(config: &SyncConfig) -> Result<Self, ClientConfigError> {
        let server_url = config
            .server_url
            .value
            .as_deref()
            .ok_or(ClientConfigError::NotConfigured)?;
        let api_key = config
            .api_key
            .value
            .clone()
            .ok_or(ClientConfigError::NotConfigured)?;

        Self::new(
            server_url,
            api_key,
            Duration::from_secs(config.timeout_secs.value),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self) -> String {
        format!("{}/api/{}", self.base_url, E::KIND.path())
    }

    /// Backend ids are opaque, so they go into the path percent-encoded.
    fn item_url(&self, remote_id: &str) -> String {
        format!(
            "{}/{}",
            self.collection_url(),
            urlencoding::encode(remote_id)
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http.request(method, url).bearer_auth(&self.api_key)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = request.send().await.map_err(classify)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::from_status(
            status.as_u16(),
            error_message(status, &body),
        ))
    }

    async fn write(
        &self,
        method: Method,
        url: &str,
        client_id: Uuid,
        payload: &E,
    ) -> Result<RemoteEntity<E>, RemoteError> {
        let body = WriteBody { client_id, payload };
        let response = self.send(self.request(method, url).json(&body)).await?;
        decode(response).await
    }
}

#[async_trait]
impl<E: Entity> RemoteClient<E> for HttpRemoteClient<E> {
    async fn list(&self) -> Result<Vec<RemoteEntity<E>>, RemoteError> {
        let url = self.collection_url();
        tracing::debug!(%url, "listing remote entities");
        let response = self.send(self.request(Method::GET, &url)).await?;
        decode(response).await
    }

    async fn create(&self, client_id: Uuid, payload: &E) -> Result<RemoteEntity<E>, RemoteError> {
        let url = self.collection_url();
        self.write(Method::POST, &url, client_id, payload).await
    }

    async fn update(
        &self,
        remote_id: &str,
        client_id: Uuid,
        payload: &E,
    ) -> Result<RemoteEntity<E>, RemoteError> {
        let url = self.item_url(remote_id);
        self.write(Method::PUT, &url, client_id, payload).await
    }

    async fn delete(&self, remote_id: &str) -> Result<(), RemoteError> {
        let url = self.item_url(remote_id);
        self.send(self.request(Method::DELETE, &url)).await?;
        Ok(())
    }
}

/// Connectivity probe that asks the backend's `/health` endpoint.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    http: reqwest::Client,
    url: String,
}

impl HttpHealthProbe {
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self, ClientConfigError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientConfigError::Build(e.to_string()))?;
        Ok(Self {
            http,
            url: format!("{}/health", normalize_base_url(server_url)),
        })
    }
}

#[async_trait]
impl Connectivity for HttpHealthProbe {
    async fn is_online(&self) -> bool {
        match self.http.get(&self.url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(url = %self.url, error = %e, "health probe failed");
                false
            }
        }
    }
}

fn classify(error: reqwest::Error) -> RemoteError {
    if error.is_connect() || error.is_timeout() || error.is_request() {
        RemoteError::network(format!("network error: {}", error))
    } else if error.is_builder() {
        RemoteError::invalid(format!("invalid request: {}", error))
    } else {
        RemoteError::network(error.to_string())
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
    let bytes = response.bytes().await.map_err(classify)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| RemoteError::invalid(format!("unexpected response body: {}", e)))
}

/// Prefers the backend's JSON `message` (or `error`) over the raw body.
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["message", "error"]
                .iter()
                .find_map(|key| v.get(*key).and_then(|e| e.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string());

    if detail.is_empty() {
        format!("server returned {}", status)
    } else {
        format!("server returned {}: {}", status, detail)
    }
}

fn normalize_base_url(server_url: &str) -> String {
    let base_url = if server_url.starts_with("http://") || server_url.starts_with("https://") {
        server_url.to_string()
    } else {
        format!("http://{}", server_url)
    };
    base_url.trim_end_matches('/').to_string()
}
