//! Google Cloud bindings: metadata server, execution environment and the
//! Cloud Storage JSON API.

use crate::environment::Environment;
use crate::error::{EnvironmentError, StorageError};
use crate::storage::StorageClient;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

pub const METADATA_BASE_URL: &str = "http://metadata.google.internal/computeMetadata/v1";
pub const STORAGE_BASE_URL: &str = "https://storage.googleapis.com";

const METADATA_TIMEOUT: Duration = Duration::from_secs(3);
const STORAGE_TIMEOUT: Duration = Duration::from_secs(30);
/// Tokens are refreshed this long before they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Client for the instance metadata server.
#[derive(Clone)]
pub struct MetadataServer {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct AccessToken {
    access_token: String,
    expires_in: u64,
}

impl MetadataServer {
    pub fn new() -> Self {
        Self::with_base_url(METADATA_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(METADATA_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get(&self, path: &str) -> Result<String, EnvironmentError> {
        let response = self
            .http
            .get(format!("{}/{}", self.base_url, path))
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnvironmentError::Metadata(format!("{path} returned {status}")));
        }
        Ok(response.text().await?.trim().to_string())
    }

    pub async fn project_id(&self) -> Result<String, EnvironmentError> {
        non_empty(self.get("project/project-id").await?, "project id")
    }

    /// Region of the running instance, e.g. `us-east1`.
    pub async fn region(&self) -> Result<String, EnvironmentError> {
        let region = self.get("instance/region").await?;
        non_empty(last_path_segment(&region).to_string(), "region")
    }

    async fn access_token(&self) -> Result<AccessToken, EnvironmentError> {
        let body = self
            .get("instance/service-accounts/default/token")
            .await?;
        serde_json::from_str(&body).map_err(|e| EnvironmentError::Metadata(e.to_string()))
    }
}

impl Default for MetadataServer {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty(value: String, what: &'static str) -> Result<String, EnvironmentError> {
    if value.is_empty() {
        Err(EnvironmentError::Unresolved(what))
    } else {
        Ok(value)
    }
}

/// `projects/123/regions/us-east1` -> `us-east1`
fn last_path_segment(value: &str) -> &str {
    value.rsplit('/').next().unwrap_or(value)
}

/// Identifiers and overrides read from the process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentSettings {
    pub project_id: Option<String>,
    pub region: Option<String>,
    pub uptime_id: Option<String>,
    pub execution_id: Option<String>,
    pub service: Option<String>,
    pub revision: Option<String>,
}

impl EnvironmentSettings {
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            project_id: var("GOOGLE_CLOUD_PROJECT"),
            region: var("GOOGLE_CLOUD_REGION"),
            uptime_id: var("SYNTHETIC_UPTIME_ID"),
            execution_id: var("SYNTHETIC_EXECUTION_ID"),
            service: var("K_SERVICE"),
            revision: var("K_REVISION"),
        }
    }
}

/// Environment of a probe running on Google Cloud. Explicit settings win over
/// the metadata server.
pub struct GcpEnvironment {
    settings: EnvironmentSettings,
    metadata: MetadataServer,
    uptime_id: String,
    execution_id: String,
}

impl GcpEnvironment {
    pub fn new(settings: EnvironmentSettings, metadata: MetadataServer) -> Self {
        let uptime_id = settings.uptime_id.clone().unwrap_or_default();
        let execution_id = settings
            .execution_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Self {
            settings,
            metadata,
            uptime_id,
            execution_id,
        }
    }

    pub fn from_env() -> Self {
        Self::new(EnvironmentSettings::from_env(), MetadataServer::new())
    }
}

#[async_trait]
impl Environment for GcpEnvironment {
    async fn resolve_project_id(&self) -> Result<String, EnvironmentError> {
        match &self.settings.project_id {
            Some(project_id) => Ok(project_id.clone()),
            None => self.metadata.project_id().await,
        }
    }

    async fn execution_region(&self) -> Result<String, EnvironmentError> {
        match &self.settings.region {
            Some(region) => Ok(region.clone()),
            None => self.metadata.region().await,
        }
    }

    fn runtime_metadata(&self) -> serde_json::Value {
        json!({
            "agent": format!("linkprobe/{}", env!("CARGO_PKG_VERSION")),
            "uptime_id": self.uptime_id,
            "execution_id": self.execution_id,
            "service": self.settings.service,
            "revision": self.settings.revision,
        })
    }

    fn uptime_id(&self) -> String {
        self.uptime_id.clone()
    }

    fn execution_id(&self) -> String {
        self.execution_id.clone()
    }
}

/// Source of OAuth access tokens for Cloud Storage.
pub enum TokenSource {
    /// A fixed token, e.g. from `gcloud auth print-access-token`.
    Static(String),
    Metadata(MetadataServer),
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Cloud Storage over the JSON API.
pub struct GcsClient {
    http: reqwest::Client,
    base_url: String,
    tokens: TokenSource,
    cached: Mutex<Option<CachedToken>>,
    environment: Arc<dyn Environment>,
}

impl GcsClient {
    /// `environment` supplies the project new buckets are created in.
    pub fn new(tokens: TokenSource, environment: Arc<dyn Environment>) -> Self {
        Self::with_base_url(STORAGE_BASE_URL, tokens, environment)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        tokens: TokenSource,
        environment: Arc<dyn Environment>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(STORAGE_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
            cached: Mutex::new(None),
            environment,
        }
    }

    async fn token(&self) -> Result<String, StorageError> {
        let server = match &self.tokens {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::Metadata(server) => server,
        };

        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let fresh = server
            .access_token()
            .await
            .map_err(|e| StorageError::Auth(e.to_string()))?;
        let lifetime = Duration::from_secs(fresh.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        debug!("Fetched storage access token valid for {:?}", lifetime);

        *cached = Some(CachedToken {
            value: fresh.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(fresh.access_token)
    }

    fn bucket_url(&self, bucket: &str) -> String {
        format!("{}/storage/v1/b/{}", self.base_url, bucket)
    }

    fn upload_url(&self, bucket: &str, path: &str) -> Result<Url, StorageError> {
        Url::parse_with_params(
            &format!("{}/upload/storage/v1/b/{}/o", self.base_url, bucket),
            &[("uploadType", "media"), ("name", path)],
        )
        .map_err(|e| StorageError::Request(e.to_string()))
    }
}

async fn status_error(response: reqwest::Response) -> StorageError {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    match status {
        401 | 403 => StorageError::Auth(body),
        _ => StorageError::Status { status, body },
    }
}

#[async_trait]
impl StorageClient for GcsClient {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        let response = self
            .http
            .get(self.bucket_url(bucket))
            .bearer_auth(self.token().await?)
            .send()
            .await?;

        match response.status().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            _ => Err(status_error(response).await),
        }
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        let project_id = self
            .environment
            .resolve_project_id()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;

        let response = self
            .http
            .post(format!("{}/storage/v1/b", self.base_url))
            .query(&[("project", project_id.as_str())])
            .bearer_auth(self.token().await?)
            .json(&json!({ "name": bucket }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(())
    }

    async fn upload(&self, bucket: &str, path: &str, data: Vec<u8>) -> Result<(), StorageError> {
        let response = self
            .http
            .post(self.upload_url(bucket, path)?)
            .bearer_auth(self.token().await?)
            .header(reqwest::header::CONTENT_TYPE, "image/png")
            .body(data)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(())
    }
}
