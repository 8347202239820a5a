//! HTTP client for the orchestration backend.
//!
//! One client implements all four seams: the backend exposes the upload
//! relay, job submission, the status read model, and the history sink as
//! routes under `/api/v1`, so a single authenticated client covers them.
//! Retry policy lives in the session, not here; each method makes exactly
//! one request and reports what happened.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use vrestore_models::{
    JobId, NewProcessRecord, PredictionRecord, SettingsSnapshot, UploadRole, UploadedMedia,
};

use crate::error::{EngineError, EngineResult};
use crate::seams::{JobSubmitter, RecordSink, StatusSource, UploadRelay};

const DEFAULT_API_BASE: &str = "http://localhost:8080";

/// Configuration for the backend client.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL of the backend API
    pub base_url: String,
    /// Bearer token for authenticated routes; history writes fail with
    /// 401 without one
    pub api_token: Option<String>,
    /// Request timeout; the upload relay transcodes synchronously and
    /// holds the request open until the derived asset exists
    pub timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            api_token: None,
            timeout: Duration::from_secs(300),
        }
    }
}

impl BackendConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("VRESTORE_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
            api_token: std::env::var("VRESTORE_API_TOKEN").ok(),
            timeout: Duration::from_secs(
                std::env::var("VRESTORE_API_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
        }
    }
}

/// Client for the backend's upload, submission, status, and history routes.
pub struct BackendClient {
    http: Client,
    config: BackendConfig,
}

impl BackendClient {
    /// Create a new client.
    pub fn new(config: BackendConfig) -> EngineResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(EngineError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> EngineResult<Self> {
        Self::new(BackendConfig::from_env())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Attach the bearer token when one is configured. Only the history
    /// route requires it; the rest ignore an unexpected credential.
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn parse_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> EngineResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::backend(status.as_u16(), error_detail(&body)));
        }

        response
            .json()
            .await
            .map_err(|e| EngineError::invalid_response(e.to_string()))
    }
}

#[derive(Serialize)]
struct UploadBody<'a> {
    #[serde(rename = "videoUrl")]
    video_url: &'a str,
    #[serde(rename = "type")]
    role: &'static str,
}

#[derive(Deserialize)]
struct UploadReply {
    url: String,
    public_id: String,
}

#[derive(Serialize)]
struct SubmitBody<'a> {
    settings: &'a SettingsSnapshot,
}

#[derive(Deserialize)]
struct SubmitReply {
    success: bool,
    id: String,
    status: String,
}

#[derive(Deserialize)]
struct InsertReply {
    success: bool,
    id: String,
}

#[async_trait]
impl UploadRelay for BackendClient {
    async fn upload(&self, source_url: &str, role: UploadRole) -> EngineResult<UploadedMedia> {
        debug!(role = %role, "Relaying media into durable storage");

        let body = UploadBody {
            video_url: source_url,
            role: role.as_str(),
        };
        let response = self
            .authorize(self.http.post(self.url("/api/v1/cloudinary")))
            .json(&body)
            .send()
            .await?;

        let reply: UploadReply = Self::parse_json(response).await?;
        Ok(UploadedMedia {
            url: reply.url,
            public_id: reply.public_id,
        })
    }
}

#[async_trait]
impl JobSubmitter for BackendClient {
    async fn submit(&self, snapshot: &SettingsSnapshot) -> EngineResult<JobId> {
        let body = SubmitBody { settings: snapshot };
        let response = self
            .authorize(self.http.post(self.url("/api/v1/replicate")))
            .json(&body)
            .send()
            .await?;

        let reply: SubmitReply = Self::parse_json(response).await?;
        if !reply.success || reply.id.is_empty() {
            return Err(EngineError::invalid_response(
                "submission reply carries no job id",
            ));
        }

        info!(job_id = %reply.id, status = %reply.status, "Restoration job submitted");
        Ok(JobId::from_string(reply.id))
    }
}

#[async_trait]
impl StatusSource for BackendClient {
    async fn fetch(&self, job_id: &JobId) -> EngineResult<Option<PredictionRecord>> {
        let response = self
            .authorize(self.http.get(self.url("/api/v1/replicate/prediction")))
            .query(&[("id", job_id.as_str())])
            .send()
            .await?;

        // No cache entry yet: the first webhook has not landed.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let fields: HashMap<String, String> = Self::parse_json(response).await?;
        Ok(Some(PredictionRecord::from_fields(&fields)?))
    }
}

#[async_trait]
impl RecordSink for BackendClient {
    async fn persist(&self, record: &NewProcessRecord) -> EngineResult<String> {
        let response = self
            .authorize(self.http.post(self.url("/api/v1/db")))
            .json(record)
            .send()
            .await?;

        let reply: InsertReply = Self::parse_json(response).await?;
        if !reply.success {
            return Err(EngineError::invalid_response(
                "history write not acknowledged",
            ));
        }

        debug!(record_id = %reply.id, "History record persisted");
        Ok(reply.id)
    }
}

fn error_detail(body: &str) -> String {
    #[derive(Deserialize)]
    struct Detail {
        error: String,
    }

    serde_json::from_str::<Detail>(body)
        .map(|d| d.error)
        .unwrap_or_else(|_| body.chars().take(200).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vrestore_models::{PredictionStatus, RestoreSettings};
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: String) -> BackendClient {
        BackendClient::new(BackendConfig {
            base_url,
            api_token: Some("test-token".to_string()),
            timeout: Duration::from_secs(5),
        })
        .expect("client should build")
    }

    fn snapshot() -> SettingsSnapshot {
        let mut settings = RestoreSettings::new();
        settings.set_video_url("https://res.cloudinary.com/demo/video/upload/in.mp4");
        settings.snapshot().expect("snapshot should validate")
    }

    #[test]
    fn test_url_strips_trailing_slash() {
        let client = test_client("http://localhost:8080/".to_string());
        assert_eq!(client.url("/api/v1/db"), "http://localhost:8080/api/v1/db");
    }

    #[tokio::test]
    async fn test_upload_sends_role_and_parses_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/cloudinary"))
            .and(body_string_contains(
                "\"videoUrl\":\"https://example.com/in.mp4\"",
            ))
            .and(body_string_contains("\"type\":\"original\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "url": "https://res.cloudinary.com/demo/video/upload/v1/in.mp4",
                "public_id": "restore/in"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let media = client
            .upload("https://example.com/in.mp4", UploadRole::Original)
            .await
            .expect("upload should succeed");

        assert_eq!(
            media.url,
            "https://res.cloudinary.com/demo/video/upload/v1/in.mp4"
        );
        assert_eq!(media.public_id, "restore/in");
    }

    #[tokio::test]
    async fn test_submit_returns_job_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/replicate"))
            .and(body_string_contains("\"settings\""))
            .and(body_string_contains(
                "https://res.cloudinary.com/demo/video/upload/in.mp4",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "id": "job-9",
                "status": "processing"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let job_id = client
            .submit(&snapshot())
            .await
            .expect("submit should succeed");

        assert_eq!(job_id.as_str(), "job-9");
    }

    #[tokio::test]
    async fn test_submit_surfaces_backend_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/replicate"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "Validation failed: a source video is required"
            })))
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let err = client
            .submit(&snapshot())
            .await
            .expect_err("submit should fail");

        match err {
            EngineError::Backend { status, detail } => {
                assert_eq!(status, 400);
                assert_eq!(detail, "Validation failed: a source video is required");
            }
            other => panic!("expected Backend, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_returns_none_before_first_webhook() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/replicate/prediction"))
            .and(query_param("id", "job-1"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": "Prediction not found"
            })))
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let record = client
            .fetch(&JobId::from_string("job-1"))
            .await
            .expect("fetch should succeed");

        assert!(record.is_none());
    }

    #[tokio::test]
    async fn test_fetch_parses_cached_fields() {
        let cached = PredictionRecord::new(JobId::from_string("job-2"), PredictionStatus::Succeeded)
            .with_output_url("https://pbxt.replicate.delivery/out/restored.mp4");
        let fields: serde_json::Map<String, serde_json::Value> = cached
            .to_fields()
            .into_iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v)))
            .collect();

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/replicate/prediction"))
            .and(query_param("id", "job-2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::Value::Object(fields)),
            )
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let record = client
            .fetch(&JobId::from_string("job-2"))
            .await
            .expect("fetch should succeed")
            .expect("record should be present");

        assert_eq!(record.id.as_str(), "job-2");
        assert_eq!(record.status, PredictionStatus::Succeeded);
        assert_eq!(
            record.output_url.as_deref(),
            Some("https://pbxt.replicate.delivery/out/restored.mp4")
        );
    }

    #[tokio::test]
    async fn test_persist_sends_bearer_and_returns_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/db"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "id": "rec-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let record = PredictionRecord::new(JobId::from_string("job-3"), PredictionStatus::Failed);
        let client = test_client(server.uri());
        let id = client
            .persist(&NewProcessRecord::failed(&record))
            .await
            .expect("persist should succeed");

        assert_eq!(id, "rec-1");
    }
}
