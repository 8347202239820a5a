//! Replicate HTTP client.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};
use vrestore_models::{JobId, SettingsSnapshot};

use crate::error::{ProviderError, ProviderResult};
use crate::types::{CreatePredictionRequest, PredictionInput, PredictionPayload};

/// Pinned version of the face restoration model.
pub const DEFAULT_MODEL_VERSION: &str =
    "63512c77555a80ca5c84c590641036ba9f938d38b9a1841ea369780072561373";

/// Webhook events the provider is asked to deliver.
pub const WEBHOOK_EVENTS: [&str; 3] = ["start", "output", "completed"];

const DEFAULT_API_BASE: &str = "https://api.replicate.com";

/// Configuration for the Replicate client.
#[derive(Debug, Clone)]
pub struct ReplicateConfig {
    /// API token, sent as a bearer credential
    pub api_token: String,
    /// Model version to run
    pub model_version: String,
    /// API base URL
    pub api_base: String,
    /// Public base URL of this backend; webhook registration is skipped
    /// when unset and status then arrives by polling alone
    pub webhook_base: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Max transport-level retries per request
    pub max_retries: u32,
}

impl ReplicateConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> ProviderResult<Self> {
        let api_token = std::env::var("REPLICATE_API_TOKEN")
            .map_err(|_| ProviderError::config_error("REPLICATE_API_TOKEN not set"))?;

        Ok(Self {
            api_token,
            model_version: std::env::var("REPLICATE_MODEL_VERSION")
                .unwrap_or_else(|_| DEFAULT_MODEL_VERSION.to_string()),
            api_base: std::env::var("REPLICATE_API_BASE")
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
            webhook_base: std::env::var("WEBHOOK_BASE_URL").ok(),
            timeout: Duration::from_secs(
                std::env::var("REPLICATE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            max_retries: std::env::var("REPLICATE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
        })
    }
}

/// Client for the Replicate predictions API.
pub struct ReplicateClient {
    http: Client,
    config: ReplicateConfig,
}

impl ReplicateClient {
    /// Create a new client.
    pub fn new(config: ReplicateConfig) -> ProviderResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ProviderError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> ProviderResult<Self> {
        Self::new(ReplicateConfig::from_env()?)
    }

    /// Submit a restoration job built from a frozen settings snapshot and
    /// return the provider's job id.
    ///
    /// The created prediction is fetched back once before reporting the id,
    /// so a job id returned from here is known to resolve.
    pub async fn submit(&self, snapshot: &SettingsSnapshot) -> ProviderResult<JobId> {
        let webhook = self.webhook_url();
        if webhook.is_none() {
            debug!("WEBHOOK_BASE_URL not set, submitting without webhook registration");
        }

        let request = CreatePredictionRequest {
            version: self.config.model_version.clone(),
            input: PredictionInput::from_snapshot(snapshot),
            webhook_events_filter: webhook
                .is_some()
                .then(|| WEBHOOK_EVENTS.iter().map(|s| s.to_string()).collect()),
            webhook,
        };

        debug!(task = %snapshot.task(), "Submitting restoration job");

        let url = format!("{}/v1/predictions", self.config.api_base);
        let response = self
            .with_retry(|| async {
                self.http
                    .post(&url)
                    .bearer_auth(&self.config.api_token)
                    .json(&request)
                    .send()
                    .await
                    .map_err(ProviderError::Network)
            })
            .await?;

        let created = Self::parse_payload(response).await?;
        if created.id.is_empty() {
            return Err(ProviderError::invalid_response(
                "created prediction has no id",
            ));
        }

        let confirmed = self.get_prediction(&created.id).await?;
        info!(
            job_id = %confirmed.id,
            status = %confirmed.status,
            "Restoration job submitted"
        );

        Ok(JobId::from_string(confirmed.id))
    }

    /// Fetch a prediction by id.
    pub async fn get_prediction(&self, id: &str) -> ProviderResult<PredictionPayload> {
        let url = format!("{}/v1/predictions/{}", self.config.api_base, id);

        let response = self
            .with_retry(|| async {
                self.http
                    .get(&url)
                    .bearer_auth(&self.config.api_token)
                    .send()
                    .await
                    .map_err(ProviderError::Network)
            })
            .await?;

        Self::parse_payload(response).await
    }

    fn webhook_url(&self) -> Option<String> {
        self.config
            .webhook_base
            .as_deref()
            .map(|base| format!("{}/api/v1/replicate/webhook", base.trim_end_matches('/')))
    }

    async fn parse_payload(response: reqwest::Response) -> ProviderResult<PredictionPayload> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::request_failed(
                status.as_u16(),
                error_detail(&body),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response(e.to_string()))
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> ProviderResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = ProviderResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        "Provider request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| ProviderError::invalid_response("retry loop exited empty")))
    }
}

fn error_detail(body: &str) -> String {
    #[derive(Deserialize)]
    struct Detail {
        detail: String,
    }

    serde_json::from_str::<Detail>(body)
        .map(|d| d.detail)
        .unwrap_or_else(|_| body.chars().take(200).collect())
}
