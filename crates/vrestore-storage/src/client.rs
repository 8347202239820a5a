use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use vrestore_models::{UploadRole, UploadedMedia};

use crate::error::{StorageError, StorageResult};

/// Derived mp4 requested for originals so the inference provider always
/// receives a normalized h264 stream regardless of what the user uploaded.
const ORIGINAL_EAGER: &str = "q_auto:good/vc_h264:main/mp4";

/// Delivery transformation applied to enhanced outputs.
const ENHANCED_TRANSFORMATION: &str = "q_auto:best";

const DEFAULT_ORIGINAL_FOLDER: &str = "task_2_restore_original_videos";
const DEFAULT_ENHANCED_FOLDER: &str = "task_2_restore_enhanced_videos";
const DEFAULT_API_BASE: &str = "https://api.cloudinary.com";

/// Configuration for the Cloudinary upload relay.
#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub original_folder: String,
    pub enhanced_folder: String,
    pub api_base: String,
    pub upload_timeout_secs: u64,
}

impl CloudinaryConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        let cloud_name = std::env::var("CLOUDINARY_CLOUD_NAME")
            .map_err(|_| StorageError::config_error("CLOUDINARY_CLOUD_NAME not set"))?;
        let api_key = std::env::var("CLOUDINARY_API_KEY")
            .map_err(|_| StorageError::config_error("CLOUDINARY_API_KEY not set"))?;
        let api_secret = std::env::var("CLOUDINARY_API_SECRET")
            .map_err(|_| StorageError::config_error("CLOUDINARY_API_SECRET not set"))?;

        Ok(Self {
            cloud_name,
            api_key,
            api_secret,
            original_folder: std::env::var("CLOUDINARY_ORIGINAL_FOLDER")
                .unwrap_or_else(|_| DEFAULT_ORIGINAL_FOLDER.to_string()),
            enhanced_folder: std::env::var("CLOUDINARY_ENHANCED_FOLDER")
                .unwrap_or_else(|_| DEFAULT_ENHANCED_FOLDER.to_string()),
            api_base: std::env::var("CLOUDINARY_API_BASE")
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
            upload_timeout_secs: std::env::var("CLOUDINARY_UPLOAD_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
        })
    }
}

/// Client for relaying videos into Cloudinary by remote URL.
///
/// Uploads are signed server-side requests, the source video is fetched by
/// Cloudinary itself so large payloads never pass through this process.
#[derive(Debug, Clone)]
pub struct CloudinaryClient {
    config: CloudinaryConfig,
    http: reqwest::Client,
}

impl CloudinaryClient {
    /// Create a new client from configuration.
    pub fn new(config: CloudinaryConfig) -> StorageResult<Self> {
        // Synchronous eager transcoding holds the request open until the
        // derived mp4 exists, so the timeout covers the whole transcode.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.upload_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self { config, http })
    }

    /// Create a client from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Self::new(CloudinaryConfig::from_env()?)
    }

    /// Relay the video at `source_url` into the folder for `role` and return
    /// the durable URL to serve it from.
    ///
    /// Originals are transcoded to a canonical h264 mp4 and the derived URL
    /// is preferred over the raw upload. Enhanced outputs are stored as
    /// delivered with a best-quality delivery transformation.
    pub async fn upload(&self, source_url: &str, role: UploadRole) -> StorageResult<UploadedMedia> {
        let folder = self.folder_for(role);
        debug!(role = %role, folder = %folder, "Uploading video to Cloudinary");

        let timestamp = Utc::now().timestamp();
        let params = self.build_params(role, timestamp);
        let signature = sign_params(&params, &self.config.api_secret);

        let mut form: Vec<(&str, String)> = params.into_iter().collect();
        form.push(("file", source_url.to_string()));
        form.push(("api_key", self.config.api_key.clone()));
        form.push(("signature", signature));

        let endpoint = format!(
            "{}/v1_1/{}/video/upload",
            self.config.api_base, self.config.cloud_name
        );
        let response = self.http.post(&endpoint).form(&form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::upload_rejected(
                status.as_u16(),
                error_detail(&body),
            ));
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| StorageError::invalid_response(e.to_string()))?;

        let url = match role {
            UploadRole::Original => body
                .eager
                .into_iter()
                .next()
                .and_then(|e| e.secure_url)
                .or(body.secure_url),
            UploadRole::Enhanced => body.secure_url,
        }
        .ok_or(StorageError::MissingUrl)?;

        let public_id = body.public_id.unwrap_or_default();
        info!(role = %role, public_id = %public_id, "Video uploaded to Cloudinary");

        Ok(UploadedMedia { url, public_id })
    }

    fn folder_for(&self, role: UploadRole) -> &str {
        match role {
            UploadRole::Original => &self.config.original_folder,
            UploadRole::Enhanced => &self.config.enhanced_folder,
        }
    }

    /// Assemble the signed upload parameters for a role.
    ///
    /// `file`, `api_key` and `signature` are excluded from signing and added
    /// to the form afterwards.
    fn build_params(&self, role: UploadRole, timestamp: i64) -> BTreeMap<&'static str, String> {
        let mut params = BTreeMap::new();
        params.insert("folder", self.folder_for(role).to_string());
        params.insert("timestamp", timestamp.to_string());
        params.insert("quality_analysis", "true".to_string());

        match role {
            UploadRole::Original => {
                params.insert("video_codec", "h264:main".to_string());
                params.insert("audio_codec", "aac".to_string());
                params.insert("audio_frequency", "44100".to_string());
                params.insert("audio_bitrate", "128k".to_string());
                params.insert("eager", ORIGINAL_EAGER.to_string());
            }
            UploadRole::Enhanced => {
                params.insert("transformation", ENHANCED_TRANSFORMATION.to_string());
            }
        }

        params
    }
}

/// Sign upload parameters the way Cloudinary expects: parameters sorted by
/// name, joined as `key=value` pairs with `&`, secret appended, hex digest.
fn sign_params(params: &BTreeMap<&'static str, String>, api_secret: &str) -> String {
    let mut joined = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    joined.push_str(api_secret);

    let digest = Sha256::digest(joined.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{:02x}", byte);
    }
    hex
}

fn error_detail(body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect())
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    public_id: Option<String>,
    #[serde(default)]
    eager: Vec<EagerResult>,
}

#[derive(Debug, Deserialize)]
struct EagerResult {
    secure_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}
