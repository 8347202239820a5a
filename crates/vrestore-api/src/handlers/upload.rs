//! Upload relay handler.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use vrestore_models::UploadRole;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::security::validate_media_url;
use crate::state::AppState;

/// Upload relay request.
#[derive(Debug, Deserialize, Validate)]
pub struct UploadRequest {
    #[serde(rename = "videoUrl")]
    #[validate(length(min = 1, max = 2048), url)]
    pub video_url: String,
    /// Storage role: "original" or "enhanced"
    #[serde(rename = "type")]
    pub role: String,
}

/// Upload relay response: the durable URL and the storage asset id.
#[derive(Serialize)]
pub struct UploadResponse {
    pub url: String,
    pub public_id: String,
}

/// Relay a media URL into durable storage.
///
/// Originals are transcoded to a canonical mp4 on the way in; enhanced
/// outputs keep their codec and get a quality-first transformation.
pub async fn relay_upload(
    State(state): State<AppState>,
    Json(request): Json<UploadRequest>,
) -> ApiResult<Json<UploadResponse>> {
    let (role, url) = validate_upload_request(&request)?;

    info!(role = %role, "Relaying upload to storage service");

    match state.storage.upload(&url, role).await {
        Ok(media) => {
            metrics::record_upload(role.as_str(), "ok");
            Ok(Json(UploadResponse {
                url: media.url,
                public_id: media.public_id,
            }))
        }
        Err(e) => {
            metrics::record_upload(role.as_str(), "error");
            Err(e.into())
        }
    }
}

/// Check an upload request before any outbound call: well-formed URL, a
/// known role, and a source host the relay is allowed to fetch from.
fn validate_upload_request(request: &UploadRequest) -> Result<(UploadRole, String), ApiError> {
    request
        .validate()
        .map_err(|e| ApiError::bad_request(format!("Invalid upload request: {}", e)))?;

    let role: UploadRole = request
        .role
        .parse()
        .map_err(|_| ApiError::bad_request("type must be 'original' or 'enhanced'"))?;

    let url = validate_media_url(&request.video_url)
        .into_result()
        .map_err(ApiError::bad_request)?;

    Ok((role, url))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str, role: &str) -> UploadRequest {
        UploadRequest {
            video_url: url.to_string(),
            role: role.to_string(),
        }
    }

    #[test]
    fn test_valid_original_request() {
        let (role, url) = validate_upload_request(&request(
            "https://res.cloudinary.com/demo/video/upload/v1/in.mp4",
            "original",
        ))
        .unwrap();
        assert_eq!(role, UploadRole::Original);
        assert_eq!(url, "https://res.cloudinary.com/demo/video/upload/v1/in.mp4");
    }

    #[test]
    fn test_enhanced_role_parses() {
        let (role, _) = validate_upload_request(&request(
            "https://pbxt.replicate.delivery/out/restored.mp4",
            "enhanced",
        ))
        .unwrap();
        assert_eq!(role, UploadRole::Enhanced);
    }

    #[test]
    fn test_unknown_role_rejected() {
        let err = validate_upload_request(&request(
            "https://res.cloudinary.com/demo/video/upload/v1/in.mp4",
            "thumbnail",
        ))
        .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_internal_address_rejected() {
        let err = validate_upload_request(&request("http://127.0.0.1/in.mp4", "original"))
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_malformed_url_rejected() {
        let err = validate_upload_request(&request("not a url", "original")).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
