//! Prediction handlers: job submission, cached status reads, and the
//! provider webhook.

use std::collections::BTreeMap;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use vrestore_cache::{WriteOutcome, DEFAULT_WRITE_ATTEMPTS, DEFAULT_WRITE_RETRY_DELAY};
use vrestore_models::{JobId, RestoreSettings};
use vrestore_provider::PredictionPayload;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::security::is_valid_job_id;
use crate::state::AppState;

/// Submit request: the settings object as the client edits it. Missing
/// knobs take the documented defaults.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub settings: RestoreSettings,
}

#[derive(Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub id: String,
    pub status: String,
}

/// Submit a restoration job to the inference provider.
///
/// The settings are frozen into a snapshot first, so precondition failures
/// (no video, missing inpainting mask) reject before any provider call.
pub async fn submit_prediction(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> ApiResult<Json<SubmitResponse>> {
    let snapshot = request
        .settings
        .snapshot()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    match state.provider.submit(&snapshot).await {
        Ok(job_id) => {
            metrics::record_submission("accepted");
            info!(job_id = %job_id, task = %snapshot.task(), "Prediction submitted");
            Ok(Json(SubmitResponse {
                success: true,
                id: job_id.to_string(),
                // Transient provider vocabulary collapses to processing
                status: "processing".to_string(),
            }))
        }
        Err(e) => {
            metrics::record_submission("error");
            Err(e.into())
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PredictionQuery {
    pub id: String,
}

/// Read the cached record for a job as a flat field-to-string map.
///
/// The poller treats 404 as "no webhook yet" and keeps polling.
pub async fn get_prediction(
    State(state): State<AppState>,
    Query(query): Query<PredictionQuery>,
) -> ApiResult<Json<BTreeMap<&'static str, String>>> {
    if !is_valid_job_id(&query.id) {
        return Err(ApiError::bad_request("Invalid prediction id"));
    }

    let job_id = JobId::from_string(&query.id);
    let record = state
        .predictions
        .get(&job_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Prediction not found"))?;

    Ok(Json(record.to_fields().into_iter().collect()))
}

#[derive(Serialize)]
pub struct WebhookResponse {
    pub success: bool,
}

/// Provider webhook: normalize the delivery into a complete record and
/// store it under `prediction:{jobId}`.
///
/// 400 when the payload has no id or an unrecognized status; 5xx when the
/// cache write budget is exhausted, which makes the provider redeliver.
pub async fn replicate_webhook(
    State(state): State<AppState>,
    Json(payload): Json<PredictionPayload>,
) -> ApiResult<Json<WebhookResponse>> {
    let record = payload.to_record().map_err(|e| {
        metrics::record_webhook("rejected");
        warn!("Rejected webhook delivery: {}", e);
        ApiError::bad_request("Invalid webhook event")
    })?;

    let outcome = match state
        .predictions
        .put_with_retry(&record, DEFAULT_WRITE_ATTEMPTS, DEFAULT_WRITE_RETRY_DELAY)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            metrics::record_webhook("write_failed");
            warn!(job_id = %record.id, "Cache write budget exhausted: {}", e);
            return Err(e.into());
        }
    };

    match outcome {
        WriteOutcome::Applied => {
            metrics::record_webhook(record.status.as_str());
            info!(job_id = %record.id, status = %record.status, "Stored webhook update");
        }
        WriteOutcome::Stale => {
            metrics::record_stale_write();
            info!(job_id = %record.id, "Acknowledged stale webhook delivery");
        }
    }

    Ok(Json(WebhookResponse { success: true }))
}
