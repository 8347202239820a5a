//! Restoration history: append-only writes and per-user listing.
//!
//! Both endpoints require a verified bearer token; the record owner is
//! always the authenticated uid, never a client-supplied field.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use vrestore_models::{NewProcessRecord, VideoProcessRecord};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

#[derive(Serialize)]
pub struct InsertResponse {
    pub success: bool,
    pub id: String,
}

/// Append one finished-run record to the caller's history.
pub async fn insert_record(
    State(state): State<AppState>,
    user: AuthUser,
    Json(record): Json<NewProcessRecord>,
) -> ApiResult<Json<InsertResponse>> {
    record
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let id = Uuid::new_v4().to_string();
    let stored = VideoProcessRecord::from_new(id.clone(), &user.uid, record, chrono::Utc::now())
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    state.history.insert(&stored).await?;
    metrics::record_history_write(stored.status.as_str());
    info!(user_id = %user.uid, record_id = %id, "History record stored");

    Ok(Json(InsertResponse { success: true, id }))
}

#[derive(Serialize)]
pub struct ListResponse {
    pub success: bool,
    pub data: Vec<VideoProcessRecord>,
}

/// List the caller's history, newest first, capped server-side.
pub async fn list_records(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<ListResponse>> {
    let data = state.history.list(&user.uid).await?;
    metrics::record_history_read();

    Ok(Json(ListResponse {
        success: true,
        data,
    }))
}
