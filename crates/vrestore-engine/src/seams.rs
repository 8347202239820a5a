//! Trait seams between the session state machine and the backend.
//!
//! Production wires all four to [`BackendClient`]; tests substitute
//! mockall mocks so every lifecycle path runs without a network.
//!
//! [`BackendClient`]: crate::backend::BackendClient

use async_trait::async_trait;

use vrestore_models::{
    JobId, NewProcessRecord, PredictionRecord, SettingsSnapshot, UploadRole, UploadedMedia,
};

use crate::error::EngineResult;

/// Moves a video into durable storage and returns its public URL.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UploadRelay: Send + Sync {
    async fn upload(&self, source_url: &str, role: UploadRole) -> EngineResult<UploadedMedia>;
}

/// Dispatches a frozen settings snapshot to the inference provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobSubmitter: Send + Sync {
    async fn submit(&self, snapshot: &SettingsSnapshot) -> EngineResult<JobId>;
}

/// Reads the webhook-maintained cache record for a job.
///
/// `Ok(None)` means no webhook has arrived yet; the caller keeps polling.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch(&self, job_id: &JobId) -> EngineResult<Option<PredictionRecord>>;
}

/// Appends a terminal record to the user's history.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn persist(&self, record: &NewProcessRecord) -> EngineResult<String>;
}
