//! Shared data models for the VidRestore backend.
//!
//! This crate provides Serde-serializable types for:
//! - Restoration tasks and job settings
//! - Prediction and session status enums
//! - The cached prediction record written by the webhook receiver
//! - History records persisted after a job finishes
//! - Upload roles and media dimensions

pub mod media;
pub mod prediction;
pub mod record;
pub mod settings;
pub mod status;
pub mod task;

// Re-export common types
pub use media::{MediaDimensions, RoleParseError, UploadRole, UploadedMedia};
pub use prediction::{JobId, PredictionRecord, ProviderUrls, RecordFieldError, SessionId};
pub use record::{NewProcessRecord, RecordError, RecordOutcome, VideoProcessRecord};
pub use settings::{
    RestoreSettings, SettingsSnapshot, ValidationError, DEFAULT_DECODE_CHUNK_SIZE,
    DEFAULT_I2I_NOISE_STRENGTH, DEFAULT_MAX_APPEARANCE_GUIDANCE, DEFAULT_MIN_APPEARANCE_GUIDANCE,
    DEFAULT_NOISE_AUG_STRENGTH, DEFAULT_NUM_INFERENCE_STEPS, DEFAULT_OVERLAP,
};
pub use status::{PredictionStatus, RecordStatus, SessionStatus, StatusParseError};
pub use task::{RestoreTask, TaskParseError};
