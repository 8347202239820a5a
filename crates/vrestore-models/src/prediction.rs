//! Prediction identifiers and the cached prediction record.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::settings::{
    DEFAULT_DECODE_CHUNK_SIZE, DEFAULT_I2I_NOISE_STRENGTH, DEFAULT_MAX_APPEARANCE_GUIDANCE,
    DEFAULT_MIN_APPEARANCE_GUIDANCE, DEFAULT_NOISE_AUG_STRENGTH, DEFAULT_NUM_INFERENCE_STEPS,
    DEFAULT_OVERLAP,
};
use crate::status::PredictionStatus;
use crate::task::RestoreTask;

/// Provider-assigned identifier for one submitted prediction.
///
/// Unlike [`SessionId`] this is never minted locally; the ML provider hands
/// it back on submission and every webhook and poll carries it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Locally minted identifier for one user-visible restoration session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Provider endpoint URLs carried with a prediction. The cancel URL is
/// stored but never invoked.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProviderUrls {
    #[serde(default)]
    pub cancel: String,
    #[serde(default)]
    pub get: String,
    #[serde(default)]
    pub stream: String,
}

/// The prediction state mirrored into the cache by the webhook receiver.
///
/// Fields echo the provider payload: status, decoded output URL, the full
/// input parameter set (missing values take the submission defaults), and
/// the provider's timing stats. The hash field mapping in [`to_fields`] is
/// the wire contract between the receiver and the status endpoint, so every
/// value is derived from the payload alone; duplicate webhook deliveries
/// produce byte-identical records.
///
/// [`to_fields`]: PredictionRecord::to_fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: JobId,
    pub status: PredictionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
    pub tasks: RestoreTask,
    pub num_inference_steps: u32,
    pub decode_chunk_size: u32,
    pub overlap: u32,
    pub noise_aug_strength: f64,
    pub min_appearance_guidance: f64,
    pub max_appearance_guidance: f64,
    pub i2i_noise_strength: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    pub video_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predict_time: Option<f64>,
    #[serde(default)]
    pub urls: ProviderUrls,
}

impl PredictionRecord {
    /// A record with the submission defaults for every echoed parameter.
    pub fn new(id: JobId, status: PredictionStatus) -> Self {
        Self {
            id,
            status,
            output_url: None,
            tasks: RestoreTask::default(),
            num_inference_steps: DEFAULT_NUM_INFERENCE_STEPS,
            decode_chunk_size: DEFAULT_DECODE_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
            noise_aug_strength: DEFAULT_NOISE_AUG_STRENGTH,
            min_appearance_guidance: DEFAULT_MIN_APPEARANCE_GUIDANCE,
            max_appearance_guidance: DEFAULT_MAX_APPEARANCE_GUIDANCE,
            i2i_noise_strength: DEFAULT_I2I_NOISE_STRENGTH,
            seed: None,
            video_url: String::new(),
            mask: None,
            created_at: None,
            completed_at: None,
            predict_time: None,
            urls: ProviderUrls::default(),
        }
    }

    pub fn with_output_url(mut self, url: impl Into<String>) -> Self {
        self.output_url = Some(url.into());
        self
    }

    /// Rank used by the stale-write guard: terminal records outrank
    /// in-flight ones, equal ranks overwrite freely.
    pub fn status_rank(&self) -> u8 {
        self.status.rank()
    }

    /// Flatten into hash fields for storage.
    ///
    /// Field set and order are fixed; absent optionals become empty strings
    /// so reads always see the complete set. The mask field is present only
    /// when the echoed task uses one.
    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("id", self.id.to_string()),
            ("status", self.status.to_string()),
            ("output_url", self.output_url.clone().unwrap_or_default()),
            ("tasks", self.tasks.to_string()),
            ("num_inference_steps", self.num_inference_steps.to_string()),
            ("decode_chunk_size", self.decode_chunk_size.to_string()),
            ("overlap", self.overlap.to_string()),
            ("noise_aug_strength", self.noise_aug_strength.to_string()),
            (
                "min_appearance_guidance",
                self.min_appearance_guidance.to_string(),
            ),
            (
                "max_appearance_guidance",
                self.max_appearance_guidance.to_string(),
            ),
            ("i2i_noise_strength", self.i2i_noise_strength.to_string()),
            (
                "seed",
                self.seed.map(|s| s.to_string()).unwrap_or_default(),
            ),
            ("video_url", self.video_url.clone()),
            ("created_at", self.created_at.clone().unwrap_or_default()),
            ("completed_at", self.completed_at.clone().unwrap_or_default()),
            (
                "predict_time",
                self.predict_time.map(|t| t.to_string()).unwrap_or_default(),
            ),
            (
                "urls",
                serde_json::to_string(&self.urls).unwrap_or_else(|_| "{}".to_string()),
            ),
            ("status_rank", self.status_rank().to_string()),
        ];
        if self.tasks.requires_mask() {
            fields.push(("mask", self.mask.clone().unwrap_or_default()));
        }
        fields
    }

    /// Rebuild a record from stored hash fields.
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, RecordFieldError> {
        let id = fields
            .get("id")
            .filter(|v| !v.trim().is_empty())
            .ok_or(RecordFieldError::MissingField("id"))?;
        let status = fields
            .get("status")
            .ok_or(RecordFieldError::MissingField("status"))?
            .parse::<PredictionStatus>()
            .map_err(|e| RecordFieldError::BadStatus(e.to_string()))?;

        let non_empty = |key: &str| {
            fields
                .get(key)
                .filter(|v| !v.is_empty())
                .map(|v| v.to_string())
        };
        let parsed = |key: &'static str, default: f64| -> Result<f64, RecordFieldError> {
            match fields.get(key).filter(|v| !v.is_empty()) {
                Some(v) => v
                    .parse()
                    .map_err(|_| RecordFieldError::BadNumber(key)),
                None => Ok(default),
            }
        };
        let parsed_int = |key: &'static str, default: u32| -> Result<u32, RecordFieldError> {
            match fields.get(key).filter(|v| !v.is_empty()) {
                Some(v) => v
                    .parse()
                    .map_err(|_| RecordFieldError::BadNumber(key)),
                None => Ok(default),
            }
        };

        let tasks = match fields.get("tasks").filter(|v| !v.is_empty()) {
            Some(v) => v
                .parse::<RestoreTask>()
                .map_err(|e| RecordFieldError::BadTask(e.to_string()))?,
            None => RestoreTask::default(),
        };

        Ok(Self {
            id: JobId::from_string(id.clone()),
            status,
            output_url: non_empty("output_url"),
            tasks,
            num_inference_steps: parsed_int("num_inference_steps", DEFAULT_NUM_INFERENCE_STEPS)?,
            decode_chunk_size: parsed_int("decode_chunk_size", DEFAULT_DECODE_CHUNK_SIZE)?,
            overlap: parsed_int("overlap", DEFAULT_OVERLAP)?,
            noise_aug_strength: parsed("noise_aug_strength", DEFAULT_NOISE_AUG_STRENGTH)?,
            min_appearance_guidance: parsed(
                "min_appearance_guidance",
                DEFAULT_MIN_APPEARANCE_GUIDANCE,
            )?,
            max_appearance_guidance: parsed(
                "max_appearance_guidance",
                DEFAULT_MAX_APPEARANCE_GUIDANCE,
            )?,
            i2i_noise_strength: parsed("i2i_noise_strength", DEFAULT_I2I_NOISE_STRENGTH)?,
            seed: fields
                .get("seed")
                .filter(|v| !v.is_empty())
                .map(|v| v.parse().map_err(|_| RecordFieldError::BadNumber("seed")))
                .transpose()?,
            video_url: fields.get("video_url").cloned().unwrap_or_default(),
            mask: non_empty("mask"),
            created_at: non_empty("created_at"),
            completed_at: non_empty("completed_at"),
            predict_time: fields
                .get("predict_time")
                .filter(|v| !v.is_empty())
                .map(|v| {
                    v.parse()
                        .map_err(|_| RecordFieldError::BadNumber("predict_time"))
                })
                .transpose()?,
            urls: fields
                .get("urls")
                .and_then(|v| serde_json::from_str(v).ok())
                .unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordFieldError {
    #[error("Prediction record is missing field '{0}'")]
    MissingField(&'static str),
    #[error("Prediction record has an invalid status: {0}")]
    BadStatus(String),
    #[error("Prediction record has an invalid task: {0}")]
    BadTask(String),
    #[error("Prediction record field '{0}' is not a number")]
    BadNumber(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields_map(record: &PredictionRecord) -> HashMap<String, String> {
        record
            .to_fields()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn test_fields_round_trip() {
        let record = PredictionRecord {
            seed: Some(-1),
            video_url: "https://cdn.example.com/in.mp4".to_string(),
            created_at: Some("2025-01-07T10:00:00Z".to_string()),
            completed_at: Some("2025-01-07T10:04:30Z".to_string()),
            predict_time: Some(264.5),
            urls: ProviderUrls {
                cancel: "https://provider.example.com/p/1/cancel".to_string(),
                get: "https://provider.example.com/p/1".to_string(),
                stream: String::new(),
            },
            ..PredictionRecord::new(
                JobId::from_string("pred-abc123"),
                PredictionStatus::Succeeded,
            )
            .with_output_url("https://provider.example.com/out.mp4")
        };

        let restored = PredictionRecord::from_fields(&fields_map(&record)).unwrap();
        assert_eq!(restored, record);
    }

    #[test]
    fn test_identical_payloads_flatten_identically() {
        let a = PredictionRecord::new(JobId::from_string("p1"), PredictionStatus::Processing);
        let b = PredictionRecord::new(JobId::from_string("p1"), PredictionStatus::Processing);
        assert_eq!(a.to_fields(), b.to_fields());
    }

    #[test]
    fn test_absent_optionals_become_empty_strings() {
        let record = PredictionRecord::new(JobId::from_string("p1"), PredictionStatus::Failed);
        let fields = fields_map(&record);
        assert_eq!(fields.get("output_url").map(String::as_str), Some(""));
        assert_eq!(fields.get("seed").map(String::as_str), Some(""));
        assert_eq!(fields.get("completed_at").map(String::as_str), Some(""));
        assert_eq!(fields.get("predict_time").map(String::as_str), Some(""));

        let restored = PredictionRecord::from_fields(&fields).unwrap();
        assert_eq!(restored.output_url, None);
        assert_eq!(restored.seed, None);
        assert_eq!(restored.predict_time, None);
    }

    #[test]
    fn test_missing_knobs_take_defaults() {
        let mut fields = HashMap::new();
        fields.insert("id".to_string(), "p1".to_string());
        fields.insert("status".to_string(), "processing".to_string());

        let record = PredictionRecord::from_fields(&fields).unwrap();
        assert_eq!(record.tasks, RestoreTask::FaceRestoration);
        assert_eq!(record.num_inference_steps, 30);
        assert_eq!(record.decode_chunk_size, 16);
        assert_eq!(record.overlap, 3);
        assert_eq!(record.min_appearance_guidance, 2.0);
        assert_eq!(record.max_appearance_guidance, 2.0);
    }

    #[test]
    fn test_mask_field_only_for_inpainting() {
        let plain = PredictionRecord::new(JobId::from_string("p1"), PredictionStatus::Processing);
        assert!(!fields_map(&plain).contains_key("mask"));

        let inpainting = PredictionRecord {
            tasks: RestoreTask::FaceRestorationAndColorizationAndInpainting,
            mask: Some("https://cdn.example.com/mask.png".to_string()),
            ..PredictionRecord::new(JobId::from_string("p2"), PredictionStatus::Processing)
        };
        assert_eq!(
            fields_map(&inpainting).get("mask").map(String::as_str),
            Some("https://cdn.example.com/mask.png")
        );
    }

    #[test]
    fn test_rank_follows_status() {
        let processing =
            PredictionRecord::new(JobId::from_string("p1"), PredictionStatus::Processing);
        let failed = PredictionRecord::new(JobId::from_string("p1"), PredictionStatus::Failed);
        assert_eq!(processing.status_rank(), 0);
        assert_eq!(failed.status_rank(), 1);
    }

    #[test]
    fn test_from_fields_rejects_missing_id() {
        let mut fields = HashMap::new();
        fields.insert("status".to_string(), "processing".to_string());
        assert_eq!(
            PredictionRecord::from_fields(&fields).unwrap_err(),
            RecordFieldError::MissingField("id")
        );
    }

    #[test]
    fn test_from_fields_rejects_unknown_status() {
        let mut fields = HashMap::new();
        fields.insert("id".to_string(), "p1".to_string());
        fields.insert("status".to_string(), "canceled".to_string());
        assert!(matches!(
            PredictionRecord::from_fields(&fields),
            Err(RecordFieldError::BadStatus(_))
        ));
    }
}
