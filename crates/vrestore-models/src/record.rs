//! Append-only history records for finished restoration jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::prediction::PredictionRecord;
use crate::status::RecordStatus;
use crate::task::RestoreTask;

/// How the job ended, carrying the durable output URL on the success side.
///
/// Built through [`NewProcessRecord::succeeded`] and
/// [`NewProcessRecord::failed`], which require the URL on success and force
/// it empty on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordOutcome {
    Succeeded { output_url: String },
    Failed { output_url: String },
}

impl RecordOutcome {
    pub fn status(&self) -> RecordStatus {
        match self {
            RecordOutcome::Succeeded { .. } => RecordStatus::Succeeded,
            RecordOutcome::Failed { .. } => RecordStatus::Failed,
        }
    }

    pub fn output_url(&self) -> &str {
        match self {
            RecordOutcome::Succeeded { output_url } | RecordOutcome::Failed { output_url } => {
                output_url
            }
        }
    }
}

/// A history record as the client submits it, before the server stamps
/// ownership.
///
/// Every echoed parameter comes from the cached prediction record of the
/// job being finalized, never from live settings, so what is persisted is
/// exactly what the provider processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProcessRecord {
    #[serde(flatten)]
    pub outcome: RecordOutcome,
    pub tasks: RestoreTask,
    pub num_inference_steps: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,
    pub decode_chunk_size: u32,
    pub overlap: u32,
    pub noise_aug_strength: f64,
    pub min_appearance_guidance: f64,
    pub max_appearance_guidance: f64,
    pub i2i_noise_strength: f64,
    #[serde(default)]
    pub seed: String,
    pub video_url: String,
    pub created_at: String,
    #[serde(default)]
    pub completed_at: String,
    #[serde(default)]
    pub predict_time: String,
}

impl NewProcessRecord {
    /// A success record: echoed parameters from the cached prediction plus
    /// the durable URL the output was re-uploaded to.
    pub fn succeeded(prediction: &PredictionRecord, durable_output_url: impl Into<String>) -> Self {
        Self::from_echo(
            prediction,
            RecordOutcome::Succeeded {
                output_url: durable_output_url.into(),
            },
        )
    }

    /// A failure record. The output URL is forced empty.
    pub fn failed(prediction: &PredictionRecord) -> Self {
        Self::from_echo(
            prediction,
            RecordOutcome::Failed {
                output_url: String::new(),
            },
        )
    }

    fn from_echo(prediction: &PredictionRecord, outcome: RecordOutcome) -> Self {
        let mask = if prediction.tasks.requires_mask() {
            prediction.mask.clone()
        } else {
            None
        };
        Self {
            outcome,
            tasks: prediction.tasks,
            num_inference_steps: prediction.num_inference_steps,
            mask,
            decode_chunk_size: prediction.decode_chunk_size,
            overlap: prediction.overlap,
            noise_aug_strength: prediction.noise_aug_strength,
            min_appearance_guidance: prediction.min_appearance_guidance,
            max_appearance_guidance: prediction.max_appearance_guidance,
            i2i_noise_strength: prediction.i2i_noise_strength,
            seed: prediction.seed.map(|s| s.to_string()).unwrap_or_default(),
            video_url: prediction.video_url.clone(),
            created_at: prediction.created_at.clone().unwrap_or_default(),
            completed_at: prediction.completed_at.clone().unwrap_or_default(),
            predict_time: prediction
                .predict_time
                .map(|t| t.to_string())
                .unwrap_or_default(),
        }
    }

    pub fn status(&self) -> RecordStatus {
        self.outcome.status()
    }

    /// Check the insert preconditions: a source URL and creation timestamp
    /// must be present, success must carry a durable http(s) output URL,
    /// failure must not carry one, and inpainting records need their mask.
    pub fn validate(&self) -> Result<(), RecordError> {
        check_url("video_url", &self.video_url)?;
        if self.created_at.trim().is_empty() {
            return Err(RecordError::MissingField("created_at"));
        }
        if self.tasks.requires_mask() && self.mask.as_deref().unwrap_or("").trim().is_empty() {
            return Err(RecordError::MissingField("mask"));
        }
        match &self.outcome {
            RecordOutcome::Succeeded { output_url } => check_url("output_url", output_url)?,
            RecordOutcome::Failed { output_url } => {
                if !output_url.is_empty() {
                    return Err(RecordError::OutputOnFailure);
                }
            }
        }
        Ok(())
    }
}

fn check_url(field: &'static str, value: &str) -> Result<(), RecordError> {
    if value.trim().is_empty() {
        return Err(RecordError::MissingField(field));
    }
    let parsed =
        url::Url::parse(value).map_err(|source| RecordError::InvalidUrl { field, source })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        _ => Err(RecordError::UnsupportedScheme { field }),
    }
}

/// A record as persisted: the submitted fields plus server-stamped
/// ownership and timestamps. History rows are never updated after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoProcessRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub video_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,
    pub output_url: String,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub tasks: RestoreTask,
    pub num_inference_steps: u32,
    pub decode_chunk_size: u32,
    pub overlap: u32,
    pub noise_aug_strength: f64,
    pub min_appearance_guidance: f64,
    pub max_appearance_guidance: f64,
    pub i2i_noise_strength: f64,
    pub seed: String,
    pub predict_time: String,
    pub updated_at: DateTime<Utc>,
}

impl VideoProcessRecord {
    /// Stamp a submitted record with its document id, the authenticated
    /// owner, and the write time. Fails when the creation timestamp does
    /// not parse.
    pub fn from_new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        new: NewProcessRecord,
        now: DateTime<Utc>,
    ) -> Result<Self, RecordError> {
        let created_at = parse_timestamp("created_at", &new.created_at)?;
        let completed_at = if new.completed_at.trim().is_empty() {
            None
        } else {
            Some(parse_timestamp("completed_at", &new.completed_at)?)
        };
        Ok(Self {
            id: id.into(),
            user_id: user_id.into(),
            video_url: new.video_url,
            mask: new.mask,
            output_url: new.outcome.output_url().to_string(),
            status: new.outcome.status(),
            created_at,
            completed_at,
            tasks: new.tasks,
            num_inference_steps: new.num_inference_steps,
            decode_chunk_size: new.decode_chunk_size,
            overlap: new.overlap,
            noise_aug_strength: new.noise_aug_strength,
            min_appearance_guidance: new.min_appearance_guidance,
            max_appearance_guidance: new.max_appearance_guidance,
            i2i_noise_strength: new.i2i_noise_strength,
            seed: new.seed,
            predict_time: new.predict_time,
            updated_at: now,
        })
    }
}

fn parse_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>, RecordError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| RecordError::InvalidTimestamp(field))
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Missing required field '{0}'")]
    MissingField(&'static str),
    #[error("Invalid {field}: {source}")]
    InvalidUrl {
        field: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("{field} must be an http or https URL")]
    UnsupportedScheme { field: &'static str },
    #[error("Field '{0}' is not a valid RFC 3339 timestamp")]
    InvalidTimestamp(&'static str),
    #[error("A failed record cannot carry an output URL")]
    OutputOnFailure,
}
