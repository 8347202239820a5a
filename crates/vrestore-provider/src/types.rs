//! Replicate wire types.
//!
//! Field names here follow the provider's external vocabulary, which names
//! the guidance knobs `*_appearance_guidance_scale` and the source video
//! simply `video`. Everything internal goes through [`PredictionRecord`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use vrestore_models::{
    JobId, PredictionRecord, PredictionStatus, ProviderUrls, RestoreTask, SettingsSnapshot,
    DEFAULT_DECODE_CHUNK_SIZE, DEFAULT_I2I_NOISE_STRENGTH, DEFAULT_MAX_APPEARANCE_GUIDANCE,
    DEFAULT_MIN_APPEARANCE_GUIDANCE, DEFAULT_NOISE_AUG_STRENGTH, DEFAULT_NUM_INFERENCE_STEPS,
    DEFAULT_OVERLAP,
};

use crate::error::{ProviderError, ProviderResult};

/// Seed value the provider reads as "pick one at random".
pub const RANDOM_SEED: i64 = -1;

/// Model input for a restoration job.
///
/// The mask is serialized only when present; sending an empty mask to a
/// non-inpainting task is rejected by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionInput {
    #[serde(default = "default_seed")]
    pub seed: i64,
    #[serde(default)]
    pub tasks: RestoreTask,
    #[serde(default)]
    pub video: String,
    #[serde(default = "default_overlap")]
    pub overlap: u32,
    #[serde(default = "default_decode_chunk_size")]
    pub decode_chunk_size: u32,
    #[serde(default = "default_i2i_noise_strength")]
    pub i2i_noise_strength: f64,
    #[serde(default = "default_noise_aug_strength")]
    pub noise_aug_strength: f64,
    #[serde(default = "default_num_inference_steps")]
    pub num_inference_steps: u32,
    #[serde(default = "default_max_guidance")]
    pub max_appearance_guidance_scale: f64,
    #[serde(default = "default_min_guidance")]
    pub min_appearance_guidance_scale: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,
}

fn default_seed() -> i64 {
    RANDOM_SEED
}

fn default_overlap() -> u32 {
    DEFAULT_OVERLAP
}

fn default_decode_chunk_size() -> u32 {
    DEFAULT_DECODE_CHUNK_SIZE
}

fn default_i2i_noise_strength() -> f64 {
    DEFAULT_I2I_NOISE_STRENGTH
}

fn default_noise_aug_strength() -> f64 {
    DEFAULT_NOISE_AUG_STRENGTH
}

fn default_num_inference_steps() -> u32 {
    DEFAULT_NUM_INFERENCE_STEPS
}

fn default_max_guidance() -> f64 {
    DEFAULT_MAX_APPEARANCE_GUIDANCE
}

fn default_min_guidance() -> f64 {
    DEFAULT_MIN_APPEARANCE_GUIDANCE
}

impl Default for PredictionInput {
    fn default() -> Self {
        Self {
            seed: RANDOM_SEED,
            tasks: RestoreTask::default(),
            video: String::new(),
            overlap: DEFAULT_OVERLAP,
            decode_chunk_size: DEFAULT_DECODE_CHUNK_SIZE,
            i2i_noise_strength: DEFAULT_I2I_NOISE_STRENGTH,
            noise_aug_strength: DEFAULT_NOISE_AUG_STRENGTH,
            num_inference_steps: DEFAULT_NUM_INFERENCE_STEPS,
            max_appearance_guidance_scale: DEFAULT_MAX_APPEARANCE_GUIDANCE,
            min_appearance_guidance_scale: DEFAULT_MIN_APPEARANCE_GUIDANCE,
            mask: None,
        }
    }
}

impl PredictionInput {
    /// Build the provider payload from a frozen settings snapshot.
    pub fn from_snapshot(snapshot: &SettingsSnapshot) -> Self {
        Self {
            seed: snapshot.seed().unwrap_or(RANDOM_SEED),
            tasks: snapshot.task(),
            video: snapshot.video_url().to_string(),
            overlap: snapshot.overlap(),
            decode_chunk_size: snapshot.decode_chunk_size(),
            i2i_noise_strength: snapshot.i2i_noise_strength(),
            noise_aug_strength: snapshot.noise_aug_strength(),
            num_inference_steps: snapshot.num_inference_steps(),
            max_appearance_guidance_scale: snapshot.max_appearance_guidance_scale(),
            min_appearance_guidance_scale: snapshot.min_appearance_guidance_scale(),
            mask: snapshot.mask_url().map(String::from),
        }
    }
}

/// Body of `POST /v1/predictions`.
#[derive(Debug, Clone, Serialize)]
pub struct CreatePredictionRequest {
    pub version: String,
    pub input: PredictionInput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_events_filter: Option<Vec<String>>,
}

/// Timing metrics attached to completed predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionMetrics {
    #[serde(default)]
    pub predict_time: Option<f64>,
}

/// A prediction as the provider reports it, from either a webhook delivery
/// or a direct fetch. Every field is optional on the wire except that a
/// payload without an id or with an unrecognized status is unusable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionPayload {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub input: Option<PredictionInput>,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub metrics: Option<PredictionMetrics>,
    #[serde(default)]
    pub urls: ProviderUrls,
}

impl PredictionPayload {
    /// The provider returns output as a bare URL string or as a list of
    /// artifact URLs; either way the first usable URL wins.
    pub fn output_url(&self) -> Option<String> {
        match &self.output {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Array(items) => items.iter().find_map(|v| v.as_str().map(String::from)),
            _ => None,
        }
    }

    /// Normalize into a [`PredictionRecord`].
    ///
    /// Rejects payloads without an id and payloads whose status is outside
    /// {processing, succeeded, failed}; missing input fields take the model
    /// defaults. A seed of `-1` means the provider chose one, so it is
    /// recorded as unset.
    pub fn to_record(&self) -> ProviderResult<PredictionRecord> {
        if self.id.is_empty() {
            return Err(ProviderError::invalid_response("prediction id missing"));
        }
        let status: PredictionStatus = self.status.parse().map_err(|_| {
            ProviderError::invalid_response(format!("unsupported status {:?}", self.status))
        })?;

        let input = self.input.clone().unwrap_or_default();

        let mut record = PredictionRecord::new(JobId::from_string(self.id.clone()), status);
        record.output_url = self.output_url();
        record.tasks = input.tasks;
        record.num_inference_steps = input.num_inference_steps;
        record.decode_chunk_size = input.decode_chunk_size;
        record.overlap = input.overlap;
        record.noise_aug_strength = input.noise_aug_strength;
        record.min_appearance_guidance = input.min_appearance_guidance_scale;
        record.max_appearance_guidance = input.max_appearance_guidance_scale;
        record.i2i_noise_strength = input.i2i_noise_strength;
        record.seed = if input.seed < 0 { None } else { Some(input.seed) };
        record.video_url = input.video;
        record.mask = input.mask;
        record.created_at = self.created_at.clone();
        record.completed_at = self.completed_at.clone();
        record.predict_time = self.metrics.as_ref().and_then(|m| m.predict_time);
        record.urls = self.urls.clone();

        Ok(record)
    }
}
