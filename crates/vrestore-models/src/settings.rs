//! Job settings: the user-tunable parameter set for one restoration job.
//!
//! Settings are mutated through named setters that clamp into the legal
//! range, then frozen into an immutable [`SettingsSnapshot`] the moment a
//! submission starts. A job in flight is never affected by later edits.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::media::MediaDimensions;
use crate::task::RestoreTask;

/// Default number of denoising steps.
pub const DEFAULT_NUM_INFERENCE_STEPS: u32 = 30;
/// Default frames decoded per chunk.
pub const DEFAULT_DECODE_CHUNK_SIZE: u32 = 16;
/// Default frame overlap between chunks.
pub const DEFAULT_OVERLAP: u32 = 3;
/// Default noise augmentation strength.
pub const DEFAULT_NOISE_AUG_STRENGTH: f64 = 0.0;
/// Default image-to-image noise strength.
pub const DEFAULT_I2I_NOISE_STRENGTH: f64 = 1.0;
/// Default lower appearance guidance bound.
pub const DEFAULT_MIN_APPEARANCE_GUIDANCE: f64 = 2.0;
/// Default upper appearance guidance bound.
pub const DEFAULT_MAX_APPEARANCE_GUIDANCE: f64 = 2.0;

pub const NUM_INFERENCE_STEPS_RANGE: (u32, u32) = (1, 100);
pub const DECODE_CHUNK_SIZE_RANGE: (u32, u32) = (1, 32);
pub const OVERLAP_RANGE: (u32, u32) = (0, 10);
pub const NOISE_AUG_STRENGTH_RANGE: (f64, f64) = (0.0, 1.0);
pub const I2I_NOISE_STRENGTH_RANGE: (f64, f64) = (0.0, 2.0);
pub const APPEARANCE_GUIDANCE_RANGE: (f64, f64) = (0.0, 5.0);

/// User-chosen parameters for one restoration job.
///
/// Serialized with the camelCase field names the web client sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSettings {
    #[serde(rename = "tasks", default)]
    task: RestoreTask,
    #[serde(default = "default_num_inference_steps")]
    num_inference_steps: u32,
    #[serde(default = "default_decode_chunk_size")]
    decode_chunk_size: u32,
    #[serde(default = "default_overlap")]
    overlap: u32,
    #[serde(default = "default_noise_aug_strength")]
    noise_aug_strength: f64,
    #[serde(default = "default_i2i_noise_strength")]
    i2i_noise_strength: f64,
    #[serde(default = "default_min_appearance_guidance")]
    min_appearance_guidance_scale: f64,
    #[serde(default = "default_max_appearance_guidance")]
    max_appearance_guidance_scale: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
    #[serde(rename = "video", default, skip_serializing_if = "String::is_empty")]
    video_url: String,
    #[serde(rename = "mask", default, skip_serializing_if = "Option::is_none")]
    mask_url: Option<String>,
}

fn default_num_inference_steps() -> u32 {
    DEFAULT_NUM_INFERENCE_STEPS
}
fn default_decode_chunk_size() -> u32 {
    DEFAULT_DECODE_CHUNK_SIZE
}
fn default_overlap() -> u32 {
    DEFAULT_OVERLAP
}
fn default_noise_aug_strength() -> f64 {
    DEFAULT_NOISE_AUG_STRENGTH
}
fn default_i2i_noise_strength() -> f64 {
    DEFAULT_I2I_NOISE_STRENGTH
}
fn default_min_appearance_guidance() -> f64 {
    DEFAULT_MIN_APPEARANCE_GUIDANCE
}
fn default_max_appearance_guidance() -> f64 {
    DEFAULT_MAX_APPEARANCE_GUIDANCE
}

impl Default for RestoreSettings {
    fn default() -> Self {
        Self {
            task: RestoreTask::default(),
            num_inference_steps: DEFAULT_NUM_INFERENCE_STEPS,
            decode_chunk_size: DEFAULT_DECODE_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
            noise_aug_strength: DEFAULT_NOISE_AUG_STRENGTH,
            i2i_noise_strength: DEFAULT_I2I_NOISE_STRENGTH,
            min_appearance_guidance_scale: DEFAULT_MIN_APPEARANCE_GUIDANCE,
            max_appearance_guidance_scale: DEFAULT_MAX_APPEARANCE_GUIDANCE,
            seed: None,
            video_url: String::new(),
            mask_url: None,
        }
    }
}

impl RestoreSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task(&self) -> RestoreTask {
        self.task
    }

    pub fn num_inference_steps(&self) -> u32 {
        self.num_inference_steps
    }

    pub fn decode_chunk_size(&self) -> u32 {
        self.decode_chunk_size
    }

    pub fn overlap(&self) -> u32 {
        self.overlap
    }

    pub fn noise_aug_strength(&self) -> f64 {
        self.noise_aug_strength
    }

    pub fn i2i_noise_strength(&self) -> f64 {
        self.i2i_noise_strength
    }

    pub fn min_appearance_guidance_scale(&self) -> f64 {
        self.min_appearance_guidance_scale
    }

    pub fn max_appearance_guidance_scale(&self) -> f64 {
        self.max_appearance_guidance_scale
    }

    pub fn seed(&self) -> Option<i64> {
        self.seed
    }

    pub fn video_url(&self) -> &str {
        &self.video_url
    }

    pub fn mask_url(&self) -> Option<&str> {
        self.mask_url.as_deref()
    }

    pub fn set_task(&mut self, task: RestoreTask) {
        self.task = task;
    }

    pub fn set_num_inference_steps(&mut self, steps: u32) {
        let (min, max) = NUM_INFERENCE_STEPS_RANGE;
        self.num_inference_steps = steps.clamp(min, max);
    }

    pub fn set_decode_chunk_size(&mut self, size: u32) {
        let (min, max) = DECODE_CHUNK_SIZE_RANGE;
        self.decode_chunk_size = size.clamp(min, max);
    }

    pub fn set_overlap(&mut self, overlap: u32) {
        let (min, max) = OVERLAP_RANGE;
        self.overlap = overlap.clamp(min, max);
    }

    pub fn set_noise_aug_strength(&mut self, strength: f64) {
        let (min, max) = NOISE_AUG_STRENGTH_RANGE;
        self.noise_aug_strength = strength.clamp(min, max);
    }

    pub fn set_i2i_noise_strength(&mut self, strength: f64) {
        let (min, max) = I2I_NOISE_STRENGTH_RANGE;
        self.i2i_noise_strength = strength.clamp(min, max);
    }

    /// Set the lower guidance bound, dragging the upper bound along so
    /// min <= max always holds.
    pub fn set_min_appearance_guidance_scale(&mut self, scale: f64) {
        let (min, max) = APPEARANCE_GUIDANCE_RANGE;
        self.min_appearance_guidance_scale = scale.clamp(min, max);
        if self.max_appearance_guidance_scale < self.min_appearance_guidance_scale {
            self.max_appearance_guidance_scale = self.min_appearance_guidance_scale;
        }
    }

    /// Set the upper guidance bound, dragging the lower bound along so
    /// min <= max always holds.
    pub fn set_max_appearance_guidance_scale(&mut self, scale: f64) {
        let (min, max) = APPEARANCE_GUIDANCE_RANGE;
        self.max_appearance_guidance_scale = scale.clamp(min, max);
        if self.min_appearance_guidance_scale > self.max_appearance_guidance_scale {
            self.min_appearance_guidance_scale = self.max_appearance_guidance_scale;
        }
    }

    pub fn set_seed(&mut self, seed: Option<i64>) {
        self.seed = seed;
    }

    pub fn set_video_url(&mut self, url: impl Into<String>) {
        self.video_url = url.into();
    }

    pub fn clear_video_url(&mut self) {
        self.video_url.clear();
    }

    pub fn set_mask_url(&mut self, url: impl Into<String>) {
        self.mask_url = Some(url.into());
    }

    pub fn clear_mask_url(&mut self) {
        self.mask_url = None;
    }

    /// Validate the submission preconditions: a video must be present and
    /// inpainting tasks must carry a mask. Checked before any network call.
    pub fn validate_for_submission(&self) -> Result<(), ValidationError> {
        if self.video_url.trim().is_empty() {
            return Err(ValidationError::MissingVideo);
        }
        if self.task.requires_mask() && self.mask_url.as_deref().unwrap_or("").trim().is_empty() {
            return Err(ValidationError::MissingMask);
        }
        Ok(())
    }

    /// Freeze the current values into an immutable snapshot.
    ///
    /// Fails when the submission preconditions do not hold, so an invalid
    /// snapshot cannot exist. A mask left over from an earlier task choice
    /// is dropped when the frozen task does not use one. Later edits to
    /// `self` leave the snapshot untouched.
    pub fn snapshot(&self) -> Result<SettingsSnapshot, ValidationError> {
        self.validate_for_submission()?;
        let mut inner = self.clone();
        if !inner.task.requires_mask() {
            inner.mask_url = None;
        }
        Ok(SettingsSnapshot { inner })
    }
}

/// An immutable copy of [`RestoreSettings`] taken at submission time.
///
/// Resubmissions after provider failures always reuse the snapshot, never
/// whatever the live settings have become in the meantime.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SettingsSnapshot {
    inner: RestoreSettings,
}

impl SettingsSnapshot {
    pub fn task(&self) -> RestoreTask {
        self.inner.task
    }

    pub fn num_inference_steps(&self) -> u32 {
        self.inner.num_inference_steps
    }

    pub fn decode_chunk_size(&self) -> u32 {
        self.inner.decode_chunk_size
    }

    pub fn overlap(&self) -> u32 {
        self.inner.overlap
    }

    pub fn noise_aug_strength(&self) -> f64 {
        self.inner.noise_aug_strength
    }

    pub fn i2i_noise_strength(&self) -> f64 {
        self.inner.i2i_noise_strength
    }

    pub fn min_appearance_guidance_scale(&self) -> f64 {
        self.inner.min_appearance_guidance_scale
    }

    pub fn max_appearance_guidance_scale(&self) -> f64 {
        self.inner.max_appearance_guidance_scale
    }

    pub fn seed(&self) -> Option<i64> {
        self.inner.seed
    }

    pub fn video_url(&self) -> &str {
        &self.inner.video_url
    }

    /// Mask URL, present only when the frozen task requires one.
    pub fn mask_url(&self) -> Option<&str> {
        self.inner.mask_url.as_deref()
    }
}

/// Precondition failures caught before any network call is made.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("No source video selected")]
    MissingVideo,
    #[error("The selected task requires an inpainting mask")]
    MissingMask,
    #[error("Mask resolution {mask} does not match video resolution {video}")]
    MaskResolutionMismatch {
        video: MediaDimensions,
        mask: MediaDimensions,
    },
    #[error("Invalid request: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = RestoreSettings::new();
        assert_eq!(settings.task(), RestoreTask::FaceRestoration);
        assert_eq!(settings.num_inference_steps(), 30);
        assert_eq!(settings.decode_chunk_size(), 16);
        assert_eq!(settings.overlap(), 3);
        assert_eq!(settings.noise_aug_strength(), 0.0);
        assert_eq!(settings.i2i_noise_strength(), 1.0);
        assert_eq!(settings.min_appearance_guidance_scale(), 2.0);
        assert_eq!(settings.max_appearance_guidance_scale(), 2.0);
        assert_eq!(settings.seed(), None);
    }

    #[test]
    fn test_setters_clamp() {
        let mut settings = RestoreSettings::new();

        settings.set_num_inference_steps(500);
        assert_eq!(settings.num_inference_steps(), 100);
        settings.set_num_inference_steps(0);
        assert_eq!(settings.num_inference_steps(), 1);

        settings.set_decode_chunk_size(64);
        assert_eq!(settings.decode_chunk_size(), 32);

        settings.set_overlap(99);
        assert_eq!(settings.overlap(), 10);

        settings.set_noise_aug_strength(3.5);
        assert_eq!(settings.noise_aug_strength(), 1.0);

        settings.set_i2i_noise_strength(-1.0);
        assert_eq!(settings.i2i_noise_strength(), 0.0);
    }

    #[test]
    fn test_guidance_bounds_stay_ordered() {
        let mut settings = RestoreSettings::new();

        settings.set_min_appearance_guidance_scale(4.0);
        assert_eq!(settings.min_appearance_guidance_scale(), 4.0);
        assert_eq!(settings.max_appearance_guidance_scale(), 4.0);

        settings.set_max_appearance_guidance_scale(1.0);
        assert_eq!(settings.min_appearance_guidance_scale(), 1.0);
        assert_eq!(settings.max_appearance_guidance_scale(), 1.0);

        settings.set_max_appearance_guidance_scale(9.0);
        assert_eq!(settings.max_appearance_guidance_scale(), 5.0);
    }

    #[test]
    fn test_snapshot_requires_video() {
        let settings = RestoreSettings::new();
        assert_eq!(settings.snapshot().unwrap_err(), ValidationError::MissingVideo);
    }

    #[test]
    fn test_snapshot_requires_mask_for_inpainting() {
        let mut settings = RestoreSettings::new();
        settings.set_video_url("https://cdn.example.com/source.mp4");
        settings.set_task(RestoreTask::FaceRestorationAndColorizationAndInpainting);

        assert_eq!(settings.snapshot().unwrap_err(), ValidationError::MissingMask);

        settings.set_mask_url("https://cdn.example.com/mask.png");
        assert!(settings.snapshot().is_ok());
    }

    #[test]
    fn test_snapshot_is_frozen() {
        let mut settings = RestoreSettings::new();
        settings.set_video_url("https://cdn.example.com/source.mp4");
        settings.set_num_inference_steps(42);

        let snapshot = settings.snapshot().unwrap();

        settings.set_num_inference_steps(7);
        settings.set_video_url("https://cdn.example.com/other.mp4");

        assert_eq!(snapshot.num_inference_steps(), 42);
        assert_eq!(snapshot.video_url(), "https://cdn.example.com/source.mp4");
    }

    #[test]
    fn test_snapshot_hides_mask_for_non_inpainting() {
        let mut settings = RestoreSettings::new();
        settings.set_video_url("https://cdn.example.com/source.mp4");
        settings.set_mask_url("https://cdn.example.com/stale-mask.png");

        let snapshot = settings.snapshot().unwrap();
        assert_eq!(snapshot.mask_url(), None);
    }

    #[test]
    fn test_partial_body_fills_defaults() {
        let settings: RestoreSettings =
            serde_json::from_str(r#"{"tasks":"face-restoration-and-colorization"}"#).unwrap();
        assert_eq!(settings.task(), RestoreTask::FaceRestorationAndColorization);
        assert_eq!(settings.num_inference_steps(), 30);
        assert_eq!(settings.overlap(), 3);
    }

    #[test]
    fn test_wire_field_names() {
        let mut settings = RestoreSettings::new();
        settings.set_video_url("https://cdn.example.com/source.mp4");
        settings.set_task(RestoreTask::FaceRestorationAndColorizationAndInpainting);
        settings.set_mask_url("https://cdn.example.com/mask.png");

        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["video"], "https://cdn.example.com/source.mp4");
        assert_eq!(json["mask"], "https://cdn.example.com/mask.png");
        assert_eq!(json["numInferenceSteps"], 30);
        assert_eq!(json["minAppearanceGuidanceScale"], 2.0);
        assert_eq!(
            json["tasks"],
            "face-restoration-and-colorization-and-inpainting"
        );
    }
}
