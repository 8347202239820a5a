//! Restoration task definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The restoration pipeline requested for a job.
///
/// The task decides which model stages run and whether an inpainting
/// mask is mandatory at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RestoreTask {
    /// Restore degraded faces only
    #[default]
    #[serde(rename = "face-restoration")]
    FaceRestoration,
    /// Restore and colorize faces
    #[serde(rename = "face-restoration-and-colorization")]
    FaceRestorationAndColorization,
    /// Restore, colorize and inpaint masked regions
    #[serde(rename = "face-restoration-and-colorization-and-inpainting")]
    FaceRestorationAndColorizationAndInpainting,
}

impl RestoreTask {
    /// All selectable tasks, in menu order.
    pub const ALL: &'static [RestoreTask] = &[
        RestoreTask::FaceRestoration,
        RestoreTask::FaceRestorationAndColorization,
        RestoreTask::FaceRestorationAndColorizationAndInpainting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreTask::FaceRestoration => "face-restoration",
            RestoreTask::FaceRestorationAndColorization => "face-restoration-and-colorization",
            RestoreTask::FaceRestorationAndColorizationAndInpainting => {
                "face-restoration-and-colorization-and-inpainting"
            }
        }
    }

    /// Whether this task needs an inpainting mask before submission.
    pub fn requires_mask(&self) -> bool {
        matches!(self, RestoreTask::FaceRestorationAndColorizationAndInpainting)
    }
}

impl fmt::Display for RestoreTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RestoreTask {
    type Err = TaskParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "face-restoration" => Ok(RestoreTask::FaceRestoration),
            "face-restoration-and-colorization" => Ok(RestoreTask::FaceRestorationAndColorization),
            "face-restoration-and-colorization-and-inpainting" => {
                Ok(RestoreTask::FaceRestorationAndColorizationAndInpainting)
            }
            _ => Err(TaskParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown restoration task: {0}")]
pub struct TaskParseError(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_parse() {
        assert_eq!(
            "face-restoration".parse::<RestoreTask>().unwrap(),
            RestoreTask::FaceRestoration
        );
        assert_eq!(
            "face-restoration-and-colorization-and-inpainting"
                .parse::<RestoreTask>()
                .unwrap(),
            RestoreTask::FaceRestorationAndColorizationAndInpainting
        );
        assert!("upscaling".parse::<RestoreTask>().is_err());
    }

    #[test]
    fn test_mask_requirement() {
        assert!(!RestoreTask::FaceRestoration.requires_mask());
        assert!(!RestoreTask::FaceRestorationAndColorization.requires_mask());
        assert!(RestoreTask::FaceRestorationAndColorizationAndInpainting.requires_mask());
    }

    #[test]
    fn test_task_wire_format() {
        let json = serde_json::to_string(&RestoreTask::FaceRestorationAndColorization).unwrap();
        assert_eq!(json, "\"face-restoration-and-colorization\"");

        let parsed: RestoreTask = serde_json::from_str("\"face-restoration\"").unwrap();
        assert_eq!(parsed, RestoreTask::FaceRestoration);
    }

    #[test]
    fn test_task_display_roundtrip() {
        for task in RestoreTask::ALL {
            assert_eq!(task.to_string().parse::<RestoreTask>().unwrap(), *task);
        }
    }
}
