//! Status vocabularies for predictions, sessions and history records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Status of a prediction as reported by the inference provider.
///
/// The provider vocabulary has more transient values (starting, queued);
/// everything the webhook accepts collapses into these three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PredictionStatus {
    /// Job accepted and running (or about to run)
    #[default]
    Processing,
    /// Job finished with an output
    Succeeded,
    /// Job finished without an output
    Failed,
}

impl PredictionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionStatus::Processing => "processing",
            PredictionStatus::Succeeded => "succeeded",
            PredictionStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more webhooks expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, PredictionStatus::Succeeded | PredictionStatus::Failed)
    }

    /// Ordering rank used by the stale-write guard: a cached record may
    /// never move to a lower rank.
    pub fn rank(&self) -> u8 {
        if self.is_terminal() {
            1
        } else {
            0
        }
    }
}

impl fmt::Display for PredictionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PredictionStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(PredictionStatus::Processing),
            "succeeded" => Ok(PredictionStatus::Succeeded),
            "failed" => Ok(PredictionStatus::Failed),
            _ => Err(StatusParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unrecognized prediction status: {0}")]
pub struct StatusParseError(String);

/// User-visible session status. Exactly one of these is shown at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Idle, nothing submitted yet
    #[default]
    Default,
    /// Source video on its way to durable storage
    Uploading,
    /// Submitted, waiting on the provider
    Processing,
    /// Terminal: restored output available
    Succeeded,
    /// Terminal: provider gave up on the job
    Failed,
    /// Terminal for this attempt: a local step broke down
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Default => "default",
            SessionStatus::Uploading => "uploading",
            SessionStatus::Processing => "processing",
            SessionStatus::Succeeded => "succeeded",
            SessionStatus::Failed => "failed",
            SessionStatus::Error => "error",
        }
    }

    /// Check if the session reached the end of an attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Succeeded | SessionStatus::Failed | SessionStatus::Error
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status allowed on a persisted history record. Transient states are
/// unrepresentable here on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Succeeded,
    Failed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Succeeded => "succeeded",
            RecordStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<PredictionStatus> for RecordStatus {
    type Error = StatusParseError;

    fn try_from(status: PredictionStatus) -> Result<Self, Self::Error> {
        match status {
            PredictionStatus::Succeeded => Ok(RecordStatus::Succeeded),
            PredictionStatus::Failed => Ok(RecordStatus::Failed),
            PredictionStatus::Processing => Err(StatusParseError("processing".to_string())),
        }
    }
}

impl FromStr for RecordStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "succeeded" => Ok(RecordStatus::Succeeded),
            "failed" => Ok(RecordStatus::Failed),
            _ => Err(StatusParseError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prediction_status_parse() {
        assert_eq!(
            "processing".parse::<PredictionStatus>().unwrap(),
            PredictionStatus::Processing
        );
        assert_eq!(
            "succeeded".parse::<PredictionStatus>().unwrap(),
            PredictionStatus::Succeeded
        );
        assert!("starting".parse::<PredictionStatus>().is_err());
        assert!("canceled".parse::<PredictionStatus>().is_err());
    }

    #[test]
    fn test_prediction_status_rank() {
        assert_eq!(PredictionStatus::Processing.rank(), 0);
        assert_eq!(PredictionStatus::Succeeded.rank(), 1);
        assert_eq!(PredictionStatus::Failed.rank(), 1);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!PredictionStatus::Processing.is_terminal());
        assert!(PredictionStatus::Succeeded.is_terminal());
        assert!(PredictionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_record_status_rejects_transient() {
        assert!(RecordStatus::try_from(PredictionStatus::Processing).is_err());
        assert_eq!(
            RecordStatus::try_from(PredictionStatus::Failed).unwrap(),
            RecordStatus::Failed
        );
    }

    #[test]
    fn test_session_status_labels() {
        assert_eq!(SessionStatus::Default.as_str(), "default");
        assert_eq!(SessionStatus::Error.as_str(), "error");
        assert!(SessionStatus::Error.is_terminal());
        assert!(!SessionStatus::Uploading.is_terminal());
    }
}
