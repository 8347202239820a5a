//! Engine configuration.

use std::time::Duration;

/// Orchestration tuning for one restoration session.
///
/// The defaults are the production constants; tests shrink the intervals
/// to zero so a full lifecycle runs in microseconds.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Delay between cache polls while a job is processing
    pub poll_interval: Duration,
    /// Delay before retrying after a failed status read
    pub poll_error_delay: Duration,
    /// Automatic resubmissions allowed after provider-reported failures
    pub max_resubmissions: u32,
    /// Consecutive status-read failures tolerated before giving up
    pub max_poll_errors: u32,
    /// Consecutive poll failures logged before suppression kicks in
    pub max_logged_failures: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(8),
            poll_error_delay: Duration::from_secs(10),
            max_resubmissions: 3,
            max_poll_errors: 5,
            max_logged_failures: 3,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            poll_interval: Duration::from_secs(
                std::env::var("VRESTORE_POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(8),
            ),
            poll_error_delay: Duration::from_secs(
                std::env::var("VRESTORE_POLL_ERROR_DELAY_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            max_resubmissions: std::env::var("VRESTORE_MAX_RESUBMISSIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            max_poll_errors: std::env::var("VRESTORE_MAX_POLL_ERRORS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            max_logged_failures: std::env::var("VRESTORE_MAX_LOGGED_FAILURES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
        }
    }
}
