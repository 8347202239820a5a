//! Structured session logging.

use tracing::{debug, error, info, warn};

use vrestore_models::{SessionId, SessionStatus};

/// Logger carrying the session correlation id on every line.
///
/// The session id ties log lines together before a provider job id exists
/// and across resubmissions, which mint fresh job ids.
#[derive(Debug, Clone)]
pub struct SessionLogger {
    session_id: String,
}

impl SessionLogger {
    pub fn new(session_id: &SessionId) -> Self {
        Self {
            session_id: session_id.to_string(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn log_transition(&self, status: SessionStatus) {
        info!(
            session_id = %self.session_id,
            status = %status,
            "Session entered {}", status
        );
    }

    pub fn log_progress(&self, phase: &str, message: &str) {
        info!(
            session_id = %self.session_id,
            phase = %phase,
            "{}", message
        );
    }

    pub fn log_warning(&self, phase: &str, message: &str) {
        warn!(
            session_id = %self.session_id,
            phase = %phase,
            "{}", message
        );
    }

    pub fn log_error(&self, phase: &str, message: &str) {
        error!(
            session_id = %self.session_id,
            phase = %phase,
            "{}", message
        );
    }
}

/// Suppression window for repeated poll failures.
///
/// The first few consecutive failures are logged; after that a single
/// suppression notice is emitted and further failures stay quiet until a
/// successful read resets the window. Keeps a flapping cache from
/// flooding the log at one line per poll.
#[derive(Debug)]
pub struct PollFailureLog {
    window: u32,
    consecutive: u32,
}

impl PollFailureLog {
    pub fn new(window: u32) -> Self {
        Self {
            window,
            consecutive: 0,
        }
    }

    /// Record a failed read. Returns `true` when this one should be logged.
    pub fn on_failure(&mut self) -> bool {
        self.consecutive += 1;
        if self.consecutive <= self.window {
            return true;
        }
        if self.consecutive == self.window + 1 {
            warn!(
                "Suppressing further poll failure logs after {} consecutive failures",
                self.window
            );
        }
        false
    }

    /// Record a successful read, resetting the window.
    pub fn on_success(&mut self) {
        if self.consecutive > self.window {
            debug!(
                "Polling recovered after {} consecutive failures",
                self.consecutive
            );
        }
        self.consecutive = 0;
    }

    /// Current consecutive failure count.
    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_log_suppresses_after_window() {
        let mut log = PollFailureLog::new(2);

        assert!(log.on_failure());
        assert!(log.on_failure());
        // Third consecutive failure emits the suppression notice, then quiet.
        assert!(!log.on_failure());
        assert!(!log.on_failure());
        assert_eq!(log.consecutive(), 4);
    }

    #[test]
    fn test_success_resets_window() {
        let mut log = PollFailureLog::new(1);

        assert!(log.on_failure());
        assert!(!log.on_failure());

        log.on_success();
        assert_eq!(log.consecutive(), 0);
        assert!(log.on_failure());
    }
}
