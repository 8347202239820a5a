//! Restoration session lifecycle.
//!
//! [`RestoreSession`] owns the editable settings and the chosen inputs,
//! and drives one restoration attempt end to end: relay the source into
//! durable storage, submit a frozen settings snapshot, poll the status
//! cache until the provider lands the job, then finalize. Provider
//! failures are resubmitted from the same snapshot a bounded number of
//! times; local failures end the attempt in the `error` state, which is
//! never persisted.

use std::sync::Arc;

use tokio::time::sleep;

use vrestore_models::{
    JobId, MediaDimensions, NewProcessRecord, PredictionRecord, PredictionStatus, RestoreSettings,
    SessionId, SessionStatus, SettingsSnapshot, UploadRole, ValidationError,
};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::logging::{PollFailureLog, SessionLogger};
use crate::seams::{JobSubmitter, RecordSink, StatusSource, UploadRelay};

/// A selected input asset: where it lives now and, when known, its pixel
/// dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaInput {
    pub url: String,
    pub dimensions: Option<MediaDimensions>,
}

impl MediaInput {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            dimensions: None,
        }
    }

    pub fn with_dimensions(url: impl Into<String>, dimensions: MediaDimensions) -> Self {
        Self {
            url: url.into(),
            dimensions: Some(dimensions),
        }
    }
}

/// Lifecycle state of a session. Data lives on the state that owns it: a
/// provider job id only exists while processing, an output URL only after
/// success.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Default,
    Uploading,
    Processing { job_id: JobId },
    Succeeded { output_url: String },
    Failed,
    Error { message: String },
}

impl SessionState {
    /// The user-visible status label for this state.
    pub fn status(&self) -> SessionStatus {
        match self {
            SessionState::Default => SessionStatus::Default,
            SessionState::Uploading => SessionStatus::Uploading,
            SessionState::Processing { .. } => SessionStatus::Processing,
            SessionState::Succeeded { .. } => SessionStatus::Succeeded,
            SessionState::Failed => SessionStatus::Failed,
            SessionState::Error { .. } => SessionStatus::Error,
        }
    }
}

/// One video restoration session.
///
/// The session talks to the backend exclusively through the four seam
/// traits, so the whole lifecycle runs against mocks in tests. `start`
/// and `retry` drive an attempt to a terminal state and return it;
/// mid-flight failures land in [`SessionState::Error`] rather than
/// surfacing as `Err`, which is reserved for precondition and transition
/// violations where no work has started.
pub struct RestoreSession {
    relay: Arc<dyn UploadRelay>,
    submitter: Arc<dyn JobSubmitter>,
    statuses: Arc<dyn StatusSource>,
    sink: Arc<dyn RecordSink>,
    config: EngineConfig,
    logger: SessionLogger,
    session_id: SessionId,
    settings: RestoreSettings,
    source: Option<MediaInput>,
    mask: Option<MediaInput>,
    /// Durable URL of the relayed source. Survives failed attempts so a
    /// retry goes straight to submission.
    durable_video_url: Option<String>,
    state: SessionState,
    resubmissions: u32,
}

impl RestoreSession {
    pub fn new(
        relay: Arc<dyn UploadRelay>,
        submitter: Arc<dyn JobSubmitter>,
        statuses: Arc<dyn StatusSource>,
        sink: Arc<dyn RecordSink>,
        config: EngineConfig,
    ) -> Self {
        let session_id = SessionId::new();
        let logger = SessionLogger::new(&session_id);
        Self {
            relay,
            submitter,
            statuses,
            sink,
            config,
            logger,
            session_id,
            settings: RestoreSettings::new(),
            source: None,
            mask: None,
            durable_video_url: None,
            state: SessionState::Default,
            resubmissions: 0,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status()
    }

    pub fn settings(&self) -> &RestoreSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut RestoreSettings {
        &mut self.settings
    }

    pub fn mask(&self) -> Option<&MediaInput> {
        self.mask.as_ref()
    }

    /// Automatic resubmissions consumed by the current attempt.
    pub fn resubmissions(&self) -> u32 {
        self.resubmissions
    }

    /// Select the source video. Any previous relay result and outcome are
    /// invalidated; the session returns to idle with the new input.
    pub fn set_source(&mut self, input: MediaInput) {
        self.durable_video_url = None;
        self.settings.clear_video_url();
        self.source = Some(input);
        self.resubmissions = 0;
        self.state = SessionState::Default;
    }

    /// Select the inpainting mask. Resolution agreement with the source is
    /// checked when an attempt starts, not here.
    pub fn set_mask(&mut self, input: MediaInput) {
        self.settings.set_mask_url(input.url.clone());
        self.mask = Some(input);
    }

    /// Discard all inputs and results, returning the session to idle with
    /// default settings.
    pub fn reset(&mut self) {
        self.settings = RestoreSettings::new();
        self.source = None;
        self.mask = None;
        self.durable_video_url = None;
        self.resubmissions = 0;
        self.enter(SessionState::Default);
    }

    /// Run one restoration attempt from the idle state and return its
    /// terminal status.
    pub async fn start(&mut self) -> EngineResult<SessionStatus> {
        if !matches!(self.state, SessionState::Default) {
            return Err(EngineError::invalid_transition("start", self.status()));
        }
        let source_url = self.check_preconditions()?;
        self.run_attempt(source_url).await;
        Ok(self.status())
    }

    /// Run the attempt again after a failure. Allowed only from the
    /// `failed` and `error` states. The relayed source survives failed
    /// attempts, so a retry skips the upload when the durable URL already
    /// exists.
    pub async fn retry(&mut self) -> EngineResult<SessionStatus> {
        if !matches!(
            self.state,
            SessionState::Failed | SessionState::Error { .. }
        ) {
            return Err(EngineError::invalid_transition("retry", self.status()));
        }
        let source_url = self.check_preconditions()?;
        self.run_attempt(source_url).await;
        Ok(self.status())
    }

    /// Validate inputs before any network call and return the source URL.
    ///
    /// A mask whose resolution disagrees with the video is discarded, not
    /// just rejected: keeping the stale selection would fail every later
    /// attempt the same way, so the caller is forced to supply a new one.
    fn check_preconditions(&mut self) -> Result<String, ValidationError> {
        let (source_url, video_dims) = match &self.source {
            Some(source) => (source.url.clone(), source.dimensions),
            None => return Err(ValidationError::MissingVideo),
        };

        if !self.settings.task().requires_mask() {
            return Ok(source_url);
        }

        let mask_dims = match &self.mask {
            Some(mask) => mask.dimensions,
            None => return Err(ValidationError::MissingMask),
        };

        if let (Some(video), Some(mask)) = (video_dims, mask_dims) {
            if !video.matches(&mask) {
                self.mask = None;
                self.settings.clear_mask_url();
                return Err(ValidationError::MaskResolutionMismatch { video, mask });
            }
        }

        Ok(source_url)
    }

    async fn run_attempt(&mut self, source_url: String) {
        self.resubmissions = 0;

        let durable = match self.durable_video_url.clone() {
            Some(url) => {
                self.logger
                    .log_progress("upload", "Reusing durable source from an earlier attempt");
                url
            }
            None => {
                self.enter(SessionState::Uploading);
                let uploaded = self.relay.upload(&source_url, UploadRole::Original).await;
                match uploaded {
                    Ok(media) => {
                        self.logger
                            .log_progress("upload", "Source video stored durably");
                        self.durable_video_url = Some(media.url.clone());
                        media.url
                    }
                    Err(e) => {
                        self.fail_attempt("upload", &format!("Source relay failed: {}", e));
                        return;
                    }
                }
            }
        };

        self.settings.set_video_url(durable);
        if let Some(mask) = &self.mask {
            self.settings.set_mask_url(mask.url.clone());
        }

        // The snapshot freezes what this attempt will run with; edits made
        // while the job is in flight do not leak into resubmissions.
        let snapshot = match self.settings.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.fail_attempt("submit", &format!("Settings rejected at submission: {}", e));
                return;
            }
        };

        let submitted = self.submitter.submit(&snapshot).await;
        let job_id = match submitted {
            Ok(job_id) => job_id,
            Err(e) => {
                self.fail_attempt("submit", &format!("Submission failed: {}", e));
                return;
            }
        };

        self.enter(SessionState::Processing {
            job_id: job_id.clone(),
        });
        self.poll_until_terminal(job_id, snapshot).await;
    }

    /// Poll the status cache until the job lands, resubmitting after
    /// provider failures while the budget allows.
    async fn poll_until_terminal(&mut self, mut job_id: JobId, snapshot: SettingsSnapshot) {
        let mut failures = PollFailureLog::new(self.config.max_logged_failures);

        loop {
            sleep(self.config.poll_interval).await;

            let fetched = self.statuses.fetch(&job_id).await;
            let record = match fetched {
                Ok(record) => {
                    failures.on_success();
                    record
                }
                Err(e) => {
                    if failures.on_failure() {
                        self.logger.log_warning(
                            "poll",
                            &format!(
                                "Status read {} of {} failed: {}",
                                failures.consecutive(),
                                self.config.max_poll_errors + 1,
                                e
                            ),
                        );
                    }
                    if failures.consecutive() > self.config.max_poll_errors {
                        self.fail_attempt(
                            "poll",
                            "Status polling gave up after repeated read failures",
                        );
                        return;
                    }
                    sleep(self.config.poll_error_delay).await;
                    continue;
                }
            };

            // Cache miss: the first webhook for this job has not landed yet.
            let record = match record {
                Some(record) => record,
                None => continue,
            };

            match record.status {
                PredictionStatus::Processing => continue,
                PredictionStatus::Failed => {
                    if self.resubmissions >= self.config.max_resubmissions {
                        self.finalize_failed(&record).await;
                        return;
                    }
                    self.resubmissions += 1;
                    self.logger.log_progress(
                        "resubmit",
                        &format!(
                            "Provider failed the job, resubmitting ({} of {})",
                            self.resubmissions, self.config.max_resubmissions
                        ),
                    );
                    let submitted = self.submitter.submit(&snapshot).await;
                    match submitted {
                        Ok(new_id) => {
                            job_id = new_id;
                            self.enter(SessionState::Processing {
                                job_id: job_id.clone(),
                            });
                        }
                        Err(e) => {
                            self.fail_attempt("resubmit", &format!("Resubmission failed: {}", e));
                            return;
                        }
                    }
                }
                PredictionStatus::Succeeded => {
                    self.finalize_succeeded(&record).await;
                    return;
                }
            }
        }
    }

    /// Land the success: relay the provider's raw output into durable
    /// storage, append a history record, and surface the stored URL.
    ///
    /// A failed relay finalizes as `error`, never `succeeded`: the
    /// provider deletes its copy of the output soon after delivery, so a
    /// success pointing at the raw URL would dangle.
    async fn finalize_succeeded(&mut self, record: &PredictionRecord) {
        let raw_url = match record.output_url.as_deref() {
            Some(url) if !url.trim().is_empty() => url.to_string(),
            _ => {
                self.fail_attempt("finalize", "Job succeeded without an output URL");
                return;
            }
        };

        let uploaded = self.relay.upload(&raw_url, UploadRole::Enhanced).await;
        let media = match uploaded {
            Ok(media) => media,
            Err(e) => {
                self.fail_attempt("finalize", &format!("Output relay failed: {}", e));
                return;
            }
        };
        self.logger
            .log_progress("finalize", "Restored output stored durably");

        // History is an audit trail; the restored video exists either way,
        // so a failed write must not take the success away.
        let history = NewProcessRecord::succeeded(record, media.url.clone());
        if let Err(e) = self.sink.persist(&history).await {
            self.logger
                .log_warning("finalize", &format!("History write failed: {}", e));
        }

        self.enter(SessionState::Succeeded {
            output_url: media.url,
        });
    }

    /// Land a provider failure that exhausted the resubmission budget.
    async fn finalize_failed(&mut self, record: &PredictionRecord) {
        let history = NewProcessRecord::failed(record);
        if let Err(e) = self.sink.persist(&history).await {
            self.logger
                .log_warning("finalize", &format!("History write failed: {}", e));
        }

        self.logger.log_error(
            "finalize",
            &format!(
                "Provider failed the job {} times, giving up",
                self.resubmissions + 1
            ),
        );
        self.enter(SessionState::Failed);
    }

    fn enter(&mut self, state: SessionState) {
        self.state = state;
        self.logger.log_transition(self.state.status());
    }

    fn fail_attempt(&mut self, phase: &'static str, message: &str) {
        self.logger.log_error(phase, message);
        self.enter(SessionState::Error {
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use crate::seams::{MockJobSubmitter, MockRecordSink, MockStatusSource, MockUploadRelay};
    use vrestore_models::{RecordStatus, RestoreTask, UploadedMedia};

    const SOURCE_URL: &str = "https://uploads.example.com/input.mp4";
    const MASK_URL: &str = "https://uploads.example.com/mask.png";
    const DURABLE_SOURCE: &str = "https://res.cloudinary.com/demo/video/upload/v1/restore/input.mp4";
    const RAW_OUTPUT: &str = "https://replicate.delivery/pbxt/out/restored.mp4";
    const DURABLE_OUTPUT: &str =
        "https://res.cloudinary.com/demo/video/upload/v1/restore/restored.mp4";

    fn test_config() -> EngineConfig {
        EngineConfig {
            poll_interval: Duration::ZERO,
            poll_error_delay: Duration::ZERO,
            ..EngineConfig::default()
        }
    }

    fn session(
        relay: MockUploadRelay,
        submitter: MockJobSubmitter,
        statuses: MockStatusSource,
        sink: MockRecordSink,
    ) -> RestoreSession {
        RestoreSession::new(
            Arc::new(relay),
            Arc::new(submitter),
            Arc::new(statuses),
            Arc::new(sink),
            test_config(),
        )
    }

    fn media(url: &str, public_id: &str) -> UploadedMedia {
        UploadedMedia {
            url: url.to_string(),
            public_id: public_id.to_string(),
        }
    }

    fn succeeded_record(id: &str) -> PredictionRecord {
        let mut record = PredictionRecord::new(JobId::from_string(id), PredictionStatus::Succeeded)
            .with_output_url(RAW_OUTPUT);
        record.video_url = DURABLE_SOURCE.to_string();
        record.created_at = Some("2024-05-14T10:00:00Z".to_string());
        record
    }

    fn failed_record(id: &str) -> PredictionRecord {
        let mut record = PredictionRecord::new(JobId::from_string(id), PredictionStatus::Failed);
        record.video_url = DURABLE_SOURCE.to_string();
        record.created_at = Some("2024-05-14T10:00:00Z".to_string());
        record
    }

    fn relay_expecting_original(relay: &mut MockUploadRelay) {
        relay
            .expect_upload()
            .withf(|url, role| url == SOURCE_URL && *role == UploadRole::Original)
            .times(1)
            .returning(|_, _| Ok(media(DURABLE_SOURCE, "restore/original/input")));
    }

    fn relay_expecting_enhanced(relay: &mut MockUploadRelay) {
        relay
            .expect_upload()
            .withf(|url, role| url == RAW_OUTPUT && *role == UploadRole::Enhanced)
            .times(1)
            .returning(|_, _| Ok(media(DURABLE_OUTPUT, "restore/enhanced/restored")));
    }

    #[tokio::test]
    async fn test_start_without_video_rejected_before_any_call() {
        let mut session = session(
            MockUploadRelay::new(),
            MockJobSubmitter::new(),
            MockStatusSource::new(),
            MockRecordSink::new(),
        );

        let err = session.start().await.expect_err("start should reject");

        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::MissingVideo)
        ));
        assert_eq!(session.status(), SessionStatus::Default);
    }

    #[tokio::test]
    async fn test_inpainting_without_mask_rejected_before_any_call() {
        let mut session = session(
            MockUploadRelay::new(),
            MockJobSubmitter::new(),
            MockStatusSource::new(),
            MockRecordSink::new(),
        );
        session
            .settings_mut()
            .set_task(RestoreTask::FaceRestorationAndColorizationAndInpainting);
        session.set_source(MediaInput::new(SOURCE_URL));

        let err = session.start().await.expect_err("start should reject");

        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::MissingMask)
        ));
        assert_eq!(session.status(), SessionStatus::Default);
    }

    #[tokio::test]
    async fn test_mismatched_mask_resolution_clears_mask() {
        let mut session = session(
            MockUploadRelay::new(),
            MockJobSubmitter::new(),
            MockStatusSource::new(),
            MockRecordSink::new(),
        );
        session
            .settings_mut()
            .set_task(RestoreTask::FaceRestorationAndColorizationAndInpainting);
        session.set_source(MediaInput::with_dimensions(
            SOURCE_URL,
            MediaDimensions::new(1280, 720),
        ));
        session.set_mask(MediaInput::with_dimensions(
            MASK_URL,
            MediaDimensions::new(640, 360),
        ));

        let err = session.start().await.expect_err("start should reject");

        match err {
            EngineError::Validation(ValidationError::MaskResolutionMismatch { video, mask }) => {
                assert_eq!(video, MediaDimensions::new(1280, 720));
                assert_eq!(mask, MediaDimensions::new(640, 360));
            }
            other => panic!("expected resolution mismatch, got {:?}", other),
        }
        // The stale mask is gone so the caller must supply a matching one.
        assert!(session.mask().is_none());
        assert_eq!(session.settings().mask_url(), None);
        assert_eq!(session.status(), SessionStatus::Default);
    }

    #[tokio::test]
    async fn test_restoration_succeeds_first_try() {
        let mut relay = MockUploadRelay::new();
        relay_expecting_original(&mut relay);
        relay_expecting_enhanced(&mut relay);

        let mut submitter = MockJobSubmitter::new();
        submitter
            .expect_submit()
            .withf(|snapshot| {
                snapshot.video_url() == DURABLE_SOURCE && snapshot.mask_url().is_none()
            })
            .times(1)
            .returning(|_| Ok(JobId::from_string("job-1")));

        let mut statuses = MockStatusSource::new();
        statuses
            .expect_fetch()
            .withf(|job_id| job_id.as_str() == "job-1")
            .times(1)
            .returning(|_| Ok(Some(succeeded_record("job-1"))));

        let mut sink = MockRecordSink::new();
        sink.expect_persist()
            .withf(|record| {
                record.status() == RecordStatus::Succeeded
                    && record.outcome.output_url() == DURABLE_OUTPUT
                    && record.video_url == DURABLE_SOURCE
            })
            .times(1)
            .returning(|_| Ok("rec-1".to_string()));

        let mut session = session(relay, submitter, statuses, sink);
        session.set_source(MediaInput::new(SOURCE_URL));

        let status = session.start().await.expect("start should run");

        assert_eq!(status, SessionStatus::Succeeded);
        assert_eq!(
            session.state(),
            &SessionState::Succeeded {
                output_url: DURABLE_OUTPUT.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_plain_restoration_drops_selected_mask_from_submission() {
        let mut relay = MockUploadRelay::new();
        relay_expecting_original(&mut relay);

        let mut submitter = MockJobSubmitter::new();
        submitter
            .expect_submit()
            .withf(|snapshot| snapshot.mask_url().is_none())
            .times(1)
            .returning(|_| Err(EngineError::backend(500, "provider down")));

        let mut session = session(relay, submitter, MockStatusSource::new(), MockRecordSink::new());
        session.set_source(MediaInput::new(SOURCE_URL));
        // Mask selected earlier, but the default task does not use one.
        session.set_mask(MediaInput::new(MASK_URL));

        let status = session.start().await.expect("start should run");

        assert_eq!(status, SessionStatus::Error);
    }

    #[tokio::test]
    async fn test_four_provider_failures_exhaust_resubmissions() {
        let mut relay = MockUploadRelay::new();
        relay_expecting_original(&mut relay);

        let minted = Arc::new(AtomicU32::new(0));
        let mut submitter = MockJobSubmitter::new();
        {
            let minted = minted.clone();
            submitter.expect_submit().times(4).returning(move |_| {
                let n = minted.fetch_add(1, Ordering::SeqCst);
                Ok(JobId::from_string(format!("job-{}", n)))
            });
        }

        let mut statuses = MockStatusSource::new();
        statuses
            .expect_fetch()
            .times(4)
            .returning(|job_id| Ok(Some(failed_record(job_id.as_str()))));

        let mut sink = MockRecordSink::new();
        sink.expect_persist()
            .withf(|record| {
                record.status() == RecordStatus::Failed && record.outcome.output_url().is_empty()
            })
            .times(1)
            .returning(|_| Ok("rec-f".to_string()));

        let mut session = session(relay, submitter, statuses, sink);
        session.set_source(MediaInput::new(SOURCE_URL));

        let status = session.start().await.expect("start should run");

        assert_eq!(status, SessionStatus::Failed);
        assert_eq!(session.resubmissions(), 3);
    }

    #[tokio::test]
    async fn test_resubmission_recovers_when_a_later_job_succeeds() {
        let mut relay = MockUploadRelay::new();
        relay_expecting_original(&mut relay);
        relay_expecting_enhanced(&mut relay);

        let minted = Arc::new(AtomicU32::new(0));
        let mut submitter = MockJobSubmitter::new();
        {
            let minted = minted.clone();
            submitter.expect_submit().times(4).returning(move |_| {
                let n = minted.fetch_add(1, Ordering::SeqCst);
                Ok(JobId::from_string(format!("job-{}", n)))
            });
        }

        let mut statuses = MockStatusSource::new();
        statuses.expect_fetch().times(4).returning(|job_id| {
            if job_id.as_str() == "job-3" {
                Ok(Some(succeeded_record("job-3")))
            } else {
                Ok(Some(failed_record(job_id.as_str())))
            }
        });

        let mut sink = MockRecordSink::new();
        sink.expect_persist()
            .withf(|record| record.status() == RecordStatus::Succeeded)
            .times(1)
            .returning(|_| Ok("rec-1".to_string()));

        let mut session = session(relay, submitter, statuses, sink);
        session.set_source(MediaInput::new(SOURCE_URL));

        let status = session.start().await.expect("start should run");

        assert_eq!(status, SessionStatus::Succeeded);
        assert_eq!(session.resubmissions(), 3);
    }

    #[tokio::test]
    async fn test_poll_error_budget_lands_in_error_not_failed() {
        let mut relay = MockUploadRelay::new();
        relay_expecting_original(&mut relay);

        let mut submitter = MockJobSubmitter::new();
        submitter
            .expect_submit()
            .times(1)
            .returning(|_| Ok(JobId::from_string("job-1")));

        // One initial read plus five retries, all failing.
        let mut statuses = MockStatusSource::new();
        statuses
            .expect_fetch()
            .times(6)
            .returning(|_| Err(EngineError::backend(503, "cache down")));

        let mut session = session(relay, submitter, statuses, MockRecordSink::new());
        session.set_source(MediaInput::new(SOURCE_URL));

        let status = session.start().await.expect("start should run");

        assert_eq!(status, SessionStatus::Error);
    }

    #[tokio::test]
    async fn test_successful_read_resets_poll_error_budget() {
        let mut relay = MockUploadRelay::new();
        relay_expecting_original(&mut relay);
        relay_expecting_enhanced(&mut relay);

        let mut submitter = MockJobSubmitter::new();
        submitter
            .expect_submit()
            .times(1)
            .returning(|_| Ok(JobId::from_string("job-1")));

        // Ten read failures in total, but never more than five in a row:
        // a cache miss in between counts as a successful read.
        let calls = Arc::new(AtomicU32::new(0));
        let mut statuses = MockStatusSource::new();
        {
            let calls = calls.clone();
            statuses.expect_fetch().times(12).returning(move |_| {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0..=4 => Err(EngineError::backend(503, "cache down")),
                    5 => Ok(None),
                    6..=10 => Err(EngineError::backend(503, "cache down")),
                    _ => Ok(Some(succeeded_record("job-1"))),
                }
            });
        }

        let mut sink = MockRecordSink::new();
        sink.expect_persist()
            .times(1)
            .returning(|_| Ok("rec-1".to_string()));

        let mut session = session(relay, submitter, statuses, sink);
        session.set_source(MediaInput::new(SOURCE_URL));

        let status = session.start().await.expect("start should run");

        assert_eq!(status, SessionStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_output_relay_failure_never_reports_success() {
        let mut relay = MockUploadRelay::new();
        relay_expecting_original(&mut relay);
        relay
            .expect_upload()
            .withf(|url, role| url == RAW_OUTPUT && *role == UploadRole::Enhanced)
            .times(1)
            .returning(|_, _| Err(EngineError::backend(502, "storage down")));

        let mut submitter = MockJobSubmitter::new();
        submitter
            .expect_submit()
            .times(1)
            .returning(|_| Ok(JobId::from_string("job-1")));

        let mut statuses = MockStatusSource::new();
        statuses
            .expect_fetch()
            .times(1)
            .returning(|_| Ok(Some(succeeded_record("job-1"))));

        // No history write: the attempt did not reach a persistable outcome.
        let mut session = session(relay, submitter, statuses, MockRecordSink::new());
        session.set_source(MediaInput::new(SOURCE_URL));

        let status = session.start().await.expect("start should run");

        assert_eq!(status, SessionStatus::Error);
    }

    #[tokio::test]
    async fn test_success_without_output_url_is_an_error() {
        let mut relay = MockUploadRelay::new();
        relay_expecting_original(&mut relay);

        let mut submitter = MockJobSubmitter::new();
        submitter
            .expect_submit()
            .times(1)
            .returning(|_| Ok(JobId::from_string("job-1")));

        let mut statuses = MockStatusSource::new();
        statuses.expect_fetch().times(1).returning(|_| {
            let mut record =
                PredictionRecord::new(JobId::from_string("job-1"), PredictionStatus::Succeeded);
            record.video_url = DURABLE_SOURCE.to_string();
            Ok(Some(record))
        });

        let mut session = session(relay, submitter, statuses, MockRecordSink::new());
        session.set_source(MediaInput::new(SOURCE_URL));

        let status = session.start().await.expect("start should run");

        assert_eq!(status, SessionStatus::Error);
    }

    #[tokio::test]
    async fn test_history_write_failure_keeps_the_success() {
        let mut relay = MockUploadRelay::new();
        relay_expecting_original(&mut relay);
        relay_expecting_enhanced(&mut relay);

        let mut submitter = MockJobSubmitter::new();
        submitter
            .expect_submit()
            .times(1)
            .returning(|_| Ok(JobId::from_string("job-1")));

        let mut statuses = MockStatusSource::new();
        statuses
            .expect_fetch()
            .times(1)
            .returning(|_| Ok(Some(succeeded_record("job-1"))));

        let mut sink = MockRecordSink::new();
        sink.expect_persist()
            .times(1)
            .returning(|_| Err(EngineError::backend(500, "history down")));

        let mut session = session(relay, submitter, statuses, sink);
        session.set_source(MediaInput::new(SOURCE_URL));

        let status = session.start().await.expect("start should run");

        assert_eq!(status, SessionStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_cache_miss_keeps_polling_until_terminal() {
        let mut relay = MockUploadRelay::new();
        relay_expecting_original(&mut relay);
        relay_expecting_enhanced(&mut relay);

        let mut submitter = MockJobSubmitter::new();
        submitter
            .expect_submit()
            .times(1)
            .returning(|_| Ok(JobId::from_string("job-1")));

        let calls = Arc::new(AtomicU32::new(0));
        let mut statuses = MockStatusSource::new();
        {
            let calls = calls.clone();
            statuses.expect_fetch().times(2).returning(move |_| {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Ok(None)
                } else {
                    Ok(Some(succeeded_record("job-1")))
                }
            });
        }

        let mut sink = MockRecordSink::new();
        sink.expect_persist()
            .times(1)
            .returning(|_| Ok("rec-1".to_string()));

        let mut session = session(relay, submitter, statuses, sink);
        session.set_source(MediaInput::new(SOURCE_URL));

        let status = session.start().await.expect("start should run");

        assert_eq!(status, SessionStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_retry_skips_upload_when_durable_source_exists() {
        let mut relay = MockUploadRelay::new();
        // The source is relayed exactly once across both attempts.
        relay_expecting_original(&mut relay);
        relay_expecting_enhanced(&mut relay);

        let calls = Arc::new(AtomicU32::new(0));
        let mut submitter = MockJobSubmitter::new();
        {
            let calls = calls.clone();
            submitter.expect_submit().times(2).returning(move |_| {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(EngineError::backend(500, "provider down"))
                } else {
                    Ok(JobId::from_string("job-1"))
                }
            });
        }

        let mut statuses = MockStatusSource::new();
        statuses
            .expect_fetch()
            .times(1)
            .returning(|_| Ok(Some(succeeded_record("job-1"))));

        let mut sink = MockRecordSink::new();
        sink.expect_persist()
            .times(1)
            .returning(|_| Ok("rec-1".to_string()));

        let mut session = session(relay, submitter, statuses, sink);
        session.set_source(MediaInput::new(SOURCE_URL));

        let first = session.start().await.expect("first start should run");
        assert_eq!(first, SessionStatus::Error);

        let second = session.retry().await.expect("retry should run");
        assert_eq!(second, SessionStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_retry_only_from_failure_states() {
        let mut session = session(
            MockUploadRelay::new(),
            MockJobSubmitter::new(),
            MockStatusSource::new(),
            MockRecordSink::new(),
        );
        session.set_source(MediaInput::new(SOURCE_URL));

        let err = session.retry().await.expect_err("retry should reject");

        assert!(matches!(
            err,
            EngineError::InvalidTransition {
                operation: "retry",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_start_not_reentrant_after_terminal_state() {
        let mut relay = MockUploadRelay::new();
        relay_expecting_original(&mut relay);

        let mut submitter = MockJobSubmitter::new();
        submitter
            .expect_submit()
            .times(1)
            .returning(|_| Err(EngineError::backend(500, "provider down")));

        let mut session = session(relay, submitter, MockStatusSource::new(), MockRecordSink::new());
        session.set_source(MediaInput::new(SOURCE_URL));

        let status = session.start().await.expect("first start should run");
        assert_eq!(status, SessionStatus::Error);

        let err = session.start().await.expect_err("second start should reject");
        assert!(matches!(
            err,
            EngineError::InvalidTransition {
                operation: "start",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_reset_returns_to_idle_defaults() {
        let mut session = session(
            MockUploadRelay::new(),
            MockJobSubmitter::new(),
            MockStatusSource::new(),
            MockRecordSink::new(),
        );
        session
            .settings_mut()
            .set_task(RestoreTask::FaceRestorationAndColorizationAndInpainting);
        session.set_source(MediaInput::new(SOURCE_URL));
        session.set_mask(MediaInput::new(MASK_URL));

        session.reset();

        assert_eq!(session.status(), SessionStatus::Default);
        assert!(session.mask().is_none());
        assert_eq!(session.settings().task(), RestoreTask::FaceRestoration);

        let err = session.start().await.expect_err("no source after reset");
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::MissingVideo)
        ));
    }
}
