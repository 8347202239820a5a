//! Session orchestration for the VidRestore backend.
//!
//! This crate drives one restoration session against the HTTP backend:
//! relay the source into durable storage, submit a frozen settings
//! snapshot, poll the status cache with bounded resubmission and
//! read-error budgets, then finalize into history. The session talks
//! through seam traits, so the whole lifecycle runs against mocks in
//! tests and against [`BackendClient`] in production.

pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod seams;
pub mod session;

pub use backend::{BackendClient, BackendConfig};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use seams::{JobSubmitter, RecordSink, StatusSource, UploadRelay};
pub use session::{MediaInput, RestoreSession, SessionState};
