//! Engine error types.

use thiserror::Error;

use vrestore_models::{RecordFieldError, SessionStatus, ValidationError};

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Cannot {operation} from the {state} state")]
    InvalidTransition {
        operation: &'static str,
        state: SessionStatus,
    },

    #[error("Backend returned {status}: {detail}")]
    Backend { status: u16, detail: String },

    #[error("Backend response invalid: {0}")]
    InvalidResponse(String),

    #[error("Cached record unreadable: {0}")]
    Fields(#[from] RecordFieldError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl EngineError {
    pub fn invalid_transition(operation: &'static str, state: SessionStatus) -> Self {
        Self::InvalidTransition { operation, state }
    }

    pub fn backend(status: u16, detail: impl Into<String>) -> Self {
        Self::Backend {
            status,
            detail: detail.into(),
        }
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }
}
