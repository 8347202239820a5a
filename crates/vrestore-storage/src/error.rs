use thiserror::Error;

/// Errors surfaced by the upload relay.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage configuration error: {0}")]
    ConfigError(String),

    #[error("Upload rejected with status {status}: {detail}")]
    UploadRejected { status: u16, detail: String },

    #[error("Upload response contained no usable URL")]
    MissingUrl,

    #[error("Upload response could not be parsed: {0}")]
    InvalidResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn upload_rejected(status: u16, detail: impl Into<String>) -> Self {
        Self::UploadRejected {
            status,
            detail: detail.into(),
        }
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Transport failures and provider-side overload are worth retrying,
    /// rejections of the request itself are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::UploadRejected { status, .. } => *status == 429 || *status >= 500,
            Self::ConfigError(_) | Self::MissingUrl | Self::InvalidResponse(_) => false,
        }
    }
}
