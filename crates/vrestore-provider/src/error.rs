//! Provider client error types.

use thiserror::Error;

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider configuration error: {0}")]
    ConfigError(String),

    #[error("Provider request failed with status {status}: {detail}")]
    RequestFailed { status: u16, detail: String },

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProviderError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn request_failed(status: u16, detail: impl Into<String>) -> Self {
        Self::RequestFailed {
            status,
            detail: detail.into(),
        }
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Overload and transport failures are retryable, rejected requests and
    /// malformed responses are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::RequestFailed { status, .. } => *status == 429 || *status >= 500,
            Self::ConfigError(_) | Self::InvalidResponse(_) | Self::Json(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability_by_status() {
        assert!(ProviderError::request_failed(429, "throttled").is_retryable());
        assert!(ProviderError::request_failed(502, "bad gateway").is_retryable());
        assert!(!ProviderError::request_failed(401, "bad token").is_retryable());
        assert!(!ProviderError::request_failed(422, "bad input").is_retryable());
    }

    #[test]
    fn test_config_and_parse_errors_are_permanent() {
        assert!(!ProviderError::config_error("REPLICATE_API_TOKEN not set").is_retryable());
        assert!(!ProviderError::invalid_response("missing id").is_retryable());
    }
}
