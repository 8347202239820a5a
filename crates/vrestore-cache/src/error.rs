//! Cache error types.

use thiserror::Error;

use vrestore_models::RecordFieldError;

pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Stored record is invalid: {0}")]
    InvalidRecord(#[from] RecordFieldError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl CacheError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn write_failed(msg: impl Into<String>) -> Self {
        Self::WriteFailed(msg.into())
    }

    /// Whether retrying the same operation could succeed.
    ///
    /// Transport-level failures are retryable; a record that does not parse
    /// back never is.
    pub fn is_retryable(&self) -> bool {
        match self {
            CacheError::Redis(e) => {
                e.is_io_error()
                    || e.is_timeout()
                    || e.is_connection_dropped()
                    || e.is_connection_refusal()
            }
            CacheError::ConnectionFailed(_) => true,
            CacheError::WriteFailed(_) => true,
            CacheError::InvalidRecord(_) => false,
        }
    }
}
