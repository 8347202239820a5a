//! Redis-backed cache for prediction status.
//!
//! This crate provides:
//! - A connection handle with bounded startup retry and health checks
//! - The prediction record store the webhook receiver writes and the
//!   status endpoint reads

pub mod client;
pub mod error;
pub mod store;

pub use client::{CacheClient, CacheConfig};
pub use error::{CacheError, CacheResult};
pub use store::{
    PredictionStore, WriteOutcome, DEFAULT_WRITE_ATTEMPTS, DEFAULT_WRITE_RETRY_DELAY,
};
