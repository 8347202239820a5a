//! Firestore-backed restoration history.
//!
//! This crate provides:
//! - A minimal Firestore REST client (create + structured query)
//! - Service account authentication via gcp_auth with token caching
//! - The append-only [`HistoryRepository`] for finished restorations
//! - Retry with exponential backoff and jitter

pub mod client;
pub mod error;
pub mod history;
pub mod metrics;
pub mod retry;
pub mod token_cache;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{DbError, DbResult};
pub use history::{HistoryRepository, HISTORY_LIMIT};
pub use retry::RetryConfig;
pub use types::{Document, FromFirestoreValue, StructuredQuery, ToFirestoreValue, Value};
