//! Client for the Replicate inference provider.
//!
//! Submission freezes the user's settings into a snapshot before anything
//! touches the network, renames the knobs to the provider's vocabulary and
//! registers the webhook callback. Status flows back through the webhook
//! into the cache; this crate only talks to the provider itself.

pub mod client;
pub mod error;
pub mod types;

pub use client::{ReplicateClient, ReplicateConfig, DEFAULT_MODEL_VERSION, WEBHOOK_EVENTS};
pub use error::{ProviderError, ProviderResult};
pub use types::{CreatePredictionRequest, PredictionInput, PredictionMetrics, PredictionPayload};
