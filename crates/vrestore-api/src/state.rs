//! Application state.

use std::sync::Arc;

use vrestore_cache::{CacheClient, PredictionStore};
use vrestore_db::{FirestoreClient, HistoryRepository};
use vrestore_provider::ReplicateClient;
use vrestore_storage::CloudinaryClient;

use crate::auth::JwksCache;
use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub storage: Arc<CloudinaryClient>,
    pub provider: Arc<ReplicateClient>,
    pub firestore: Arc<FirestoreClient>,
    pub history: HistoryRepository,
    pub cache: CacheClient,
    pub predictions: PredictionStore,
    pub jwks: Arc<JwksCache>,
}

impl AppState {
    /// Create new application state, connecting every dependency.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let storage = CloudinaryClient::from_env()?;
        let provider = ReplicateClient::from_env()?;
        let firestore = FirestoreClient::from_env().await?;
        let cache = CacheClient::connect_from_env().await?;
        let jwks = JwksCache::new().await?;

        let firestore_arc = Arc::new(firestore);
        let history = HistoryRepository::new((*firestore_arc).clone());
        let predictions = PredictionStore::new(cache.clone());

        Ok(Self {
            config,
            storage: Arc::new(storage),
            provider: Arc::new(provider),
            firestore: firestore_arc,
            history,
            cache,
            predictions,
            jwks: Arc::new(jwks),
        })
    }
}
