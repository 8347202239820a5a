//! Prediction record storage.

use std::collections::HashMap;
use std::time::Duration;

use redis::AsyncCommands;
use tracing::{debug, info, warn};

use vrestore_models::{JobId, PredictionRecord};

use crate::client::CacheClient;
use crate::error::{CacheError, CacheResult};

/// Write attempts for one webhook delivery.
pub const DEFAULT_WRITE_ATTEMPTS: u32 = 3;
/// Fixed delay between write attempts.
pub const DEFAULT_WRITE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// What happened to a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The record was stored.
    Applied,
    /// A terminal record was already stored; the write was acknowledged
    /// but not applied.
    Stale,
}

/// Store for webhook-delivered prediction records, keyed by job id.
#[derive(Clone)]
pub struct PredictionStore {
    cache: CacheClient,
}

impl PredictionStore {
    pub fn new(cache: CacheClient) -> Self {
        Self { cache }
    }

    /// Get the cache key for a job.
    pub fn key(job_id: &JobId) -> String {
        format!("prediction:{}", job_id)
    }

    /// Store a record unless it would overwrite a higher-ranked one.
    ///
    /// Webhooks can arrive out of order; a `processing` delivery that lands
    /// after `succeeded` or `failed` must not resurrect the job. Equal-rank
    /// writes go through, which keeps duplicate deliveries idempotent.
    pub async fn put(&self, record: &PredictionRecord) -> CacheResult<WriteOutcome> {
        let key = Self::key(&record.id);
        let mut conn = self.cache.connection();

        let stored_rank: Option<u8> = conn.hget(&key, "status_rank").await?;
        if let Some(rank) = stored_rank {
            if rank > record.status_rank() {
                warn!(
                    "Ignoring stale {} write for prediction {} (already terminal)",
                    record.status, record.id
                );
                return Ok(WriteOutcome::Stale);
            }
        }

        conn.hset_multiple::<_, _, _, ()>(&key, &record.to_fields())
            .await?;
        debug!("Stored prediction {} as {}", record.id, record.status);
        Ok(WriteOutcome::Applied)
    }

    /// Store a record, retrying transport failures a fixed number of times.
    pub async fn put_with_retry(
        &self,
        record: &PredictionRecord,
        attempts: u32,
        delay: Duration,
    ) -> CacheResult<WriteOutcome> {
        let attempts = attempts.max(1);
        let mut last_err = None;

        for attempt in 1..=attempts {
            match self.put(record).await {
                Ok(outcome) => {
                    if attempt > 1 {
                        info!(
                            "Cache write for prediction {} succeeded on attempt {}",
                            record.id, attempt
                        );
                    }
                    return Ok(outcome);
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(
                        "Cache write attempt {}/{} for prediction {} failed: {}",
                        attempt, attempts, record.id, e
                    );
                    last_err = Some(e);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| CacheError::write_failed("retries exhausted")))
    }

    /// Read the record for a job, if one has been stored.
    pub async fn get(&self, job_id: &JobId) -> CacheResult<Option<PredictionRecord>> {
        let key = Self::key(job_id);
        let mut conn = self.cache.connection();

        let fields: HashMap<String, String> = conn.hgetall(&key).await?;
        if fields.is_empty() {
            return Ok(None);
        }

        Ok(Some(PredictionRecord::from_fields(&fields)?))
    }

    /// Remove the record for a job.
    pub async fn delete(&self, job_id: &JobId) -> CacheResult<()> {
        let key = Self::key(job_id);
        let mut conn = self.cache.connection();
        conn.del::<_, ()>(&key).await?;
        debug!("Deleted prediction {}", job_id);
        Ok(())
    }
}
