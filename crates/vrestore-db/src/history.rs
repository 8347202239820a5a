//! Restoration history repository.
//!
//! One document per finished restoration under
//! `users/{userId}/{collection}`, written once and never updated. Listing
//! is newest-first with a hard cap, matching what the history view shows.

use std::collections::HashMap;

use tracing::{info, warn};
use vrestore_models::{RecordStatus, RestoreTask, VideoProcessRecord};

use crate::client::FirestoreClient;
use crate::error::{DbError, DbResult};
use crate::types::{
    CollectionSelector, Document, FromFirestoreValue, Order, StructuredQuery, ToFirestoreValue,
    Value,
};

/// Most records a single listing returns.
pub const HISTORY_LIMIT: usize = 100;

const DEFAULT_COLLECTION_ID: &str = "restorations";

/// Repository for restoration history documents.
#[derive(Clone)]
pub struct HistoryRepository {
    client: FirestoreClient,
    collection_id: String,
}

impl HistoryRepository {
    /// Create a repository using the collection id from the environment,
    /// falling back to `restorations`.
    pub fn new(client: FirestoreClient) -> Self {
        let collection_id = std::env::var("HISTORY_COLLECTION")
            .unwrap_or_else(|_| DEFAULT_COLLECTION_ID.to_string());
        Self::with_collection(client, collection_id)
    }

    /// Create a repository targeting an explicit collection id.
    pub fn with_collection(client: FirestoreClient, collection_id: impl Into<String>) -> Self {
        Self {
            client,
            collection_id: collection_id.into(),
        }
    }

    fn parent_path(&self, user_id: &str) -> String {
        format!("users/{}", user_id)
    }

    fn collection_path(&self, user_id: &str) -> String {
        format!("users/{}/{}", user_id, self.collection_id)
    }

    /// Insert a finished restoration. Append-only: a duplicate id is an
    /// error, not an overwrite.
    pub async fn insert(&self, record: &VideoProcessRecord) -> DbResult<()> {
        let collection = self.collection_path(&record.user_id);
        let fields = record_to_fields(record);

        self.client
            .with_retry("insert_restoration", || async {
                match self
                    .client
                    .create_document(&collection, &record.id, fields.clone())
                    .await
                {
                    Ok(_) => Ok(()),
                    // A replayed insert of the same record is already durable.
                    Err(DbError::AlreadyExists(_)) => Ok(()),
                    Err(e) => Err(e),
                }
            })
            .await?;

        info!(
            user_id = %record.user_id,
            record_id = %record.id,
            status = %record.status,
            "Stored restoration record"
        );
        Ok(())
    }

    /// List a user's restorations, newest first, capped at [`HISTORY_LIMIT`].
    pub async fn list(&self, user_id: &str) -> DbResult<Vec<VideoProcessRecord>> {
        let parent = self.parent_path(user_id);

        let documents = self
            .client
            .with_retry("list_restorations", || async {
                let query = StructuredQuery {
                    from: vec![CollectionSelector {
                        collection_id: self.collection_id.clone(),
                    }],
                    // Secondary __name__ ordering makes ties deterministic.
                    order_by: vec![
                        Order::descending("created_at"),
                        Order::descending("__name__"),
                    ],
                    limit: Some(HISTORY_LIMIT as i32),
                };
                self.client.run_query(&parent, query).await
            })
            .await?;

        let mut records = Vec::with_capacity(documents.len());
        for doc in &documents {
            match record_from_document(doc, user_id) {
                Some(record) => records.push(record),
                None => {
                    warn!(
                        doc = %doc.name.as_deref().unwrap_or("<unnamed>"),
                        "Skipping undecodable restoration document"
                    );
                }
            }
        }

        Ok(records)
    }
}

fn record_to_fields(record: &VideoProcessRecord) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("user_id".to_string(), record.user_id.to_firestore_value());
    fields.insert(
        "video_url".to_string(),
        record.video_url.to_firestore_value(),
    );
    if let Some(ref mask) = record.mask {
        fields.insert("mask".to_string(), mask.to_firestore_value());
    }
    fields.insert(
        "output_url".to_string(),
        record.output_url.to_firestore_value(),
    );
    fields.insert(
        "status".to_string(),
        record.status.as_str().to_firestore_value(),
    );
    fields.insert(
        "created_at".to_string(),
        record.created_at.to_firestore_value(),
    );
    if let Some(completed_at) = record.completed_at {
        fields.insert("completed_at".to_string(), completed_at.to_firestore_value());
    }
    fields.insert(
        "tasks".to_string(),
        record.tasks.as_str().to_firestore_value(),
    );
    fields.insert(
        "num_inference_steps".to_string(),
        record.num_inference_steps.to_firestore_value(),
    );
    fields.insert(
        "decode_chunk_size".to_string(),
        record.decode_chunk_size.to_firestore_value(),
    );
    fields.insert("overlap".to_string(), record.overlap.to_firestore_value());
    fields.insert(
        "noise_aug_strength".to_string(),
        record.noise_aug_strength.to_firestore_value(),
    );
    fields.insert(
        "min_appearance_guidance".to_string(),
        record.min_appearance_guidance.to_firestore_value(),
    );
    fields.insert(
        "max_appearance_guidance".to_string(),
        record.max_appearance_guidance.to_firestore_value(),
    );
    fields.insert(
        "i2i_noise_strength".to_string(),
        record.i2i_noise_strength.to_firestore_value(),
    );
    fields.insert("seed".to_string(), record.seed.to_firestore_value());
    fields.insert(
        "predict_time".to_string(),
        record.predict_time.to_firestore_value(),
    );
    fields.insert(
        "updated_at".to_string(),
        record.updated_at.to_firestore_value(),
    );
    fields
}

fn record_from_document(doc: &Document, user_id: &str) -> Option<VideoProcessRecord> {
    let fields = doc.fields.as_ref()?;
    let id = doc.doc_id()?.to_string();

    let get_string =
        |name: &str| fields.get(name).and_then(|v| String::from_firestore_value(v));
    let get_u32 = |name: &str| fields.get(name).and_then(|v| u32::from_firestore_value(v));
    let get_f64 = |name: &str| fields.get(name).and_then(|v| f64::from_firestore_value(v));

    let status: RecordStatus = get_string("status")?.parse().ok()?;
    let tasks: RestoreTask = get_string("tasks")?.parse().ok()?;

    Some(VideoProcessRecord {
        id,
        user_id: user_id.to_string(),
        video_url: get_string("video_url")?,
        mask: get_string("mask"),
        output_url: get_string("output_url").unwrap_or_default(),
        status,
        created_at: fields
            .get("created_at")
            .and_then(|v| chrono::DateTime::from_firestore_value(v))?,
        completed_at: fields
            .get("completed_at")
            .and_then(|v| chrono::DateTime::from_firestore_value(v)),
        tasks,
        num_inference_steps: get_u32("num_inference_steps")?,
        decode_chunk_size: get_u32("decode_chunk_size")?,
        overlap: get_u32("overlap")?,
        noise_aug_strength: get_f64("noise_aug_strength")?,
        min_appearance_guidance: get_f64("min_appearance_guidance")?,
        max_appearance_guidance: get_f64("max_appearance_guidance")?,
        i2i_noise_strength: get_f64("i2i_noise_strength")?,
        seed: get_string("seed").unwrap_or_default(),
        predict_time: get_string("predict_time").unwrap_or_default(),
        updated_at: fields
            .get("updated_at")
            .and_then(|v| chrono::DateTime::from_firestore_value(v))?,
    })
}
