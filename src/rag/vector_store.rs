use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance,
    Filter, PointStruct, Range, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Qdrant, QdrantError};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use sha2::{Digest, Sha256};

use crate::config::QdrantSettings;
use crate::indexer::chunker::TextChunk;

/// Payload stored next to each vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub text: String,
    pub chunk_index: u64,
    pub char_len: usize,
    pub token_count: Option<usize>,
    pub fingerprint: String,
}

impl ChunkPayload {
    pub fn from_chunk(chunk: &TextChunk) -> Self {
        Self {
            text: chunk.text.clone(),
            chunk_index: chunk.id,
            char_len: chunk.char_len,
            token_count: chunk.token_count,
            fingerprint: fingerprint(&chunk.text),
        }
    }

    fn into_json(self) -> JsonMap<String, JsonValue> {
        let mut map = JsonMap::new();
        map.insert("text".to_string(), JsonValue::String(self.text));
        map.insert("chunk_index".to_string(), JsonValue::from(self.chunk_index));
        map.insert("char_len".to_string(), JsonValue::from(self.char_len));
        map.insert(
            "token_count".to_string(),
            self.token_count.map(JsonValue::from).unwrap_or(JsonValue::Null),
        );
        map.insert("fingerprint".to_string(), JsonValue::String(self.fingerprint));
        map
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: u64,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub id: u64,
    pub score: f32,
    pub text: String,
}

/// Qdrant gave up on a call because its deadline passed.
#[derive(Debug, thiserror::Error)]
#[error("vector store call timed out: {0}")]
pub struct VectorStoreTimeout(pub String);

const GRPC_CANCELLED: i32 = 1;
const GRPC_DEADLINE_EXCEEDED: i32 = 4;

/// The gRPC channel reports its own request timeout as `Cancelled`.
fn is_deadline_code(code: i32) -> bool {
    matches!(code, GRPC_CANCELLED | GRPC_DEADLINE_EXCEEDED)
}

fn qdrant_error(err: QdrantError) -> anyhow::Error {
    match &err {
        QdrantError::ResponseError { status } if is_deadline_code(i32::from(status.code())) => {
            VectorStoreTimeout(status.message().to_string()).into()
        }
        _ => err.into(),
    }
}

/// Short content hash, used to spot chunks whose text changed between ingests.
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8])
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Inserts or overwrites records by id.
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()>;

    /// Nearest records by cosine similarity, best first. Empty if the
    /// collection holds nothing.
    async fn query(&self, vector: Vec<f32>, limit: u64) -> Result<Vec<ScoredChunk>>;

    /// Removes every record whose id is `first_id` or higher.
    async fn delete_from(&self, first_id: u64) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}

pub struct QdrantStore {
    client: Qdrant,
    collection_name: String,
    vector_size: u64,
}

impl QdrantStore {
    pub fn new(settings: &QdrantSettings) -> Result<Self> {
        tracing::info!("Building Qdrant client for URL: {}", settings.url);
        let client = Qdrant::from_url(&settings.url)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Qdrant client build failed")?;

        Ok(Self {
            client,
            collection_name: settings.collection.clone(),
            vector_size: settings.vector_size,
        })
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    pub async fn ensure_collection(&self) -> Result<()> {
        let exists = self
            .client
            .collection_exists(&self.collection_name)
            .await
            .map_err(qdrant_error)?;
        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection_name)
                        .vectors_config(VectorParamsBuilder::new(self.vector_size, Distance::Cosine)),
                )
                .await
                .map_err(qdrant_error)?;
            tracing::info!("Created Qdrant collection {}", self.collection_name);
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        self.ensure_collection()
            .await
            .context("vector store collection setup failed")?;

        let count = records.len();
        let points: Vec<PointStruct> = records
            .into_iter()
            .map(|record| PointStruct::new(record.id, record.vector, record.payload.into_json()))
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection_name, points).wait(true))
            .await
            .map_err(qdrant_error)
            .context("vector store upsert failed")?;

        tracing::debug!("Upserted {} points into {}", count, self.collection_name);
        Ok(())
    }

    async fn query(&self, vector: Vec<f32>, limit: u64) -> Result<Vec<ScoredChunk>> {
        let exists = self
            .client
            .collection_exists(&self.collection_name)
            .await
            .map_err(qdrant_error)
            .context("vector store query failed")?;
        if !exists {
            return Ok(Vec::new());
        }

        let search_result = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection_name, vector, limit).with_payload(true),
            )
            .await
            .map_err(qdrant_error)
            .context("vector store query failed")?;

        let mut results = Vec::new();
        for point in search_result.result {
            let id = match point.id.and_then(|id| id.point_id_options) {
                Some(PointIdOptions::Num(num)) => num,
                _ => continue,
            };
            if let Some(text) = point.payload.get("text").and_then(|v| v.as_str()) {
                results.push(ScoredChunk {
                    id,
                    score: point.score,
                    text: text.to_string(),
                });
            }
        }

        Ok(results)
    }

    async fn delete_from(&self, first_id: u64) -> Result<()> {
        // chunk_index mirrors the point id, so a payload range selects the tail.
        let stale = Filter::must([Condition::range(
            "chunk_index",
            Range {
                gte: Some(first_id as f64),
                ..Default::default()
            },
        )]);

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection_name)
                    .points(stale)
                    .wait(true),
            )
            .await
            .map_err(qdrant_error)
            .context("vector store stale cleanup failed")?;

        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.client.health_check().await.map_err(qdrant_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        let a = fingerprint("Tiflis fell on 25 February 1921.");
        assert_eq!(a, fingerprint("Tiflis fell on 25 February 1921."));
        assert_ne!(a, fingerprint("Batumi"));
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_payload_json_fields() {
        let chunk = TextChunk {
            id: 3,
            text: "The constitution was adopted.".into(),
            char_len: 29,
            token_count: None,
        };
        let map = ChunkPayload::from_chunk(&chunk).into_json();
        assert_eq!(map["text"], "The constitution was adopted.");
        assert_eq!(map["chunk_index"], 3);
        assert_eq!(map["char_len"], 29);
        assert!(map["token_count"].is_null());
        assert_eq!(map["fingerprint"].as_str().unwrap().len(), 16);
    }

    #[test]
    fn test_deadline_codes() {
        assert!(is_deadline_code(GRPC_CANCELLED));
        assert!(is_deadline_code(GRPC_DEADLINE_EXCEEDED));
        // UNAVAILABLE and NOT_FOUND are plain upstream failures
        assert!(!is_deadline_code(14));
        assert!(!is_deadline_code(5));
    }

    #[tokio::test]
    async fn test_client_builds_without_network() {
        let settings = QdrantSettings {
            url: "http://localhost:6334".into(),
            collection: "documents".into(),
            vector_size: 1536,
            timeout_secs: 5,
        };
        let store = QdrantStore::new(&settings).unwrap();
        assert_eq!(store.collection_name(), "documents");
    }
}
