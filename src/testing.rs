//! In-memory stand-ins for the external services.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::completion::{Completer, Prompt};
use crate::config::RagSettings;
use crate::indexer::chunker::TextChunk;
use crate::rag::embeddings::Embedder;
use crate::rag::vector_store::{ScoredChunk, VectorRecord, VectorStore};

const DIM: usize = 256;

pub fn rag_settings() -> RagSettings {
    RagSettings {
        top_k: 5,
        max_chunk_chars: 1000,
        chunk_overlap: 200,
        embed_batch_size: 32,
    }
}

pub fn chunks_from(texts: &[&str]) -> Vec<TextChunk> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| TextChunk {
            id: i as u64,
            text: text.to_string(),
            char_len: text.chars().count(),
            token_count: None,
        })
        .collect()
}

/// Bag-of-words vectors: each lowercase word bumps one hashed dimension.
#[derive(Default)]
pub struct HashEmbedder {
    batch_calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    fn vectorize(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; DIM];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(2166136261u32, |h, b| (h ^ b as u32).wrapping_mul(16777619));
            vector[hash as usize % DIM] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vectorize(t)).collect())
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        anyhow::bail!("embedding request failed: 401 Unauthorized - invalid api key")
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<u64, VectorRecord>>,
    upsert_calls: AtomicUsize,
    query_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn ids(&self) -> Vec<u64> {
        self.records.lock().unwrap().keys().copied().collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .values()
            .map(|record| record.payload.text.clone())
            .collect()
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        let mut stored = self.records.lock().unwrap();
        for record in records {
            stored.insert(record.id, record);
        }
        Ok(())
    }

    async fn query(&self, vector: Vec<f32>, limit: u64) -> Result<Vec<ScoredChunk>> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        let stored = self.records.lock().unwrap();
        let mut hits: Vec<ScoredChunk> = stored
            .values()
            .map(|record| ScoredChunk {
                id: record.id,
                score: cosine(&vector, &record.vector),
                text: record.payload.text.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
        hits.truncate(limit as usize);
        Ok(hits)
    }

    async fn delete_from(&self, first_id: u64) -> Result<()> {
        self.records.lock().unwrap().retain(|id, _| *id < first_id);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Returns the same hits for every query.
pub struct FixedStore {
    hits: Vec<ScoredChunk>,
}

impl FixedStore {
    pub fn new(hits: Vec<ScoredChunk>) -> Self {
        Self { hits }
    }
}

#[async_trait]
impl VectorStore for FixedStore {
    async fn upsert(&self, _records: Vec<VectorRecord>) -> Result<()> {
        Ok(())
    }

    async fn query(&self, _vector: Vec<f32>, limit: u64) -> Result<Vec<ScoredChunk>> {
        Ok(self.hits.iter().take(limit as usize).cloned().collect())
    }

    async fn delete_from(&self, _first_id: u64) -> Result<()> {
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        anyhow::bail!("fixed store has no backend")
    }
}

/// Answers with the user prompt it was given.
#[derive(Default)]
pub struct EchoCompleter {
    prompts: Mutex<Vec<Prompt>>,
}

impl EchoCompleter {
    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Completer for EchoCompleter {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.clone());
        Ok(prompt.user.clone())
    }
}

/// Takes longer than any test request timeout before answering.
pub struct SlowCompleter(pub Duration);

#[async_trait]
impl Completer for SlowCompleter {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        tokio::time::sleep(self.0).await;
        Ok(prompt.user.clone())
    }
}
