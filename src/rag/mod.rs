pub mod embeddings;
pub mod vector_store;

use std::sync::Arc;

use anyhow::{Context, Result};

use self::embeddings::{Embedder, OpenAiEmbeddings};
use self::vector_store::{ChunkPayload, QdrantStore, ScoredChunk, VectorRecord, VectorStore};
use crate::completion::{ChatCompletionClient, Completer, Prompt};
use crate::config::{RagSettings, Settings};
use crate::indexer::chunker::TextChunk;
use crate::models::GeneratedAnswer;

pub const SYSTEM_PROMPT: &str = r#"You are a helpful assistant that answers questions about the Democratic Republic of Georgia (1918-1921).
Use the provided context to answer the question. If you don't know the answer, say 'I don't know'.

Your response should be in JSON format with two fields:
- answer: The answer to the question
- confidence: A confidence score between 0 and 1

Example format:
{
    "answer": "The answer to the question",
    "confidence": 0.95
}"#;

/// Returned without calling the model when retrieval finds nothing.
pub const NO_CONTEXT_ANSWER: &str = "I don't have enough information to answer this question.";

#[derive(Debug, Clone, PartialEq)]
pub struct RagAnswer {
    pub answer: String,
    pub confidence: Option<f32>,
    pub sources: Vec<ScoredChunk>,
}

pub struct RagEngine {
    embedder: Arc<dyn Embedder>,
    vector_store: Arc<dyn VectorStore>,
    completer: Arc<dyn Completer>,
    settings: RagSettings,
}

impl RagEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vector_store: Arc<dyn VectorStore>,
        completer: Arc<dyn Completer>,
        settings: RagSettings,
    ) -> Self {
        Self {
            embedder,
            vector_store,
            completer,
            settings,
        }
    }

    /// Builds the OpenAI and Qdrant clients. An unreachable Qdrant is
    /// logged, not fatal; the collection is created again on first ingest.
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let embedder = OpenAiEmbeddings::new(&settings.openai)?;
        let completer = ChatCompletionClient::new(&settings.openai)?;
        let vector_store = QdrantStore::new(&settings.qdrant)?;

        match vector_store.ensure_collection().await {
            Ok(()) => tracing::info!("Qdrant collection {} ready", vector_store.collection_name()),
            Err(e) => tracing::warn!("Qdrant collection check failed (continuing): {:#}", e),
        }

        Ok(Self::new(
            Arc::new(embedder),
            Arc::new(vector_store),
            Arc::new(completer),
            settings.rag.clone(),
        ))
    }

    pub fn settings(&self) -> &RagSettings {
        &self.settings
    }

    /// Embeds every chunk, writes all records in one upsert, then drops any
    /// record left over from a longer earlier ingest. An embedding failure
    /// leaves the store untouched.
    pub async fn ingest(&self, chunks: &[TextChunk]) -> Result<usize> {
        if chunks.is_empty() {
            tracing::warn!("No chunks provided for ingestion");
            return Ok(0);
        }

        let mut records = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.settings.embed_batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self
                .embedder
                .embed_batch(&texts)
                .await
                .context("embedding generation failed")?;
            anyhow::ensure!(
                vectors.len() == batch.len(),
                "embedding API returned {} vectors for {} chunks",
                vectors.len(),
                batch.len()
            );

            for (chunk, vector) in batch.iter().zip(vectors) {
                records.push(VectorRecord {
                    id: chunk.id,
                    vector,
                    payload: ChunkPayload::from_chunk(chunk),
                });
            }
        }

        let count = records.len();
        let next_id = records.iter().map(|r| r.id + 1).max().unwrap_or(0);
        self.vector_store
            .upsert(records)
            .await
            .context("storing embeddings failed")?;
        self.vector_store
            .delete_from(next_id)
            .await
            .context("removing stale chunks failed")?;

        tracing::info!("Stored {} chunks in the vector store", count);
        Ok(count)
    }

    pub async fn ping_vector_store(&self) -> Result<()> {
        self.vector_store.ping().await
    }

    pub async fn retrieve(&self, question: &str) -> Result<Vec<ScoredChunk>> {
        let query_embedding = self
            .embedder
            .embed(question)
            .await
            .context("question embedding failed")?;

        self.vector_store
            .query(query_embedding, self.settings.top_k)
            .await
            .context("similarity search failed")
    }

    pub async fn answer(&self, question: &str) -> Result<RagAnswer> {
        let sources = self.retrieve(question).await?;
        tracing::info!("Found {} similar chunks", sources.len());
        for source in &sources {
            tracing::debug!(id = source.id, score = source.score, "retrieved chunk");
        }

        if sources.is_empty() {
            tracing::warn!("No context available, returning fallback answer");
            return Ok(RagAnswer {
                answer: NO_CONTEXT_ANSWER.to_string(),
                confidence: Some(0.0),
                sources,
            });
        }

        let prompt = build_prompt(question, &sources);
        let completion = self
            .completer
            .complete(&prompt)
            .await
            .context("answer generation failed")?;
        let generated = parse_answer(&completion);

        Ok(RagAnswer {
            answer: generated.answer,
            confidence: generated.confidence,
            sources,
        })
    }
}

pub fn build_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_prompt(question: &str, chunks: &[ScoredChunk]) -> Prompt {
    Prompt {
        system: SYSTEM_PROMPT.to_string(),
        user: format!("Context: {}\n\nQuestion: {}", build_context(chunks), question),
    }
}

/// Reads the `{answer, confidence}` object the model is asked for; any other
/// text is taken verbatim as the answer.
pub fn parse_answer(completion: &str) -> GeneratedAnswer {
    match serde_json::from_str::<GeneratedAnswer>(completion.trim()) {
        Ok(mut parsed) => {
            parsed.confidence = parsed.confidence.map(|c| c.clamp(0.0, 1.0));
            parsed
        }
        Err(e) => {
            tracing::warn!("Completion was not the expected JSON object ({}), using raw text", e);
            GeneratedAnswer {
                answer: completion.trim().to_string(),
                confidence: None,
            }
        }
    }
}
