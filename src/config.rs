use std::time::Duration;

use anyhow::{Context, Result};
use ::config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

/// Runtime configuration, assembled from defaults, an optional
/// `config/georgia-qa.toml`, `APP__SECTION__KEY` variables and the
/// conventional `OPENAI_API_KEY` / `QDRANT_URL` / `QDRANT_COLLECTION_NAME` / `PORT`.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub openai: OpenAiSettings,
    pub qdrant: QdrantSettings,
    pub rag: RagSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub base_url: String,
    pub embedding_model: String,
    pub chat_model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QdrantSettings {
    pub url: String,
    pub collection: String,
    pub vector_size: u64,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RagSettings {
    pub top_k: u64,
    pub max_chunk_chars: usize,
    pub chunk_overlap: usize,
    pub embed_batch_size: usize,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let builder = Self::defaults()?
            .add_source(File::with_name("config/georgia-qa").required(false))
            .add_source(Environment::with_prefix("APP").prefix_separator("__").separator("__"))
            .set_override_option("openai.api_key", std::env::var("OPENAI_API_KEY").ok())?
            .set_override_option("qdrant.url", std::env::var("QDRANT_URL").ok())?
            .set_override_option("qdrant.collection", std::env::var("QDRANT_COLLECTION_NAME").ok())?
            .set_override_option("server.port", std::env::var("PORT").ok())?;

        Self::from_builder(builder)
    }

    pub fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("server.request_timeout_secs", 60)?
            .set_default("openai.api_key", "")?
            .set_default("openai.base_url", "https://api.openai.com/v1")?
            .set_default("openai.embedding_model", "text-embedding-ada-002")?
            .set_default("openai.chat_model", "gpt-3.5-turbo")?
            .set_default("openai.temperature", 0.7)?
            .set_default("openai.timeout_secs", 30)?
            .set_default("qdrant.url", "http://localhost:6334")?
            .set_default("qdrant.collection", "documents")?
            .set_default("qdrant.vector_size", 1536)?
            .set_default("qdrant.timeout_secs", 10)?
            .set_default("rag.top_k", 5)?
            .set_default("rag.max_chunk_chars", 1000)?
            .set_default("rag.chunk_overlap", 200)?
            .set_default("rag.embed_batch_size", 32)?;
        Ok(builder)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let settings: Settings = builder
            .build()
            .context("failed to assemble configuration")?
            .try_deserialize()
            .context("invalid configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.rag.top_k > 0, "rag.top_k must be at least 1");
        anyhow::ensure!(self.rag.embed_batch_size > 0, "rag.embed_batch_size must be at least 1");
        anyhow::ensure!(self.qdrant.vector_size > 0, "qdrant.vector_size must be at least 1");
        anyhow::ensure!(
            !self.qdrant.collection.trim().is_empty(),
            "qdrant.collection must not be empty"
        );
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}
