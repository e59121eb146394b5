use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

use crate::config::OpenAiSettings;
use crate::models::{EmbeddingRequest, EmbeddingResponse};

/// Turns text into embedding vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .context("embedding response contained no vectors")
    }
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbeddings {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiEmbeddings {
    pub fn new(settings: &OpenAiSettings) -> Result<Self> {
        anyhow::ensure!(!settings.api_key.trim().is_empty(), "OPENAI_API_KEY is not set");

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("failed to build embeddings HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", settings.base_url.trim_end_matches('/')),
            api_key: settings.api_key.trim().to_string(),
            model: settings.embedding_model.clone(),
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbeddings {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("embedding request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            anyhow::bail!("embedding request failed: {} - {}", status, error_text);
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .context("failed to parse embedding response")?;
        parsed.data.sort_by_key(|entry| entry.index);
        anyhow::ensure!(
            parsed.data.len() == texts.len(),
            "embedding API returned {} vectors for {} inputs",
            parsed.data.len(),
            texts.len()
        );

        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(api_key: &str) -> OpenAiSettings {
        OpenAiSettings {
            api_key: api_key.to_string(),
            base_url: "https://api.openai.com/v1/".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            chat_model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_requires_api_key() {
        let err = OpenAiEmbeddings::new(&settings("  ")).err().unwrap();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = OpenAiEmbeddings::new(&settings("sk-test")).unwrap();
        assert_eq!(client.endpoint, "https://api.openai.com/v1/embeddings");
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_request() {
        let client = OpenAiEmbeddings::new(&settings("sk-test")).unwrap();
        let vectors = client.embed_batch(&[]).await.unwrap();
        assert!(vectors.is_empty());
    }
}
