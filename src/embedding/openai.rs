//! OpenAI-compatible `/embeddings` client.
//!
//! Covers OpenAI itself plus the DashScope compatible-mode endpoint that
//! serves the Qwen embedding family.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::EmbeddingProvider;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct OpenAiCompatibleEmbedding {
    id: &'static str,
    base_url: String,
    api_key: String,
    model: String,
    instruction: Option<String>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

impl OpenAiCompatibleEmbedding {
    pub fn new(
        id: &'static str,
        base_url: String,
        api_key: String,
        model: String,
        instruction: Option<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            id,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            instruction,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiCompatibleEmbedding {
    fn id(&self) -> &str {
        self.id
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn instruction_prefix(&self) -> Option<&str> {
        self.instruction.as_deref()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: [text],
            })
            .send()
            .await
            .with_context(|| format!("embedding request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("embedding endpoint returned {status}: {body}");
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .context("malformed embedding response")?;
        let row = parsed
            .data
            .into_iter()
            .next()
            .context("embedding response contained no vectors")?;
        Ok(row.embedding)
    }
}
