//! Google Gemini `embedContent` client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::EmbeddingProvider;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct GeminiEmbedding {
    base_url: String,
    api_key: String,
    model: String,
    instruction: Option<String>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct EmbedContentRequest<'a> {
    content: Content<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

impl GeminiEmbedding {
    pub fn new(
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
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            instruction,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    fn id(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn instruction_prefix(&self) -> Option<&str> {
        self.instruction.as_deref()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!(
            "{}/models/{}:embedContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let response = self
            .client
            .post(&url)
            .json(&EmbedContentRequest {
                content: Content {
                    parts: [Part { text }],
                },
            })
            .send()
            .await
            .context("embedding request to Gemini failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini embedding endpoint returned {status}: {body}");
        }

        let parsed: EmbedContentResponse = response
            .json()
            .await
            .context("malformed Gemini embedding response")?;
        Ok(parsed.embedding.values)
    }
}
