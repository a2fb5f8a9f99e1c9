//! HTTP rerank client for Jina/Cohere/OpenAI-compatible endpoints.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{RerankProvider, RerankScore};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpRerank {
    id: &'static str,
    url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankScore>,
}

impl HttpRerank {
    pub fn new(id: &'static str, url: String, api_key: String, model: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            id,
            url,
            api_key,
            model,
            client,
        })
    }
}

#[async_trait]
impl RerankProvider for HttpRerank {
    fn id(&self) -> &str {
        self.id
    }

    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<RerankScore>> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&RerankRequest {
                model: &self.model,
                query,
                documents,
            })
            .send()
            .await
            .with_context(|| format!("rerank request to {} failed", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("rerank endpoint returned {status}: {body}");
        }

        let parsed: RerankResponse = response.json().await.context("malformed rerank response")?;
        Ok(parsed.results)
    }
}
