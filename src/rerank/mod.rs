//! External cross-encoder reranking — capability trait and factory.
//!
//! Reranking is strictly best-effort: any provider failure is logged and the
//! retrieval pipeline continues with its local weighting. Jina, Cohere, and
//! OpenAI-compatible endpoints all speak the same request/response shape.

pub mod http;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::config::RerankConfig;

/// One scored document, by index into the submitted list.
#[derive(Debug, Clone, Deserialize)]
pub struct RerankScore {
    pub index: usize,
    pub relevance_score: f64,
}

/// Capability contract for external rerankers.
#[async_trait]
pub trait RerankProvider: Send + Sync {
    fn id(&self) -> &str;

    /// Score `documents` against `query`. Order and completeness of the
    /// returned list are provider-defined; indexes refer to the input order.
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<RerankScore>>;
}

/// Build the configured reranker, or `None` when reranking is disabled.
pub fn create_provider(config: &RerankConfig) -> Result<Option<Arc<dyn RerankProvider>>> {
    let api_key = || {
        config
            .api_key
            .clone()
            .or_else(|| std::env::var("AGENT_MEMORY_RERANK_API_KEY").ok())
    };

    let provider: Option<Arc<dyn RerankProvider>> = match config.provider.as_str() {
        "" | "none" => None,
        "jina" => Some(Arc::new(http::HttpRerank::new(
            "jina",
            config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.jina.ai/v1/rerank".into()),
            api_key().ok_or_else(|| anyhow::anyhow!("jina rerank needs an API key"))?,
            pick_model(&config.model, "jina-reranker-v2-base-multilingual"),
        )?)),
        "cohere" => Some(Arc::new(http::HttpRerank::new(
            "cohere",
            config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.cohere.com/v2/rerank".into()),
            api_key().ok_or_else(|| anyhow::anyhow!("cohere rerank needs an API key"))?,
            pick_model(&config.model, "rerank-v3.5"),
        )?)),
        "openai" => {
            let base_url = config
                .base_url
                .clone()
                .or_else(|| std::env::var("OPENAI_BASE_URL").ok())
                .ok_or_else(|| {
                    anyhow::anyhow!("openai-compatible rerank needs AGENT_MEMORY_RERANK_BASE_URL")
                })?;
            let key = api_key()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .ok_or_else(|| anyhow::anyhow!("openai-compatible rerank needs an API key"))?;
            Some(Arc::new(http::HttpRerank::new(
                "openai",
                base_url,
                key,
                pick_model(&config.model, "rerank"),
            )?))
        }
        other => anyhow::bail!(
            "unknown rerank provider: {other}. Supported: none, openai, jina, cohere"
        ),
    };

    Ok(provider)
}

fn pick_model(configured: &str, default: &str) -> String {
    if configured.is_empty() {
        default.to_string()
    } else {
        configured.to_string()
    }
}
