//! Embedding provider capability trait and provider factory.
//!
//! Providers are HTTP clients constructed once at startup from config plus
//! the credential-fallback environment variables. Document embedding
//! ([`EmbeddingProvider::embed`]) is never prefixed; query embedding wraps
//! the query with the provider's instruction prefix when one applies.

pub mod gemini;
pub mod openai;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::EmbeddingsConfig;

/// Default instruction prefix for Qwen-family embedding models. Retrieval
/// quality measurably improves with it for Qwen and degrades for Gemini.
pub const QWEN_INSTRUCTION: &str =
    "Given a query, retrieve the most semantically relevant document";

/// Capability contract for dense-vector providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short provider id (e.g. `"openai"`, `"gemini"`).
    fn id(&self) -> &str;

    /// Model identifier stored alongside each vector.
    fn model(&self) -> &str;

    /// Declared output dimension, if the provider knows it.
    fn dimension(&self) -> Option<usize> {
        None
    }

    /// Instruction prefix applied to queries, if any.
    fn instruction_prefix(&self) -> Option<&str> {
        None
    }

    /// Deterministic document embedding. Never prefixed.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Query embedding: wrapped with the instruction prefix when set,
    /// otherwise identical to [`embed`](Self::embed).
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        match self.instruction_prefix() {
            Some(prefix) => {
                let wrapped = format!("Instruct: {prefix}\nQuery: {query}");
                self.embed(&wrapped).await
            }
            None => self.embed(query).await,
        }
    }
}

/// Resolve the effective instruction prefix for a model.
///
/// An explicit override wins (the literal `"none"` disables); otherwise
/// Qwen-family models default to [`QWEN_INSTRUCTION`] and everything else,
/// Gemini included, to no prefix.
pub fn resolve_instruction(model: &str, override_value: Option<&str>) -> Option<String> {
    match override_value {
        Some("none") => None,
        Some(value) => Some(value.to_string()),
        None => {
            let lower = model.to_lowercase();
            if lower.contains("qwen") {
                Some(QWEN_INSTRUCTION.to_string())
            } else {
                None
            }
        }
    }
}

/// Build the configured provider, or `None` when semantic search is disabled.
pub fn create_provider(config: &EmbeddingsConfig) -> Result<Option<Arc<dyn EmbeddingProvider>>> {
    let env_or = |config_value: &Option<String>, var: &str| -> Option<String> {
        config_value.clone().or_else(|| std::env::var(var).ok())
    };

    let provider: Option<Arc<dyn EmbeddingProvider>> = match config.provider.as_str() {
        "" | "none" => None,
        "openai" => {
            let api_key = env_or(&config.api_key, "OPENAI_API_KEY")
                .ok_or_else(|| anyhow::anyhow!("openai embeddings need OPENAI_API_KEY"))?;
            let base_url = env_or(&config.base_url, "OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".into());
            let model = non_empty(&config.model).unwrap_or("text-embedding-3-small");
            Some(Arc::new(openai::OpenAiCompatibleEmbedding::new(
                "openai",
                base_url,
                api_key,
                model.to_string(),
                resolve_instruction(model, config.instruction.as_deref()),
            )?))
        }
        "qwen" | "dashscope" | "tongyi" => {
            let api_key = env_or(&config.api_key, "DASHSCOPE_API_KEY")
                .ok_or_else(|| anyhow::anyhow!("qwen embeddings need DASHSCOPE_API_KEY"))?;
            let base_url = env_or(&config.base_url, "DASHSCOPE_BASE_URL")
                .unwrap_or_else(|| "https://dashscope.aliyuncs.com/compatible-mode/v1".into());
            let model = non_empty(&config.model).unwrap_or("text-embedding-v4");
            Some(Arc::new(openai::OpenAiCompatibleEmbedding::new(
                "qwen",
                base_url,
                api_key,
                model.to_string(),
                resolve_instruction(model, config.instruction.as_deref()),
            )?))
        }
        "gemini" | "google" => {
            let api_key = env_or(&config.api_key, "GEMINI_API_KEY")
                .ok_or_else(|| anyhow::anyhow!("gemini embeddings need GEMINI_API_KEY"))?;
            let base_url = env_or(&config.base_url, "GEMINI_BASE_URL")
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".into());
            let model = non_empty(&config.model).unwrap_or("gemini-embedding-001");
            Some(Arc::new(gemini::GeminiEmbedding::new(
                base_url,
                api_key,
                model.to_string(),
                resolve_instruction(model, config.instruction.as_deref()),
            )?))
        }
        other => anyhow::bail!(
            "unknown embeddings provider: {other}. Supported: none, openai, gemini, google, qwen, dashscope, tongyi"
        ),
    };

    Ok(provider)
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qwen_models_default_to_instruction() {
        assert_eq!(
            resolve_instruction("text-embedding-qwen3", None).as_deref(),
            Some(QWEN_INSTRUCTION)
        );
        assert_eq!(resolve_instruction("Qwen3-Embedding-8B", None).as_deref(), Some(QWEN_INSTRUCTION));
    }

    #[test]
    fn gemini_models_default_to_no_instruction() {
        assert!(resolve_instruction("gemini-embedding-001", None).is_none());
        assert!(resolve_instruction("text-embedding-3-small", None).is_none());
    }

    #[test]
    fn explicit_override_wins() {
        assert_eq!(
            resolve_instruction("gemini-embedding-001", Some("custom task")).as_deref(),
            Some("custom task")
        );
        assert!(resolve_instruction("qwen3-embedding", Some("none")).is_none());
    }

    #[test]
    fn none_provider_yields_no_client() {
        let config = EmbeddingsConfig::default();
        assert!(create_provider(&config).unwrap().is_none());
    }

    #[test]
    fn unknown_provider_errors() {
        let config = EmbeddingsConfig {
            provider: "frobnicate".into(),
            ..Default::default()
        };
        assert!(create_provider(&config).is_err());
    }
}
