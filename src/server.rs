//! MCP server initialization for the stdio transport.
//!
//! Wires the database, tokenizer, and providers into the tool handler and
//! serves it over stdin/stdout.

use anyhow::Result;
use rmcp::ServiceExt;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

use crate::config::HypnosConfig;
use crate::db;
use crate::embedding::{self, EmbeddingProvider};
use crate::rerank::{self, RerankProvider};
use crate::tokenizer::Tokenizer;
use crate::tools::HypnosTools;

/// Shared setup: open the store and build the providers.
#[allow(clippy::type_complexity)]
fn setup_shared_state(
    config: HypnosConfig,
) -> Result<(
    Arc<Mutex<Connection>>,
    Arc<Tokenizer>,
    Option<Arc<dyn EmbeddingProvider>>,
    Option<Arc<dyn RerankProvider>>,
    Arc<HypnosConfig>,
)> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    tracing::info!(db = %db_path.display(), agent = %config.storage.agent_id, "store ready");

    let embedding = embedding::create_provider(&config.embeddings)?;
    match &embedding {
        Some(provider) => {
            tracing::info!(provider = provider.id(), model = provider.model(), "embeddings enabled")
        }
        None => tracing::info!("embeddings disabled, retrieval is BM25 only"),
    }

    let reranker = rerank::create_provider(&config.rerank)?;
    if let Some(provider) = &reranker {
        tracing::info!(provider = provider.id(), "external reranker enabled");
    }

    Ok((
        Arc::new(Mutex::new(conn)),
        Arc::new(Tokenizer::new()),
        embedding,
        reranker,
        Arc::new(config),
    ))
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: HypnosConfig) -> Result<()> {
    tracing::info!("starting hypnos MCP server on stdio");

    let (db, tokenizer, embedding, reranker, config) = setup_shared_state(config)?;

    let tools = HypnosTools::new(db, tokenizer, embedding, reranker, config);
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running — waiting for client");
    server.waiting().await?;

    Ok(())
}
