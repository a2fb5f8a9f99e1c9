//! The MCP tool surface — nine verbs published to agent runtimes.
//!
//! [`HypnosTools`] holds the shared state (store connection, tokenizer,
//! providers, config) and exposes the tools via the `#[tool_router]` macro.
//! The bound agent scope comes from config at initialization; every tool
//! verifies tenant membership through the engine layer, so cross-agent ids
//! simply come back not-found.
//!
//! Store work runs on the blocking pool; only provider HTTP calls await.

pub mod forget;
pub mod link;
pub mod recall;
pub mod recall_path;
pub mod reflect;
pub mod remember;
pub mod snapshot;

use std::future::Future;

use forget::ForgetParams;
use link::LinkParams;
use recall::RecallParams;
use recall_path::RecallPathParams;
use reflect::ReflectParams;
use remember::RememberParams;
use rmcp::handler::server::tool::{Parameters, ToolRouter};
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use rusqlite::Connection;
use serde::Serialize;
use snapshot::SnapshotParams;
use std::sync::{Arc, Mutex};

use crate::config::HypnosConfig;
use crate::embedding::EmbeddingProvider;
use crate::memory::guard::GuardAction;
use crate::memory::types::{MemoryType, Relation};
use crate::memory::{intent, links, search, sleep, snapshots, stats, store};
use crate::rerank::RerankProvider;
use crate::tokenizer::Tokenizer;

/// The hypnos MCP tool handler.
#[derive(Clone)]
pub struct HypnosTools {
    tool_router: ToolRouter<Self>,
    db: Arc<Mutex<Connection>>,
    tokenizer: Arc<Tokenizer>,
    embedding: Option<Arc<dyn EmbeddingProvider>>,
    reranker: Option<Arc<dyn RerankProvider>>,
    config: Arc<HypnosConfig>,
}

/// One row of a `recall` response.
#[derive(Debug, Serialize)]
struct RecallHit {
    id: String,
    content: String,
    #[serde(rename = "type")]
    memory_type: MemoryType,
    priority: u8,
    vitality: f64,
    emotion_val: f64,
    score: f64,
    match_reason: String,
    updated_at: String,
}

impl RecallHit {
    fn from_search(hit: &search::SearchHit) -> Self {
        Self {
            id: hit.memory.id.clone(),
            content: hit.memory.content.clone(),
            memory_type: hit.memory.memory_type,
            priority: hit.memory.priority,
            vitality: hit.memory.vitality,
            emotion_val: hit.memory.emotion_val,
            score: hit.score,
            match_reason: hit.match_reason.clone(),
            updated_at: hit.memory.updated_at.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct NeighborEntry {
    id: String,
    hop: u32,
    relation: Relation,
    preview: String,
}

#[tool_router]
impl HypnosTools {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        tokenizer: Arc<Tokenizer>,
        embedding: Option<Arc<dyn EmbeddingProvider>>,
        reranker: Option<Arc<dyn RerankProvider>>,
        config: Arc<HypnosConfig>,
    ) -> Self {
        Self {
            tool_router: Self::tool_router(),
            db,
            tokenizer,
            embedding,
            reranker,
            config,
        }
    }

    fn agent(&self) -> String {
        self.config.storage.agent_id.clone()
    }

    /// Run a blocking store operation on tokio's blocking pool.
    async fn db_call<F, T>(&self, f: F) -> Result<T, String>
    where
        F: FnOnce(&mut Connection) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut conn = db
                .lock()
                .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| format!("db task failed: {e}"))?
        .map_err(|e| e.to_string())
    }

    /// Best-effort document embedding for a freshly written memory.
    async fn embed_after_write(&self, memory_id: &str, content: &str) {
        let Some(provider) = &self.embedding else {
            return;
        };
        match provider.embed(content).await {
            Ok(vector) => {
                let agent = self.agent();
                let memory_id = memory_id.to_string();
                let model = provider.model().to_string();
                let result = self
                    .db_call(move |conn| {
                        crate::memory::embeddings::upsert_embedding(
                            conn, &agent, &memory_id, &model, &vector,
                        )
                    })
                    .await;
                if let Err(err) = result {
                    tracing::warn!(%err, "embedding row not stored");
                }
            }
            Err(err) => tracing::warn!(%err, "write-time embedding failed"),
        }
    }

    /// Store a memory through the Write Guard.
    #[tool(description = "Store a memory. The admission pipeline classifies it as add (new), update (URI conflict), merge (high overlap with same-type memory), or skip (duplicate or low quality). Types: identity (never decays), emotion, knowledge, event.")]
    async fn remember(
        &self,
        Parameters(params): Parameters<RememberParams>,
    ) -> Result<String, String> {
        let memory_type: MemoryType = params.r#type.parse().map_err(|e: String| e)?;
        if params.content.trim().is_empty() {
            return Err("content must not be empty".into());
        }
        let emotion_val = params.emotion_val.unwrap_or(0.0);
        if !(-1.0..=1.0).contains(&emotion_val) {
            return Err("emotion_val must be between -1.0 and 1.0".into());
        }

        tracing::info!(
            content_len = params.content.len(),
            memory_type = %memory_type,
            uri = params.uri.as_deref().unwrap_or(""),
            "remember called"
        );

        let agent = self.agent();
        let tokenizer = Arc::clone(&self.tokenizer);
        let item = sleep::SyncInput {
            content: params.content.clone(),
            memory_type,
            uri: params.uri.clone(),
            priority: None,
            emotion_val,
            source: params.source.clone(),
        };

        let outcome = self
            .db_call(move |conn| {
                let mut outcomes = sleep::sync_batch(conn, &tokenizer, &agent, &[item])?;
                Ok(outcomes.remove(0))
            })
            .await?;

        if let (Some(memory_id), true) = (
            outcome.memory_id.as_deref(),
            outcome.action != GuardAction::Skip,
        ) {
            self.embed_after_write(memory_id, &params.content).await;
        }

        serde_json::to_string(&outcome).map_err(|e| format!("serialization failed: {e}"))
    }

    /// Search memories with the full hybrid pipeline.
    #[tool(description = "Search memories. Classifies query intent, runs hybrid BM25 + semantic retrieval with rank fusion, reranks, and strengthens every returned memory.")]
    async fn recall(
        &self,
        Parameters(params): Parameters<RecallParams>,
    ) -> Result<String, String> {
        let classification = intent::classify(&self.tokenizer, &params.query);
        let strategy = intent::strategy(classification.intent);
        let limit = params
            .limit
            .map(|l| l.min(strategy.limit))
            .unwrap_or(strategy.limit);

        tracing::info!(
            query = %params.query,
            intent = classification.intent.as_str(),
            confidence = classification.confidence,
            "recall called"
        );

        // Query embedding is best-effort; losing it degrades to BM25 alone
        let query_vector: Option<(String, Vec<f32>)> = match &self.embedding {
            Some(provider) => match provider.embed_query(&params.query).await {
                Ok(vector) => Some((provider.model().to_string(), vector)),
                Err(err) => {
                    tracing::warn!(%err, "query embedding failed, BM25 only");
                    None
                }
            },
            None => None,
        };

        let agent = self.agent();
        let tokenizer = Arc::clone(&self.tokenizer);
        let query = params.query.clone();
        let retrieval = self.config.retrieval.clone();
        let mut hits = self
            .db_call(move |conn| {
                search::search_hybrid(
                    conn,
                    &tokenizer,
                    &agent,
                    &query,
                    query_vector
                        .as_ref()
                        .map(|(model, vector)| (model.as_str(), vector.as_slice())),
                    limit,
                    retrieval.rrf_k,
                    retrieval.semantic_top_k,
                    retrieval.min_vitality,
                )
            })
            .await?;

        // External cross-encoder pass: replaces scores, never fatal
        if let Some(reranker) = &self.reranker {
            if !hits.is_empty() {
                let documents: Vec<String> =
                    hits.iter().map(|h| h.memory.content.clone()).collect();
                match reranker.rerank(&params.query, &documents).await {
                    Ok(scores) => {
                        for score in scores {
                            if let Some(hit) = hits.get_mut(score.index) {
                                hit.score = score.relevance_score;
                                hit.match_reason.push_str("+rerank");
                            }
                        }
                    }
                    Err(err) => tracing::warn!(%err, "external rerank failed, local only"),
                }
            }
        }

        let hits = intent::rerank_local(hits, &strategy);

        // Recall rewards memory: strengthen everything we return
        let agent = self.agent();
        let ids: Vec<String> = hits.iter().map(|h| h.memory.id.clone()).collect();
        let growth = self.config.sleep.access_growth;
        self.db_call(move |conn| {
            let tx = conn.transaction()?;
            for id in &ids {
                store::record_access(&tx, &agent, id, growth)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await?;

        let response = serde_json::json!({
            "intent": classification.intent,
            "confidence": classification.confidence,
            "total": hits.len(),
            "results": hits.iter().map(RecallHit::from_search).collect::<Vec<_>>(),
        });
        serde_json::to_string(&response).map_err(|e| format!("serialization failed: {e}"))
    }

    /// Fetch memories by URI, exact or prefix.
    #[tool(description = "Fetch memories by URI. An exact match returns the memory (optionally with linked neighbors); a prefix returns every (uri, memory) under it.")]
    async fn recall_path(
        &self,
        Parameters(params): Parameters<RecallPathParams>,
    ) -> Result<String, String> {
        let agent = self.agent();
        let uri = params.uri.clone();
        let hops = params.traverse_hops.unwrap_or(0);

        let (matches, neighbors) = self
            .db_call(move |conn| {
                let matches = sleep::resolve_path(conn, &agent, &uri)?;
                let neighbors = match (&matches[..], hops) {
                    ([(matched_uri, memory)], hops)
                        if hops > 0 && *matched_uri == uri =>
                    {
                        let nodes = links::traverse(conn, &agent, &memory.id, hops)?;
                        let mut entries = Vec::with_capacity(nodes.len());
                        for node in nodes {
                            let preview = store::get_memory(conn, &agent, &node.id)?
                                .map(|m| truncate_preview(&m.content, 100))
                                .unwrap_or_default();
                            entries.push(NeighborEntry {
                                id: node.id,
                                hop: node.hop,
                                relation: node.relation,
                                preview,
                            });
                        }
                        Some(entries)
                    }
                    _ => None,
                };
                Ok((matches, neighbors))
            })
            .await?;

        let response = serde_json::json!({
            "matches": matches
                .iter()
                .map(|(uri, memory)| serde_json::json!({"uri": uri, "memory": memory}))
                .collect::<Vec<_>>(),
            "neighbors": neighbors,
        });
        serde_json::to_string(&response).map_err(|e| format!("serialization failed: {e}"))
    }

    /// Load the agent's identity memories.
    #[tool(description = "Load boot memories: every identity (priority 0) memory plus the memories behind the boot URI list. Each is gently strengthened.")]
    async fn boot(&self) -> Result<String, String> {
        let agent = self.agent();
        let growth = self.config.sleep.boot_growth;
        let report = self
            .db_call(move |conn| sleep::boot(conn, &agent, growth))
            .await?;
        serde_json::to_string(&report).map_err(|e| format!("serialization failed: {e}"))
    }

    /// Forget a memory, softly or permanently.
    #[tool(description = "Forget a memory. Soft (default) drops vitality to 10%; hard deletes permanently, leaving a tombstone snapshot.")]
    async fn forget(
        &self,
        Parameters(params): Parameters<ForgetParams>,
    ) -> Result<String, String> {
        let agent = self.agent();
        let id = params.id.clone();
        let hard = params.hard.unwrap_or(false);
        let tokenizer = Arc::clone(&self.tokenizer);

        let result = self
            .db_call(move |conn| {
                let tx = conn.transaction()?;
                let memory = store::get_memory(&tx, &agent, &id)?
                    .ok_or_else(|| anyhow::anyhow!("memory not found: {id}"))?;

                let new_vitality = if hard {
                    store::delete_memory(&tx, &agent, &id)?;
                    snapshots::record_snapshot(
                        &tx,
                        &id,
                        &memory.content,
                        Some("forget"),
                        crate::memory::types::SnapshotAction::Delete,
                    )?;
                    None
                } else {
                    let faded = memory.vitality * 0.1;
                    store::update_memory(
                        &tx,
                        &tokenizer,
                        &agent,
                        &id,
                        &store::MemoryUpdate {
                            vitality: Some(faded),
                            ..Default::default()
                        },
                    )?;
                    Some(faded)
                };
                tx.commit()?;
                Ok(serde_json::json!({
                    "id": id,
                    "hard": hard,
                    "vitality": new_vitality,
                }))
            })
            .await?;

        serde_json::to_string(&result).map_err(|e| format!("serialization failed: {e}"))
    }

    /// Create, query, or traverse typed links between memories.
    #[tool(description = "Work with memory links. action='create' needs source_id/target_id/relation; 'query' lists edges around source_id; 'traverse' walks the graph from source_id up to max_hops.")]
    async fn link(&self, Parameters(params): Parameters<LinkParams>) -> Result<String, String> {
        let agent = self.agent();

        match params.action.as_str() {
            "create" => {
                let source_id = params.source_id.ok_or("create needs source_id")?;
                let target_id = params.target_id.ok_or("create needs target_id")?;
                let relation: Relation = params
                    .relation
                    .ok_or("create needs relation")?
                    .parse()
                    .map_err(|e: String| e)?;
                let weight = params.weight.unwrap_or(1.0);

                let result = self
                    .db_call(move |conn| {
                        links::create_link(conn, &agent, &source_id, &target_id, relation, weight)
                    })
                    .await?;
                serde_json::to_string(&result).map_err(|e| format!("serialization failed: {e}"))
            }
            "query" => {
                let memory_id = params.source_id.ok_or("query needs source_id")?;
                let rows = self
                    .db_call(move |conn| {
                        let edges = links::list_links(conn, &agent, &memory_id)?;
                        let mut annotated = Vec::with_capacity(edges.len());
                        for edge in edges {
                            let far_end = if edge.source_id == memory_id {
                                &edge.target_id
                            } else {
                                &edge.source_id
                            };
                            let preview = store::get_memory(conn, &agent, far_end)?
                                .map(|m| truncate_preview(&m.content, 100))
                                .unwrap_or_default();
                            annotated.push(serde_json::json!({
                                "link": edge,
                                "preview": preview,
                            }));
                        }
                        Ok(annotated)
                    })
                    .await?;
                serde_json::to_string(&rows).map_err(|e| format!("serialization failed: {e}"))
            }
            "traverse" => {
                let memory_id = params.source_id.ok_or("traverse needs source_id")?;
                let max_hops = params.max_hops.unwrap_or(2);
                let nodes = self
                    .db_call(move |conn| links::traverse(conn, &agent, &memory_id, max_hops))
                    .await?;
                serde_json::to_string(&nodes).map_err(|e| format!("serialization failed: {e}"))
            }
            other => Err(format!("unknown link action: {other} (create, query, traverse)")),
        }
    }

    /// List a memory's history or roll it back.
    #[tool(description = "Snapshot history. action='list' needs memory_id; action='rollback' needs snapshot_id and restores that content, snapshotting the current state first.")]
    async fn snapshot(
        &self,
        Parameters(params): Parameters<SnapshotParams>,
    ) -> Result<String, String> {
        let agent = self.agent();

        match params.action.as_str() {
            "list" => {
                let memory_id = params.memory_id.ok_or("list needs memory_id")?;
                let rows = self
                    .db_call(move |conn| snapshots::list_snapshots(conn, &agent, &memory_id))
                    .await?;
                serde_json::to_string(&rows).map_err(|e| format!("serialization failed: {e}"))
            }
            "rollback" => {
                let snapshot_id = params.snapshot_id.ok_or("rollback needs snapshot_id")?;
                let tokenizer = Arc::clone(&self.tokenizer);
                let memory_id = self
                    .db_call(move |conn| {
                        let tx = conn.transaction()?;
                        let id = snapshots::rollback_snapshot(&tx, &tokenizer, &agent, &snapshot_id)?;
                        tx.commit()?;
                        Ok(id)
                    })
                    .await?;
                serde_json::to_string(&serde_json::json!({
                    "restored": true,
                    "memory_id": memory_id,
                }))
                .map_err(|e| format!("serialization failed: {e}"))
            }
            other => Err(format!("unknown snapshot action: {other} (list, rollback)")),
        }
    }

    /// Run sleep-cycle maintenance phases.
    #[tool(description = "Run maintenance: 'decay' applies the forgetting curve, 'tidy' archives faded events and prunes history, 'govern' sweeps dangling references, 'all' chains the three in order.")]
    async fn reflect(
        &self,
        Parameters(params): Parameters<ReflectParams>,
    ) -> Result<String, String> {
        let agent = self.agent();
        let sleep_config = self.config.sleep.clone();
        let phase = params.phase.clone();

        let report = self
            .db_call(move |conn| {
                let mut report = serde_json::Map::new();
                let run_decay = |conn: &mut Connection| sleep::decay(conn, Some(&agent));
                let run_tidy = |conn: &mut Connection| {
                    sleep::tidy(
                        conn,
                        Some(&agent),
                        sleep_config.tidy_threshold,
                        sleep_config.max_snapshots_per_memory,
                    )
                };
                let run_govern = |conn: &mut Connection| sleep::govern(conn, Some(&agent));

                match phase.as_str() {
                    "decay" => {
                        report.insert("decay".into(), serde_json::to_value(run_decay(conn)?)?);
                    }
                    "tidy" => {
                        report.insert("tidy".into(), serde_json::to_value(run_tidy(conn)?)?);
                    }
                    "govern" => {
                        report.insert("govern".into(), serde_json::to_value(run_govern(conn)?)?);
                    }
                    "all" => {
                        report.insert("decay".into(), serde_json::to_value(run_decay(conn)?)?);
                        report.insert("tidy".into(), serde_json::to_value(run_tidy(conn)?)?);
                        report.insert("govern".into(), serde_json::to_value(run_govern(conn)?)?);
                    }
                    other => anyhow::bail!("unknown phase: {other} (decay, tidy, govern, all)"),
                }
                Ok(serde_json::Value::Object(report))
            })
            .await?;

        serde_json::to_string(&report).map_err(|e| format!("serialization failed: {e}"))
    }

    /// Store statistics for the bound agent.
    #[tool(description = "Memory store statistics: counts by type and priority, path/link/snapshot totals, low-vitality count, and embedding coverage.")]
    async fn status(&self) -> Result<String, String> {
        let agent = self.agent();
        let db_path = self.config.resolved_db_path();
        let model = self.embedding.as_ref().map(|p| p.model().to_string());

        let response = self
            .db_call(move |conn| {
                stats::status(conn, &agent, Some(db_path.as_path()), model.as_deref())
            })
            .await?;
        serde_json::to_string(&response).map_err(|e| format!("serialization failed: {e}"))
    }
}

#[tool_handler]
impl ServerHandler for HypnosTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "hypnos is a persistent memory engine. Use remember to store, recall to \
                 search, recall_path for URI-addressed memories, boot at session start, \
                 and reflect to run sleep-cycle maintenance."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}

/// Truncate content to `max_chars` characters, appending "..." if truncated.
fn truncate_preview(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        content.to_string()
    } else {
        let cut: String = content.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
