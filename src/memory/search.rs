//! Retrieval pipeline — BM25, dense cosine, and Reciprocal Rank Fusion.
//!
//! Lexical search runs against the tokenized FTS mirror; malformed queries
//! fall back to a LIKE scan and never surface an error. Semantic search is a
//! brute-force cosine pass over the stored vectors for `(agent_id, model)` —
//! fine for the collection sizes a single agent accumulates. The two lists
//! meet in [`rrf_fuse`].

use anyhow::Result;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::HashMap;

use crate::memory::types::{Memory, MEMORY_COLUMNS};
use crate::memory::{cosine_similarity, embeddings};
use crate::tokenizer::Tokenizer;

/// A single search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub memory: Memory,
    pub score: f64,
    /// Which signals produced this hit: `"bm25"`, `"like"`, `"semantic"`,
    /// `"bm25+semantic"`, with `"+rerank"` appended by the reranker.
    pub match_reason: String,
}

/// BM25 lexical search over the FTS mirror.
///
/// Tokens are OR-joined so partial matches still rank. FTS syntax errors are
/// swallowed by falling back to [`like_scan`].
pub fn search_bm25(
    conn: &Connection,
    tokenizer: &Tokenizer,
    agent_id: &str,
    query: &str,
    limit: usize,
    min_vitality: f64,
) -> Result<Vec<SearchHit>> {
    let tokens = tokenizer.tokenize(query);
    if tokens.is_empty() {
        return like_scan(conn, agent_id, query, limit, min_vitality);
    }

    let fts_query = tokens
        .iter()
        .map(|t| format!("\"{}\"", t.replace('"', "")))
        .collect::<Vec<_>>()
        .join(" OR ");

    let sql = format!(
        "SELECT {cols}, memories_fts.rank \
         FROM memories_fts JOIN memories m ON m.id = memories_fts.id \
         WHERE memories_fts MATCH ?1 AND m.agent_id = ?2 AND m.vitality >= ?3 \
         ORDER BY memories_fts.rank LIMIT ?4",
        cols = MEMORY_COLUMNS
            .split(", ")
            .map(|c| format!("m.{c}"))
            .collect::<Vec<_>>()
            .join(", "),
    );

    let result: rusqlite::Result<Vec<SearchHit>> = (|| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![fts_query, agent_id, min_vitality, limit as i64],
                |row| {
                    let memory = Memory::from_row(row)?;
                    let rank: f64 = row.get(14)?;
                    Ok(SearchHit {
                        memory,
                        score: rank.abs(),
                        match_reason: "bm25".into(),
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })();

    match result {
        Ok(hits) => Ok(hits),
        Err(err) => {
            tracing::warn!(%err, "FTS query failed, falling back to LIKE scan");
            like_scan(conn, agent_id, query, limit, min_vitality)
        }
    }
}

/// Substring fallback with synthetic `1/(i+1)` scores.
fn like_scan(
    conn: &Connection,
    agent_id: &str,
    query: &str,
    limit: usize,
    min_vitality: f64,
) -> Result<Vec<SearchHit>> {
    let sql = format!(
        "SELECT {MEMORY_COLUMNS} FROM memories \
         WHERE agent_id = ?1 AND vitality >= ?2 AND content LIKE '%' || ?3 || '%' \
         ORDER BY priority ASC, updated_at DESC LIMIT ?4"
    );
    let mut stmt = conn.prepare(&sql)?;
    let memories = stmt
        .query_map(
            params![agent_id, min_vitality, query.trim(), limit as i64],
            Memory::from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(memories
        .into_iter()
        .enumerate()
        .map(|(i, memory)| SearchHit {
            memory,
            score: 1.0 / (i as f64 + 1.0),
            match_reason: "like".into(),
        })
        .collect())
}

/// Top-K memories by cosine similarity against the stored vectors.
pub fn semantic_candidates(
    conn: &Connection,
    agent_id: &str,
    model: &str,
    query_vector: &[f32],
    top_k: usize,
) -> Result<Vec<(String, f64)>> {
    let mut scored: Vec<(String, f64)> = embeddings::list_embeddings(conn, agent_id, model)?
        .into_iter()
        .map(|(id, vector)| {
            let sim = cosine_similarity(query_vector, &vector);
            (id, sim)
        })
        .filter(|(_, sim)| *sim > 0.0)
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);
    Ok(scored)
}

/// Reciprocal Rank Fusion over labeled ranked lists.
///
/// Each id accumulates `1/(k + rank)` per list it appears in (1-based ranks);
/// the labels of contributing lists are joined with `+` for `match_reason`.
pub fn rrf_fuse(lists: &[(&str, Vec<String>)], k: usize) -> Vec<(String, f64, String)> {
    let mut scores: HashMap<String, (f64, Vec<&str>)> = HashMap::new();

    for (label, ids) in lists {
        for (rank, id) in ids.iter().enumerate() {
            let entry = scores.entry(id.clone()).or_insert((0.0, Vec::new()));
            entry.0 += 1.0 / (k as f64 + rank as f64 + 1.0);
            if !entry.1.contains(label) {
                entry.1.push(*label);
            }
        }
    }

    let mut fused: Vec<(String, f64, String)> = scores
        .into_iter()
        .map(|(id, (score, labels))| (id, score, labels.join("+")))
        .collect();
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

/// Hybrid retrieval: BM25 (3× candidates) fused with dense cosine.
///
/// `query_vector` is the already-computed query embedding and its model name;
/// pass `None` when no embedding provider is configured (or its call failed)
/// and the result is the BM25 list truncated to `limit`.
pub fn search_hybrid(
    conn: &Connection,
    tokenizer: &Tokenizer,
    agent_id: &str,
    query: &str,
    query_vector: Option<(&str, &[f32])>,
    limit: usize,
    rrf_k: usize,
    semantic_top_k: usize,
    min_vitality: f64,
) -> Result<Vec<SearchHit>> {
    let bm25 = search_bm25(conn, tokenizer, agent_id, query, limit * 3, min_vitality)?;

    let Some((model, vector)) = query_vector else {
        let mut hits = bm25;
        hits.truncate(limit);
        return Ok(hits);
    };

    let semantic = semantic_candidates(conn, agent_id, model, vector, semantic_top_k)?;

    let bm25_ids: Vec<String> = bm25.iter().map(|h| h.memory.id.clone()).collect();
    let semantic_ids: Vec<String> = semantic.iter().map(|(id, _)| id.clone()).collect();
    let fused = rrf_fuse(&[("bm25", bm25_ids), ("semantic", semantic_ids)], rrf_k);

    // Hydrate survivors, preserving fused order
    let ids: Vec<&str> = fused.iter().map(|(id, _, _)| id.as_str()).collect();
    let memories = fetch_memories(conn, agent_id, &ids)?;

    let mut hits: Vec<SearchHit> = Vec::new();
    for (id, score, reason) in &fused {
        if let Some(memory) = memories.get(id.as_str()) {
            if memory.vitality < min_vitality {
                continue;
            }
            hits.push(SearchHit {
                memory: memory.clone(),
                score: *score,
                match_reason: reason.clone(),
            });
        }
        if hits.len() >= limit {
            break;
        }
    }

    Ok(hits)
}

/// Batch-fetch memories by id within one agent scope.
fn fetch_memories(
    conn: &Connection,
    agent_id: &str,
    ids: &[&str],
) -> Result<HashMap<String, Memory>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let placeholders: Vec<String> = (2..=ids.len() + 1).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "SELECT {MEMORY_COLUMNS} FROM memories WHERE agent_id = ?1 AND id IN ({})",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut values: Vec<&dyn rusqlite::types::ToSql> = vec![&agent_id];
    for id in ids {
        values.push(id);
    }

    let rows = stmt
        .query_map(values.as_slice(), Memory::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows.into_iter().map(|m| (m.id.clone(), m)).collect())
}
