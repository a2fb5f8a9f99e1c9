//! Write Guard — the admission pipeline for incoming memories.
//!
//! Every write is classified as add / update / merge / skip before anything
//! touches the store. The guard itself performs no mutation; the caller
//! applies the decision, snapshotting before any destructive step. Stages run
//! in order and the first match wins:
//!
//! 1. exact duplicate by `(hash, agent_id)` → skip
//! 2. supplied URI already anchored → update the memory behind it
//! 3. high-rank lexical match of the same type → merge
//! 4. four-criterion quality gate → add, or skip naming the failures

use anyhow::Result;
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::memory::paths::get_path;
use crate::memory::store::get_by_hash;
use crate::memory::types::{content_hash, MemoryType};
use crate::tokenizer::{is_cjk, Tokenizer};

/// Rank-scale factor for the similarity-merge threshold.
const MERGE_RANK_SCALE: f64 = 1.5;

/// How the guard classified a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardAction {
    Add,
    Update,
    Merge,
    Skip,
}

/// The guard's verdict: an action, a human-readable rationale, and — for
/// update/merge/skip-duplicate — the existing memory it points at.
#[derive(Debug, Clone, Serialize)]
pub struct GuardDecision {
    pub action: GuardAction,
    pub reason: String,
    pub target_id: Option<String>,
    /// Pre-merged content for `merge` decisions.
    pub merged_content: Option<String>,
}

/// Input to the guard. Mirrors the write surface, minus anything mutable.
#[derive(Debug, Clone)]
pub struct GuardInput<'a> {
    pub agent_id: &'a str,
    pub content: &'a str,
    pub memory_type: MemoryType,
    pub uri: Option<&'a str>,
    pub priority: Option<u8>,
}

/// Classify one incoming write. Never mutates; never raises on FTS noise.
pub fn evaluate(conn: &Connection, tokenizer: &Tokenizer, input: &GuardInput) -> Result<GuardDecision> {
    // 1. Exact duplicate
    let hash = content_hash(input.content);
    if let Some(existing) = get_by_hash(conn, input.agent_id, &hash)? {
        return Ok(GuardDecision {
            action: GuardAction::Skip,
            reason: "exact duplicate content".into(),
            target_id: Some(existing.id),
            merged_content: None,
        });
    }

    // 2. URI conflict → update the anchored memory
    if let Some(uri) = input.uri {
        if let Some(path) = get_path(conn, input.agent_id, uri)? {
            return Ok(GuardDecision {
                action: GuardAction::Update,
                reason: format!("URI already anchored: {uri}"),
                target_id: Some(path.memory_id),
                merged_content: None,
            });
        }
    }

    // 3. Similarity merge
    if let Some(decision) = similarity_merge(conn, tokenizer, input)? {
        return Ok(decision);
    }

    // 4. Quality gate
    let failures = quality_failures(tokenizer, input);
    if !failures.is_empty() {
        return Ok(GuardDecision {
            action: GuardAction::Skip,
            reason: format!("quality gate failed: {}", failures.join(", ")),
            target_id: None,
            merged_content: None,
        });
    }

    Ok(GuardDecision {
        action: GuardAction::Add,
        reason: "new memory".into(),
        target_id: None,
        merged_content: None,
    })
}

/// Probe the full-text index with up to 8 tokens from the first 200 chars.
/// A same-type match whose BM25 rank magnitude exceeds `tokens × 1.5`
/// becomes a merge target.
fn similarity_merge(
    conn: &Connection,
    tokenizer: &Tokenizer,
    input: &GuardInput,
) -> Result<Option<GuardDecision>> {
    let head: String = input.content.chars().take(200).collect();
    let tokens: Vec<String> = tokenizer.tokenize(&head).into_iter().take(8).collect();
    if tokens.is_empty() {
        return Ok(None);
    }

    let fts_query = tokens
        .iter()
        .map(|t| format!("\"{}\"", t.replace('"', "")))
        .collect::<Vec<_>>()
        .join(" OR ");

    // Malformed token sets must never surface an error from the probe
    let candidates: Vec<(String, String, String, f64)> = {
        let mut stmt = match conn.prepare(
            "SELECT m.id, m.type, m.content, memories_fts.rank \
             FROM memories_fts JOIN memories m ON m.id = memories_fts.id \
             WHERE memories_fts MATCH ?1 AND m.agent_id = ?2 \
             ORDER BY memories_fts.rank LIMIT 3",
        ) {
            Ok(stmt) => stmt,
            Err(_) => return Ok(None),
        };
        let result = match stmt.query_map(params![fts_query, input.agent_id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        }) {
            Ok(rows) => rows.filter_map(|r| r.ok()).collect(),
            Err(_) => return Ok(None),
        };
        result
    };

    let Some((id, type_str, existing_content, rank)) = candidates.into_iter().next() else {
        return Ok(None);
    };

    let top_rank = rank.abs();
    let threshold = tokens.len() as f64 * MERGE_RANK_SCALE;
    if top_rank > threshold && type_str == input.memory_type.as_str() {
        let merged = format!("{existing_content}\n\n[Updated] {}", input.content);
        return Ok(Some(GuardDecision {
            action: GuardAction::Merge,
            reason: format!("high lexical overlap (rank {top_rank:.1} > {threshold:.1})"),
            target_id: Some(id),
            merged_content: Some(merged),
        }));
    }

    Ok(None)
}

/// The four admission criteria. Returns the names of every failing one.
fn quality_failures(tokenizer: &Tokenizer, input: &GuardInput) -> Vec<&'static str> {
    let mut failures = Vec::new();
    let content = input.content;
    let char_count = content.chars().count();
    let priority = input
        .priority
        .unwrap_or_else(|| input.memory_type.default_priority());

    // Specificity: durable memories may be terse, transient ones must say more
    let min_len = if priority <= 1 { 4 } else { 8 };
    if char_count < min_len {
        failures.push("specificity");
    }

    // Novelty: at least one non-stopword token
    if tokenizer.tokenize(content).is_empty() {
        failures.push("novelty");
    }

    if !is_relevant(content, char_count) {
        failures.push("relevance");
    }

    if coherence_score(content, char_count) < 0.3 {
        failures.push("coherence");
    }

    failures
}

/// Relevance: any one signal that the content is about something concrete.
fn is_relevant(content: &str, char_count: usize) -> bool {
    content.chars().any(is_cjk)
        || content
            .split_whitespace()
            .any(|w| w.chars().next().is_some_and(|c| c.is_uppercase()))
        || content.chars().any(|c| c.is_ascii_digit())
        || content.contains("://")
        || content.contains("www.")
        || content.contains('@')
        || content.contains('#')
        || char_count >= 15
}

/// Coherence starts at 1.0 and sheds points for degenerate shapes.
fn coherence_score(content: &str, char_count: usize) -> f64 {
    let mut score: f64 = 1.0;

    // All-caps monolith
    if char_count > 20
        && content
            .chars()
            .all(|c| c.is_ascii_uppercase() || c == ' ')
    {
        score -= 0.5;
    }

    // Long run of text with no whitespace or punctuation at all
    if char_count > 20
        && !content.chars().any(|c| c.is_whitespace())
        && !content.chars().any(|c| c.is_ascii_punctuation())
    {
        score -= 0.3;
    }

    // Any character repeated 10+ times in a row
    let mut run = 0u32;
    let mut prev: Option<char> = None;
    for c in content.chars() {
        if Some(c) == prev {
            run += 1;
            if run >= 10 {
                score -= 0.5;
                break;
            }
        } else {
            run = 1;
            prev = Some(c);
        }
    }

    score
}
