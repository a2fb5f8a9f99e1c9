use anyhow::Result;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

/// Response from the `status` tool.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub total_memories: u64,
    pub by_type: HashMap<String, u64>,
    pub by_priority: HashMap<String, u64>,
    pub paths: u64,
    pub links: u64,
    pub snapshots: u64,
    /// Memories at or past the archival threshold (vitality < 0.05).
    pub low_vitality: u64,
    pub db_size_bytes: u64,
    /// `(embedded, missing)` for the active embedding model, if one is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_coverage: Option<(u64, u64)>,
}

/// Compute store statistics for one agent scope.
///
/// `db_path` is used for file size; pass `None` for in-memory databases.
/// `embedding_model` enables the coverage counters.
pub fn status(
    conn: &Connection,
    agent_id: &str,
    db_path: Option<&Path>,
    embedding_model: Option<&str>,
) -> Result<StatusResponse> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM memories WHERE agent_id = ?1",
        params![agent_id],
        |row| row.get(0),
    )?;

    let by_type = grouped_counts(
        conn,
        agent_id,
        "SELECT type, COUNT(*) FROM memories WHERE agent_id = ?1 GROUP BY type",
        &["identity", "emotion", "knowledge", "event"],
    )?;

    let by_priority = {
        let mut map: HashMap<String, u64> =
            ["0", "1", "2", "3"].iter().map(|p| (p.to_string(), 0)).collect();
        let mut stmt = conn.prepare(
            "SELECT priority, COUNT(*) FROM memories WHERE agent_id = ?1 GROUP BY priority",
        )?;
        let rows: Vec<(i64, i64)> = stmt
            .query_map(params![agent_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        for (priority, count) in rows {
            map.insert(priority.to_string(), count as u64);
        }
        map
    };

    let scoped_count = |sql: &str| -> Result<u64> {
        let n: i64 = conn.query_row(sql, params![agent_id], |row| row.get(0))?;
        Ok(n as u64)
    };

    let paths = scoped_count("SELECT COUNT(*) FROM paths WHERE agent_id = ?1")?;
    let links = scoped_count("SELECT COUNT(*) FROM links WHERE agent_id = ?1")?;
    let snapshots = scoped_count(
        "SELECT COUNT(*) FROM snapshots WHERE memory_id IN \
         (SELECT id FROM memories WHERE agent_id = ?1)",
    )?;
    let low_vitality =
        scoped_count("SELECT COUNT(*) FROM memories WHERE agent_id = ?1 AND vitality < 0.05")?;

    let db_size_bytes = db_path
        .and_then(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .unwrap_or(0);

    let embedding_coverage = match embedding_model {
        Some(model) => {
            let (with, without) =
                crate::memory::embeddings::coverage(conn, agent_id, model)?;
            Some((with as u64, without as u64))
        }
        None => None,
    };

    Ok(StatusResponse {
        total_memories: total as u64,
        by_type,
        by_priority,
        paths,
        links,
        snapshots,
        low_vitality,
        db_size_bytes,
        embedding_coverage,
    })
}

fn grouped_counts(
    conn: &Connection,
    agent_id: &str,
    sql: &str,
    keys: &[&str],
) -> Result<HashMap<String, u64>> {
    let mut map: HashMap<String, u64> = keys.iter().map(|k| (k.to_string(), 0)).collect();
    let mut stmt = conn.prepare(sql)?;
    let rows: Vec<(String, i64)> = stmt
        .query_map(params![agent_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    for (key, count) in rows {
        map.insert(key, count as u64);
    }
    Ok(map)
}
