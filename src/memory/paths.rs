//! URI anchors onto memories.
//!
//! A path gives a memory a stable, hierarchical address separate from its
//! internal id: `domain://free/form/path`. Paths are unique per
//! `(agent_id, uri)` and must share the owning memory's tenant.

use anyhow::{bail, Result};
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::OnceLock;

use crate::memory::now_rfc3339;
use crate::memory::types::MemoryPath;

/// Domains accepted when the caller supplies no wider set.
pub const DEFAULT_DOMAINS: &[&str] = &["core", "emotion", "knowledge", "event", "system"];

fn uri_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([a-z]+)://(.+)$").expect("valid URI regex"))
}

/// Split a URI into `(domain, rest)`, or fail on malformed input.
pub fn parse_uri(uri: &str) -> Result<(String, String)> {
    match uri_regex().captures(uri) {
        Some(caps) => Ok((caps[1].to_string(), caps[2].to_string())),
        None => bail!("malformed URI (expected domain://path): {uri}"),
    }
}

/// Create a path anchoring `memory_id` at `uri`.
///
/// Validates the URI grammar, the domain against `allowed_domains` (or the
/// default set), and that the memory exists in the same agent scope. A
/// duplicate `(agent_id, uri)` surfaces as an error for callers to classify.
pub fn create_path(
    conn: &Connection,
    agent_id: &str,
    memory_id: &str,
    uri: &str,
    alias: Option<&str>,
    allowed_domains: Option<&[&str]>,
) -> Result<MemoryPath> {
    let (domain, _) = parse_uri(uri)?;

    let domains = allowed_domains.unwrap_or(DEFAULT_DOMAINS);
    if !domains.contains(&domain.as_str()) {
        bail!("unknown URI domain '{domain}' (allowed: {})", domains.join(", "));
    }

    let owner: Option<String> = conn
        .query_row(
            "SELECT agent_id FROM memories WHERE id = ?1",
            params![memory_id],
            |row| row.get(0),
        )
        .optional()?;
    match owner {
        None => bail!("memory not found: {memory_id}"),
        Some(owner_agent) if owner_agent != agent_id => {
            bail!("memory not found: {memory_id}")
        }
        Some(_) => {}
    }

    if get_path(conn, agent_id, uri)?.is_some() {
        bail!("URI already exists for this agent: {uri}");
    }

    let id = uuid::Uuid::new_v4().to_string();
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO paths (id, memory_id, agent_id, uri, alias, domain, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![id, memory_id, agent_id, uri, alias, domain, now],
    )?;

    Ok(MemoryPath {
        id,
        memory_id: memory_id.to_string(),
        agent_id: agent_id.to_string(),
        uri: uri.to_string(),
        alias: alias.map(str::to_string),
        domain,
        created_at: now,
    })
}

/// Exact URI lookup within one agent scope.
pub fn get_path(conn: &Connection, agent_id: &str, uri: &str) -> Result<Option<MemoryPath>> {
    Ok(conn
        .query_row(
            "SELECT id, memory_id, agent_id, uri, alias, domain, created_at \
             FROM paths WHERE agent_id = ?1 AND uri = ?2",
            params![agent_id, uri],
            path_from_row,
        )
        .optional()?)
}

/// All paths whose URI starts with `prefix`, ordered by URI.
pub fn list_paths_by_prefix(
    conn: &Connection,
    agent_id: &str,
    prefix: &str,
) -> Result<Vec<MemoryPath>> {
    let mut stmt = conn.prepare(
        "SELECT id, memory_id, agent_id, uri, alias, domain, created_at \
         FROM paths WHERE agent_id = ?1 AND uri LIKE ?2 || '%' ORDER BY uri",
    )?;
    let rows = stmt
        .query_map(params![agent_id, prefix], path_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// All paths pointing at one memory.
pub fn list_paths_for_memory(
    conn: &Connection,
    agent_id: &str,
    memory_id: &str,
) -> Result<Vec<MemoryPath>> {
    let mut stmt = conn.prepare(
        "SELECT id, memory_id, agent_id, uri, alias, domain, created_at \
         FROM paths WHERE agent_id = ?1 AND memory_id = ?2 ORDER BY uri",
    )?;
    let rows = stmt
        .query_map(params![agent_id, memory_id], path_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Delete a path by URI. Returns `false` when no such path exists in scope.
pub fn delete_path(conn: &Connection, agent_id: &str, uri: &str) -> Result<bool> {
    let changed = conn.execute(
        "DELETE FROM paths WHERE agent_id = ?1 AND uri = ?2",
        params![agent_id, uri],
    )?;
    Ok(changed > 0)
}

fn path_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryPath> {
    Ok(MemoryPath {
        id: row.get(0)?,
        memory_id: row.get(1)?,
        agent_id: row.get(2)?,
        uri: row.get(3)?,
        alias: row.get(4)?,
        domain: row.get(5)?,
        created_at: row.get(6)?,
    })
}
