//! Typed directed edges between memories, and graph traversal.
//!
//! The `links` table is the adjacency list; nothing here materializes node
//! objects that own edges. Both endpoints of an edge must belong to the same
//! agent, enforced at creation time.

use anyhow::{bail, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};

use crate::memory::now_rfc3339;
use crate::memory::types::{Link, Relation};

/// Result returned from a link creation.
#[derive(Debug, Serialize)]
pub struct CreateLinkResult {
    pub link: Link,
    /// `true` if this ordered pair already had an edge; relation and weight
    /// were refreshed instead of inserting a second row.
    pub deduplicated: bool,
}

/// Create (or refresh) the edge `source → target`.
///
/// Validates both endpoints exist inside `agent_id`; cross-agent edges are
/// rejected. At most one edge per ordered pair — re-creating updates
/// relation and weight.
pub fn create_link(
    conn: &Connection,
    agent_id: &str,
    source_id: &str,
    target_id: &str,
    relation: Relation,
    weight: f64,
) -> Result<CreateLinkResult> {
    if source_id == target_id {
        bail!("cannot link a memory to itself");
    }
    verify_endpoint(conn, agent_id, source_id, "source")?;
    verify_endpoint(conn, agent_id, target_id, "target")?;

    let existing: Option<String> = conn
        .query_row(
            "SELECT created_at FROM links \
             WHERE agent_id = ?1 AND source_id = ?2 AND target_id = ?3",
            params![agent_id, source_id, target_id],
            |row| row.get(0),
        )
        .optional()?;

    let (created_at, deduplicated) = match existing {
        Some(created_at) => {
            conn.execute(
                "UPDATE links SET relation = ?1, weight = ?2 \
                 WHERE agent_id = ?3 AND source_id = ?4 AND target_id = ?5",
                params![relation.as_str(), weight, agent_id, source_id, target_id],
            )?;
            (created_at, true)
        }
        None => {
            let now = now_rfc3339();
            conn.execute(
                "INSERT INTO links (agent_id, source_id, target_id, relation, weight, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![agent_id, source_id, target_id, relation.as_str(), weight, now],
            )?;
            (now, false)
        }
    };

    Ok(CreateLinkResult {
        link: Link {
            agent_id: agent_id.to_string(),
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            relation,
            weight,
            created_at,
        },
        deduplicated,
    })
}

fn verify_endpoint(conn: &Connection, agent_id: &str, id: &str, role: &str) -> Result<()> {
    let found: Option<String> = conn
        .query_row(
            "SELECT id FROM memories WHERE id = ?1 AND agent_id = ?2",
            params![id, agent_id],
            |row| row.get(0),
        )
        .optional()?;
    if found.is_none() {
        bail!("{role} memory not found: {id}");
    }
    Ok(())
}

/// All edges touching `memory_id`, outgoing and incoming.
pub fn list_links(conn: &Connection, agent_id: &str, memory_id: &str) -> Result<Vec<Link>> {
    let mut stmt = conn.prepare(
        "SELECT agent_id, source_id, target_id, relation, weight, created_at FROM links \
         WHERE agent_id = ?1 AND (source_id = ?2 OR target_id = ?2) \
         ORDER BY created_at",
    )?;
    let rows = stmt
        .query_map(params![agent_id, memory_id], link_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Delete the edge for one ordered pair. Returns `false` when absent.
pub fn delete_link(
    conn: &Connection,
    agent_id: &str,
    source_id: &str,
    target_id: &str,
) -> Result<bool> {
    let changed = conn.execute(
        "DELETE FROM links WHERE agent_id = ?1 AND source_id = ?2 AND target_id = ?3",
        params![agent_id, source_id, target_id],
    )?;
    Ok(changed > 0)
}

/// A node reached during traversal.
#[derive(Debug, Clone, Serialize)]
pub struct TraverseNode {
    pub id: String,
    /// Distance from the start node (1-based).
    pub hop: u32,
    /// Relation of the first edge followed into this node.
    pub relation: Relation,
}

/// Breadth-first traversal from `start_id`, following edges in both
/// directions, up to `max_hops`. The start node itself is not included;
/// no node is visited twice.
pub fn traverse(
    conn: &Connection,
    agent_id: &str,
    start_id: &str,
    max_hops: u32,
) -> Result<Vec<TraverseNode>> {
    verify_endpoint(conn, agent_id, start_id, "start")?;

    let mut visited: HashSet<String> = HashSet::from([start_id.to_string()]);
    let mut queue: VecDeque<(String, u32)> = VecDeque::from([(start_id.to_string(), 0)]);
    let mut result: Vec<TraverseNode> = Vec::new();

    let mut stmt = conn.prepare(
        "SELECT source_id, target_id, relation FROM links \
         WHERE agent_id = ?1 AND (source_id = ?2 OR target_id = ?2)",
    )?;

    while let Some((current, hop)) = queue.pop_front() {
        if hop >= max_hops {
            continue;
        }
        let edges: Vec<(String, String, String)> = stmt
            .query_map(params![agent_id, current], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        for (source, target, relation_str) in edges {
            let neighbor = if source == current { target } else { source };
            if !visited.insert(neighbor.clone()) {
                continue;
            }
            let relation = relation_str
                .parse::<Relation>()
                .map_err(|e| anyhow::anyhow!(e))?;
            result.push(TraverseNode {
                id: neighbor.clone(),
                hop: hop + 1,
                relation,
            });
            queue.push_back((neighbor, hop + 1));
        }
    }

    Ok(result)
}

fn link_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Link> {
    let relation_str: String = row.get(3)?;
    let relation = relation_str.parse::<Relation>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
    })?;
    Ok(Link {
        agent_id: row.get(0)?,
        source_id: row.get(1)?,
        target_id: row.get(2)?,
        relation,
        weight: row.get(4)?,
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::memory::store::{create_memory, delete_memory, NewMemory};
    use crate::memory::types::MemoryType;
    use crate::tokenizer::Tokenizer;

    fn setup() -> (Connection, Tokenizer) {
        (db::open_memory_database().unwrap(), Tokenizer::new())
    }

    fn mem(conn: &Connection, tokenizer: &Tokenizer, agent: &str, content: &str) -> String {
        create_memory(conn, tokenizer, &NewMemory::new(agent, content, MemoryType::Knowledge))
            .unwrap()
            .unwrap()
            .id
    }

    #[test]
    fn create_and_list() {
        let (conn, tokenizer) = setup();
        let a = mem(&conn, &tokenizer, "default", "node a");
        let b = mem(&conn, &tokenizer, "default", "node b");

        let result = create_link(&conn, "default", &a, &b, Relation::Related, 1.0).unwrap();
        assert!(!result.deduplicated);

        let from_a = list_links(&conn, "default", &a).unwrap();
        let from_b = list_links(&conn, "default", &b).unwrap();
        assert_eq!(from_a.len(), 1);
        assert_eq!(from_b.len(), 1, "incoming edges are listed too");
    }

    #[test]
    fn recreate_refreshes_instead_of_duplicating() {
        let (conn, tokenizer) = setup();
        let a = mem(&conn, &tokenizer, "default", "node a");
        let b = mem(&conn, &tokenizer, "default", "node b");

        create_link(&conn, "default", &a, &b, Relation::Related, 1.0).unwrap();
        let second = create_link(&conn, "default", &a, &b, Relation::Caused, 0.5).unwrap();
        assert!(second.deduplicated);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM links", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);

        let links = list_links(&conn, "default", &a).unwrap();
        assert_eq!(links[0].relation, Relation::Caused);
        assert!((links[0].weight - 0.5).abs() < 1e-9);
    }

    #[test]
    fn cross_agent_link_rejected() {
        let (conn, tokenizer) = setup();
        let a = mem(&conn, &tokenizer, "default", "local node");
        let b = mem(&conn, &tokenizer, "other", "foreign node");

        let err = create_link(&conn, "default", &a, &b, Relation::Related, 1.0);
        assert!(err.is_err());
        assert!(err.unwrap_err().to_string().contains("not found"));
    }

    #[test]
    fn multi_hop_traversal() {
        let (conn, tokenizer) = setup();
        let a = mem(&conn, &tokenizer, "default", "knowledge alpha");
        let b = mem(&conn, &tokenizer, "default", "knowledge beta");
        let c = mem(&conn, &tokenizer, "default", "knowledge gamma");

        create_link(&conn, "default", &a, &b, Relation::Related, 1.0).unwrap();
        create_link(&conn, "default", &b, &c, Relation::Caused, 1.0).unwrap();

        let nodes = traverse(&conn, "default", &a, 2).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].id, b);
        assert_eq!(nodes[0].hop, 1);
        assert_eq!(nodes[0].relation, Relation::Related);
        assert_eq!(nodes[1].id, c);
        assert_eq!(nodes[1].hop, 2);
        assert_eq!(nodes[1].relation, Relation::Caused);
    }

    #[test]
    fn traversal_respects_hop_limit_and_never_revisits() {
        let (conn, tokenizer) = setup();
        let a = mem(&conn, &tokenizer, "default", "ring alpha");
        let b = mem(&conn, &tokenizer, "default", "ring beta");
        let c = mem(&conn, &tokenizer, "default", "ring gamma");

        // Cycle a → b → c → a
        create_link(&conn, "default", &a, &b, Relation::Related, 1.0).unwrap();
        create_link(&conn, "default", &b, &c, Relation::Related, 1.0).unwrap();
        create_link(&conn, "default", &c, &a, Relation::Related, 1.0).unwrap();

        let one_hop = traverse(&conn, "default", &a, 1).unwrap();
        // Both b and c are neighbors (c via its incoming edge into a)
        assert_eq!(one_hop.len(), 2);
        assert!(one_hop.iter().all(|n| n.hop == 1));

        let deep = traverse(&conn, "default", &a, 10).unwrap();
        assert_eq!(deep.len(), 2, "cycle must not produce repeats");
    }

    #[test]
    fn links_vanish_when_endpoint_deleted() {
        let (conn, tokenizer) = setup();
        let a = mem(&conn, &tokenizer, "default", "endpoint a");
        let b = mem(&conn, &tokenizer, "default", "endpoint b");
        create_link(&conn, "default", &a, &b, Relation::Related, 1.0).unwrap();

        delete_memory(&conn, "default", &b).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM links", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
