//! Append-only prior-state history for memories.
//!
//! A snapshot is taken immediately before any content mutation and as a
//! tombstone after destructive operations. Only the tidy phase prunes them.

use anyhow::{bail, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::memory::now_rfc3339;
use crate::memory::store::{get_memory, update_memory, MemoryUpdate};
use crate::memory::types::{Snapshot, SnapshotAction};
use crate::tokenizer::Tokenizer;

/// Record a snapshot of `content` for `memory_id`. Returns the snapshot id.
pub fn record_snapshot(
    conn: &Connection,
    memory_id: &str,
    content: &str,
    changed_by: Option<&str>,
    action: SnapshotAction,
) -> Result<String> {
    let id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO snapshots (id, memory_id, content, changed_by, action, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, memory_id, content, changed_by, action.as_str(), now_rfc3339()],
    )?;
    Ok(id)
}

/// List snapshots for a memory, newest first. The memory must exist in scope.
pub fn list_snapshots(conn: &Connection, agent_id: &str, memory_id: &str) -> Result<Vec<Snapshot>> {
    if get_memory(conn, agent_id, memory_id)?.is_none() {
        bail!("memory not found: {memory_id}");
    }
    let mut stmt = conn.prepare(
        "SELECT id, memory_id, content, changed_by, action, created_at \
         FROM snapshots WHERE memory_id = ?1 ORDER BY created_at DESC, id",
    )?;
    let rows = stmt
        .query_map(params![memory_id], snapshot_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Restore a memory to a snapshot's content.
///
/// The current content is snapshotted first (`changed_by = "rollback"`), so a
/// rollback can itself be rolled back. Fails if the snapshot's memory does not
/// exist in this agent scope.
pub fn rollback_snapshot(
    conn: &Connection,
    tokenizer: &Tokenizer,
    agent_id: &str,
    snapshot_id: &str,
) -> Result<String> {
    let snapshot: Option<Snapshot> = conn
        .query_row(
            "SELECT id, memory_id, content, changed_by, action, created_at \
             FROM snapshots WHERE id = ?1",
            params![snapshot_id],
            snapshot_from_row,
        )
        .optional()?;
    let snapshot = match snapshot {
        Some(s) => s,
        None => bail!("snapshot not found: {snapshot_id}"),
    };

    let memory = match get_memory(conn, agent_id, &snapshot.memory_id)? {
        Some(m) => m,
        None => bail!("memory not found: {}", snapshot.memory_id),
    };

    record_snapshot(
        conn,
        &memory.id,
        &memory.content,
        Some("rollback"),
        SnapshotAction::Update,
    )?;
    update_memory(
        conn,
        tokenizer,
        agent_id,
        &memory.id,
        &MemoryUpdate::content(snapshot.content.clone()),
    )?;

    Ok(memory.id)
}

/// Keep only the newest `keep` snapshots for one memory. Returns rows removed.
pub fn prune_snapshots(conn: &Connection, memory_id: &str, keep: usize) -> Result<usize> {
    let removed = conn.execute(
        "DELETE FROM snapshots WHERE memory_id = ?1 AND id NOT IN ( \
             SELECT id FROM snapshots WHERE memory_id = ?1 \
             ORDER BY created_at DESC, id LIMIT ?2)",
        params![memory_id, keep],
    )?;
    Ok(removed)
}

fn snapshot_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Snapshot> {
    Ok(Snapshot {
        id: row.get(0)?,
        memory_id: row.get(1)?,
        content: row.get(2)?,
        changed_by: row.get(3)?,
        action: row.get(4)?,
        created_at: row.get(5)?,
    })
}
