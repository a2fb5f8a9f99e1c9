//! The sleep cycle — maintenance phases modeled on memory consolidation.
//!
//! Four phases: [`sync_batch`] (capture/merge through the Write Guard),
//! [`decay`] (Ebbinghaus retention), [`tidy`] (archival and pruning), and
//! [`govern`] (integrity sweep). Each phase runs inside a single transaction;
//! a crash mid-phase leaves the store in the pre-phase state. [`boot`] is the
//! invariant-preserving identity loader, and [`reindex`] rebuilds the FTS
//! mirror from current content.

use anyhow::Result;
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::memory::guard::{self, GuardAction, GuardInput};
use crate::memory::types::{vitality_floor, Memory, MemoryType, SnapshotAction};
use crate::memory::{paths, snapshots, store};
use crate::tokenizer::Tokenizer;

/// URIs the boot loader always tries to honor.
pub const DEFAULT_BOOT_URIS: &[&str] =
    &["core://identity", "core://persona", "core://user", "system://boot"];

/// One item of the sync phase.
#[derive(Debug, Clone)]
pub struct SyncInput {
    pub content: String,
    pub memory_type: MemoryType,
    pub uri: Option<String>,
    pub priority: Option<u8>,
    pub emotion_val: f64,
    pub source: Option<String>,
}

impl SyncInput {
    pub fn new(content: impl Into<String>, memory_type: MemoryType) -> Self {
        Self {
            content: content.into(),
            memory_type,
            uri: None,
            priority: None,
            emotion_val: 0.0,
            source: None,
        }
    }
}

/// What happened to one sync item.
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub action: GuardAction,
    pub reason: String,
    /// The new or affected memory, where the action touched one.
    pub memory_id: Option<String>,
}

/// Run a batch of sync items inside one transaction.
///
/// Either the whole batch commits or none of it does; partial results are
/// never exposed.
pub fn sync_batch(
    conn: &mut Connection,
    tokenizer: &Tokenizer,
    agent_id: &str,
    items: &[SyncInput],
) -> Result<Vec<SyncOutcome>> {
    let tx = conn.transaction()?;
    let mut outcomes = Vec::with_capacity(items.len());
    for item in items {
        outcomes.push(apply_sync_item(&tx, tokenizer, agent_id, item)?);
    }
    tx.commit()?;
    Ok(outcomes)
}

/// Guard-classify one item and execute the decision.
fn apply_sync_item(
    conn: &Connection,
    tokenizer: &Tokenizer,
    agent_id: &str,
    item: &SyncInput,
) -> Result<SyncOutcome> {
    let decision = guard::evaluate(
        conn,
        tokenizer,
        &GuardInput {
            agent_id,
            content: &item.content,
            memory_type: item.memory_type,
            uri: item.uri.as_deref(),
            priority: item.priority,
        },
    )?;

    match decision.action {
        GuardAction::Add => {
            let mut input = store::NewMemory::new(agent_id, item.content.clone(), item.memory_type);
            input.priority = item.priority;
            input.emotion_val = item.emotion_val;
            input.source = item.source.clone();

            let created = store::create_memory(conn, tokenizer, &input)?;
            let memory_id = match created {
                Some(memory) => {
                    if let Some(ref uri) = item.uri {
                        // A lost race on the URI is tolerable; the memory stands
                        if let Err(err) =
                            paths::create_path(conn, agent_id, &memory.id, uri, None, None)
                        {
                            tracing::debug!(%err, uri, "path not created during sync");
                        }
                    }
                    Some(memory.id)
                }
                None => None,
            };
            Ok(SyncOutcome {
                action: GuardAction::Add,
                reason: decision.reason,
                memory_id,
            })
        }
        GuardAction::Update | GuardAction::Merge => {
            let target_id = decision.target_id.expect("update/merge carries a target");
            let existing = store::get_memory(conn, agent_id, &target_id)?
                .ok_or_else(|| anyhow::anyhow!("guard target vanished: {target_id}"))?;

            let (action, new_content) = match decision.action {
                GuardAction::Merge => (
                    SnapshotAction::Merge,
                    decision
                        .merged_content
                        .unwrap_or_else(|| item.content.clone()),
                ),
                _ => (SnapshotAction::Update, item.content.clone()),
            };

            snapshots::record_snapshot(conn, &existing.id, &existing.content, Some("sync"), action)?;
            store::update_memory(
                conn,
                tokenizer,
                agent_id,
                &existing.id,
                &store::MemoryUpdate::content(new_content),
            )?;

            Ok(SyncOutcome {
                action: decision.action,
                reason: decision.reason,
                memory_id: Some(existing.id),
            })
        }
        GuardAction::Skip => Ok(SyncOutcome {
            action: GuardAction::Skip,
            reason: decision.reason,
            memory_id: decision.target_id,
        }),
    }
}

/// Counters reported by the decay phase.
#[derive(Debug, Default, Serialize)]
pub struct DecayReport {
    pub updated: usize,
    pub decayed: usize,
    pub below_threshold: usize,
}

/// Ebbinghaus decay over every priority > 0 memory in scope.
///
/// Retention restarts from the most recent recall (`last_accessed`, falling
/// back to `created_at`), so oft-recalled memories decay slowly. Writes are
/// suppressed when the change is within ±0.001.
pub fn decay(conn: &mut Connection, agent_id: Option<&str>) -> Result<DecayReport> {
    let tx = conn.transaction()?;
    let now = chrono::Utc::now();
    let mut report = DecayReport::default();

    let rows: Vec<(String, u8, f64, f64, Option<String>, String)> = {
        let mut sql = String::from(
            "SELECT id, priority, vitality, stability, last_accessed, created_at \
             FROM memories WHERE priority > 0",
        );
        if agent_id.is_some() {
            sql.push_str(" AND agent_id = ?1");
        }
        let mut stmt = tx.prepare(&sql)?;
        let map = |row: &rusqlite::Row<'_>| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            ))
        };
        match agent_id {
            Some(agent) => stmt.query_map(params![agent], map)?.collect::<Result<_, _>>()?,
            None => stmt.query_map([], map)?.collect::<Result<_, _>>()?,
        }
    };

    for (id, priority, vitality, stability, last_accessed, created_at) in rows {
        let reference = last_accessed.as_deref().unwrap_or(created_at.as_str());
        let Ok(reference) = chrono::DateTime::parse_from_rfc3339(reference) else {
            continue;
        };
        let delta_days =
            (now - reference.with_timezone(&chrono::Utc)).num_seconds() as f64 / 86_400.0;
        let retention = (-delta_days.max(0.0) / stability.max(0.01)).exp();
        let new_vitality = retention.max(vitality_floor(priority));

        if (new_vitality - vitality).abs() > 0.001 {
            tx.execute(
                "UPDATE memories SET vitality = ?1 WHERE id = ?2",
                params![new_vitality, id],
            )?;
            report.updated += 1;
            if new_vitality < vitality {
                report.decayed += 1;
            }
            if vitality >= 0.05 && new_vitality < 0.05 {
                report.below_threshold += 1;
            }
        }
    }

    tx.commit()?;
    Ok(report)
}

/// Counters reported by the tidy phase.
#[derive(Debug, Default, Serialize)]
pub struct TidyReport {
    pub archived: usize,
    pub orphans_cleaned: usize,
    pub snapshots_pruned: usize,
}

/// Archive faded events, clean orphan paths, prune snapshot history.
///
/// Only priority ≥ 3 memories are archival candidates; durable classes never
/// leave through this door. Each archived memory leaves a `delete` tombstone.
pub fn tidy(
    conn: &mut Connection,
    agent_id: Option<&str>,
    threshold: f64,
    max_snapshots_per_memory: usize,
) -> Result<TidyReport> {
    let tx = conn.transaction()?;
    let mut report = TidyReport::default();

    // 1. Archive faded events
    let candidates: Vec<(String, String, String)> = {
        let mut sql = String::from(
            "SELECT id, agent_id, content FROM memories WHERE vitality < ?1 AND priority >= 3",
        );
        if agent_id.is_some() {
            sql.push_str(" AND agent_id = ?2");
        }
        let mut stmt = tx.prepare(&sql)?;
        let map = |row: &rusqlite::Row<'_>| Ok((row.get(0)?, row.get(1)?, row.get(2)?));
        match agent_id {
            Some(agent) => stmt
                .query_map(params![threshold, agent], map)?
                .collect::<Result<_, _>>()?,
            None => stmt
                .query_map(params![threshold], map)?
                .collect::<Result<_, _>>()?,
        }
    };

    for (id, owner, content) in candidates {
        if store::delete_memory(&tx, &owner, &id)? {
            // Tombstone after the purge so it survives as history
            if let Err(err) =
                snapshots::record_snapshot(&tx, &id, &content, Some("tidy"), SnapshotAction::Delete)
            {
                tracing::warn!(%err, id, "archive tombstone not written");
            }
            report.archived += 1;
        }
    }

    // 2. Orphan paths (raw deletions elsewhere can leave these behind)
    report.orphans_cleaned = delete_orphan_paths(&tx, agent_id)?;

    // 3. Snapshot history cap
    let heavy: Vec<String> = {
        let mut stmt = tx.prepare(
            "SELECT memory_id FROM snapshots GROUP BY memory_id HAVING COUNT(*) > ?1",
        )?;
        let result = stmt
            .query_map(params![max_snapshots_per_memory], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        result
    };
    for memory_id in heavy {
        report.snapshots_pruned +=
            snapshots::prune_snapshots(&tx, &memory_id, max_snapshots_per_memory)?;
    }

    tx.commit()?;
    Ok(report)
}

/// Counters reported by the govern phase.
#[derive(Debug, Default, Serialize)]
pub struct GovernReport {
    pub orphan_paths: usize,
    pub orphan_links: usize,
    pub empty_memories: usize,
}

/// Integrity sweep: drop rows whose referents vanished outside normal
/// cascading, and memories whose content trimmed to nothing. Safe to repeat —
/// a second run right after is a no-op.
pub fn govern(conn: &mut Connection, agent_id: Option<&str>) -> Result<GovernReport> {
    let tx = conn.transaction()?;
    let mut report = GovernReport::default();

    report.orphan_paths = delete_orphan_paths(&tx, agent_id)?;

    report.orphan_links = tx.execute(
        "DELETE FROM links WHERE source_id NOT IN (SELECT id FROM memories) \
         OR target_id NOT IN (SELECT id FROM memories)",
        [],
    )?;

    let empties: Vec<(String, String)> = {
        let mut sql =
            String::from("SELECT id, agent_id FROM memories WHERE TRIM(content) = ''");
        if agent_id.is_some() {
            sql.push_str(" AND agent_id = ?1");
        }
        let mut stmt = tx.prepare(&sql)?;
        let map = |row: &rusqlite::Row<'_>| Ok((row.get(0)?, row.get(1)?));
        match agent_id {
            Some(agent) => stmt.query_map(params![agent], map)?.collect::<Result<_, _>>()?,
            None => stmt.query_map([], map)?.collect::<Result<_, _>>()?,
        }
    };
    for (id, owner) in empties {
        if store::delete_memory(&tx, &owner, &id)? {
            report.empty_memories += 1;
        }
    }

    tx.commit()?;
    Ok(report)
}

fn delete_orphan_paths(conn: &Connection, agent_id: Option<&str>) -> Result<usize> {
    let removed = match agent_id {
        Some(agent) => conn.execute(
            "DELETE FROM paths WHERE agent_id = ?1 \
             AND memory_id NOT IN (SELECT id FROM memories)",
            params![agent],
        )?,
        None => conn.execute(
            "DELETE FROM paths WHERE memory_id NOT IN (SELECT id FROM memories)",
            [],
        )?,
    };
    Ok(removed)
}

/// What the boot loader surfaced.
#[derive(Debug, Serialize)]
pub struct BootReport {
    pub memories: Vec<Memory>,
    pub honored_uris: Vec<String>,
}

/// Load the agent's identity: every priority-0 memory plus whatever the boot
/// URIs (default list + one-per-line extras in the `system://boot` memory)
/// resolve to. Every returned memory is gently strengthened.
pub fn boot(
    conn: &mut Connection,
    agent_id: &str,
    growth: f64,
) -> Result<BootReport> {
    let tx = conn.transaction()?;

    let mut uris: Vec<String> = DEFAULT_BOOT_URIS.iter().map(|u| u.to_string()).collect();
    if let Some(boot_path) = paths::get_path(&tx, agent_id, "system://boot")? {
        if let Some(boot_memory) = store::get_memory(&tx, agent_id, &boot_path.memory_id)? {
            for line in boot_memory.content.lines() {
                let line = line.trim();
                if !line.is_empty() && !uris.iter().any(|u| u == line) {
                    uris.push(line.to_string());
                }
            }
        }
    }

    let mut ids: Vec<String> = Vec::new();
    let mut honored_uris: Vec<String> = Vec::new();

    let identity_rows: Vec<String> = {
        let mut stmt = tx.prepare(
            "SELECT id FROM memories WHERE agent_id = ?1 AND priority = 0 \
             ORDER BY updated_at DESC",
        )?;
        let result = stmt
            .query_map(params![agent_id], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        result
    };
    ids.extend(identity_rows);

    for uri in &uris {
        if let Some(path) = paths::get_path(&tx, agent_id, uri)? {
            honored_uris.push(uri.clone());
            if !ids.contains(&path.memory_id) {
                ids.push(path.memory_id);
            }
        }
    }

    let mut memories = Vec::with_capacity(ids.len());
    for id in &ids {
        store::record_access(&tx, agent_id, id, growth)?;
        if let Some(memory) = store::get_memory(&tx, agent_id, id)? {
            memories.push(memory);
        }
    }

    tx.commit()?;
    Ok(BootReport {
        memories,
        honored_uris,
    })
}

/// Drop and rebuild the FTS mirror from current memory content.
pub fn reindex(conn: &mut Connection, tokenizer: &Tokenizer) -> Result<usize> {
    let tx = conn.transaction()?;

    tx.execute("DELETE FROM memories_fts", [])?;

    let rows: Vec<(String, String)> = {
        let mut stmt = tx.prepare("SELECT id, content FROM memories")?;
        let result = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<_, _>>()?;
        result
    };
    let count = rows.len();
    for (id, content) in &rows {
        store::fts_insert(&tx, tokenizer, id, content)?;
    }

    tx.commit()?;
    tracing::info!(count, "rebuilt FTS index");
    Ok(count)
}

/// Fetch memories behind an exact or prefix URI, without strengthening.
/// Used by the `recall_path` tool.
pub fn resolve_path(
    conn: &Connection,
    agent_id: &str,
    uri: &str,
) -> Result<Vec<(String, Memory)>> {
    let mut results = Vec::new();

    if let Some(path) = paths::get_path(conn, agent_id, uri)? {
        if let Some(memory) = store::get_memory(conn, agent_id, &path.memory_id)? {
            results.push((path.uri, memory));
            return Ok(results);
        }
    }

    for path in paths::list_paths_by_prefix(conn, agent_id, uri)? {
        if let Some(memory) = store::get_memory(conn, agent_id, &path.memory_id)? {
            results.push((path.uri, memory));
        }
    }
    Ok(results)
}
