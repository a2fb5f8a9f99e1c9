//! Entity layer for memories — create, read, update, delete, strengthen.
//!
//! Every content write mirrors the tokenized form into the `memories_fts`
//! index inside the same transaction as the row mutation, so lexical search
//! never disagrees with the row store. Creation deduplicates on
//! `(hash, agent_id)` and returns `None` instead of raising.

use anyhow::{bail, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::memory::types::{
    content_hash, initial_stability, Memory, MemoryType, MEMORY_COLUMNS, STABILITY_CEILING,
};
use crate::memory::now_rfc3339;
use crate::tokenizer::Tokenizer;

/// Input for a new memory row.
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub agent_id: String,
    pub content: String,
    pub memory_type: MemoryType,
    /// Durability class; defaults from the type when `None`.
    pub priority: Option<u8>,
    pub emotion_val: f64,
    pub source: Option<String>,
}

impl NewMemory {
    pub fn new(agent_id: impl Into<String>, content: impl Into<String>, memory_type: MemoryType) -> Self {
        Self {
            agent_id: agent_id.into(),
            content: content.into(),
            memory_type,
            priority: None,
            emotion_val: 0.0,
            source: None,
        }
    }
}

/// Typed partial update. `None` fields are left untouched; the SET clause is
/// assembled once from whichever fields are present.
#[derive(Debug, Clone, Default)]
pub struct MemoryUpdate {
    pub content: Option<String>,
    pub priority: Option<u8>,
    pub emotion_val: Option<f64>,
    pub vitality: Option<f64>,
    pub stability: Option<f64>,
    pub source: Option<Option<String>>,
}

impl MemoryUpdate {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.priority.is_none()
            && self.emotion_val.is_none()
            && self.vitality.is_none()
            && self.stability.is_none()
            && self.source.is_none()
    }
}

/// Create a memory, deduplicating on `(hash, agent_id)`.
///
/// Returns `Ok(None)` when a memory with identical trimmed content already
/// exists for this agent — a no-op, not an error.
pub fn create_memory(
    conn: &Connection,
    tokenizer: &Tokenizer,
    input: &NewMemory,
) -> Result<Option<Memory>> {
    if input.content.trim().is_empty() {
        bail!("memory content must not be empty");
    }
    if !(-1.0..=1.0).contains(&input.emotion_val) {
        bail!("emotion_val must be between -1.0 and 1.0");
    }
    let priority = input.priority.unwrap_or_else(|| input.memory_type.default_priority());
    if priority > 3 {
        bail!("priority must be between 0 and 3");
    }

    let hash = content_hash(&input.content);
    if get_by_hash(conn, &input.agent_id, &hash)?.is_some() {
        return Ok(None);
    }

    let id = uuid::Uuid::new_v4().to_string();
    let now = now_rfc3339();
    let stability = initial_stability(priority);

    conn.execute(
        "INSERT INTO memories (id, agent_id, content, type, priority, emotion_val, vitality, \
         stability, access_count, created_at, updated_at, source, hash) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1.0, ?7, 0, ?8, ?8, ?9, ?10)",
        params![
            id,
            input.agent_id,
            input.content,
            input.memory_type.as_str(),
            priority,
            input.emotion_val,
            stability,
            now,
            input.source,
            hash,
        ],
    )?;

    fts_insert(conn, tokenizer, &id, &input.content)?;

    Ok(get_memory(conn, &input.agent_id, &id)?)
}

/// Fetch a memory by id within one agent scope.
pub fn get_memory(conn: &Connection, agent_id: &str, id: &str) -> Result<Option<Memory>> {
    let sql = format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1 AND agent_id = ?2");
    Ok(conn
        .query_row(&sql, params![id, agent_id], Memory::from_row)
        .optional()?)
}

/// Fetch a memory by content hash within one agent scope.
pub fn get_by_hash(conn: &Connection, agent_id: &str, hash: &str) -> Result<Option<Memory>> {
    let sql = format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE hash = ?1 AND agent_id = ?2");
    Ok(conn
        .query_row(&sql, params![hash, agent_id], Memory::from_row)
        .optional()?)
}

/// Apply a typed partial update. Content changes recompute the hash and
/// re-sync the FTS row. Returns `false` if the memory does not exist in scope.
pub fn update_memory(
    conn: &Connection,
    tokenizer: &Tokenizer,
    agent_id: &str,
    id: &str,
    update: &MemoryUpdate,
) -> Result<bool> {
    if update.is_empty() {
        return Ok(get_memory(conn, agent_id, id)?.is_some());
    }
    if get_memory(conn, agent_id, id)?.is_none() {
        return Ok(false);
    }

    let mut sets: Vec<&str> = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(ref content) = update.content {
        if content.trim().is_empty() {
            bail!("memory content must not be empty");
        }
        sets.push("content = ?");
        values.push(Box::new(content.clone()));
        sets.push("hash = ?");
        values.push(Box::new(content_hash(content)));
    }
    if let Some(priority) = update.priority {
        if priority > 3 {
            bail!("priority must be between 0 and 3");
        }
        sets.push("priority = ?");
        values.push(Box::new(priority));
    }
    if let Some(emotion_val) = update.emotion_val {
        if !(-1.0..=1.0).contains(&emotion_val) {
            bail!("emotion_val must be between -1.0 and 1.0");
        }
        sets.push("emotion_val = ?");
        values.push(Box::new(emotion_val));
    }
    if let Some(vitality) = update.vitality {
        sets.push("vitality = ?");
        values.push(Box::new(vitality.clamp(0.0, 1.0)));
    }
    if let Some(stability) = update.stability {
        if stability <= 0.0 {
            bail!("stability must be positive");
        }
        sets.push("stability = ?");
        values.push(Box::new(stability.min(STABILITY_CEILING)));
    }
    if let Some(ref source) = update.source {
        sets.push("source = ?");
        values.push(Box::new(source.clone()));
    }

    sets.push("updated_at = ?");
    values.push(Box::new(now_rfc3339()));
    values.push(Box::new(id.to_string()));
    values.push(Box::new(agent_id.to_string()));

    let sql = format!(
        "UPDATE memories SET {} WHERE id = ?{} AND agent_id = ?{}",
        sets.iter()
            .enumerate()
            .map(|(i, s)| s.replace('?', &format!("?{}", i + 1)))
            .collect::<Vec<_>>()
            .join(", "),
        values.len() - 1,
        values.len(),
    );

    let changed = conn.execute(
        &sql,
        rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
    )?;

    if changed > 0 {
        if let Some(ref content) = update.content {
            fts_delete(conn, id)?;
            fts_insert(conn, tokenizer, id, content)?;
        }
    }

    Ok(changed > 0)
}

/// Delete a memory and every row referencing it.
///
/// Paths, links, and embeddings go via FK cascade; the FTS row and the
/// snapshot history are purged explicitly. Returns `false` if the memory does
/// not exist in scope.
pub fn delete_memory(conn: &Connection, agent_id: &str, id: &str) -> Result<bool> {
    if get_memory(conn, agent_id, id)?.is_none() {
        return Ok(false);
    }

    fts_delete(conn, id)?;
    conn.execute("DELETE FROM snapshots WHERE memory_id = ?1", params![id])?;
    conn.execute(
        "DELETE FROM memories WHERE id = ?1 AND agent_id = ?2",
        params![id, agent_id],
    )?;
    Ok(true)
}

/// Recall strengthens: raise stability and vitality, bump the access counter.
///
/// `stability ← min(ceiling, stability × growth)`, `vitality ← min(1, vitality × 1.2)`.
/// Monotonic — never lowers either value.
pub fn record_access(conn: &Connection, agent_id: &str, id: &str, growth: f64) -> Result<bool> {
    let now = now_rfc3339();
    let changed = conn.execute(
        "UPDATE memories SET \
         stability = MIN(?1, stability * ?2), \
         vitality = MIN(1.0, vitality * 1.2), \
         access_count = access_count + 1, \
         last_accessed = ?3 \
         WHERE id = ?4 AND agent_id = ?5",
        params![STABILITY_CEILING, growth, now, id, agent_id],
    )?;
    Ok(changed > 0)
}

/// Filters for [`list_memories`].
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub memory_type: Option<MemoryType>,
    pub priority: Option<u8>,
    pub min_vitality: Option<f64>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// List memories in scope, ordered by `priority ASC, updated_at DESC`.
pub fn list_memories(conn: &Connection, agent_id: &str, filter: &ListFilter) -> Result<Vec<Memory>> {
    let mut sql = format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE agent_id = ?1");
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(agent_id.to_string())];

    if let Some(memory_type) = filter.memory_type {
        values.push(Box::new(memory_type.as_str().to_string()));
        sql.push_str(&format!(" AND type = ?{}", values.len()));
    }
    if let Some(priority) = filter.priority {
        values.push(Box::new(priority));
        sql.push_str(&format!(" AND priority = ?{}", values.len()));
    }
    if let Some(min_vitality) = filter.min_vitality {
        values.push(Box::new(min_vitality));
        sql.push_str(&format!(" AND vitality >= ?{}", values.len()));
    }

    sql.push_str(" ORDER BY priority ASC, updated_at DESC");
    sql.push_str(&format!(" LIMIT {}", filter.limit.unwrap_or(100)));
    if let Some(offset) = filter.offset {
        sql.push_str(&format!(" OFFSET {offset}"));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
            Memory::from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Mirror tokenized content into the FTS index.
pub(crate) fn fts_insert(
    conn: &Connection,
    tokenizer: &Tokenizer,
    id: &str,
    content: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO memories_fts (id, content) VALUES (?1, ?2)",
        params![id, tokenizer.fts_text(content)],
    )?;
    Ok(())
}

pub(crate) fn fts_delete(conn: &Connection, id: &str) -> Result<()> {
    conn.execute("DELETE FROM memories_fts WHERE id = ?1", params![id])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn test_db() -> Connection {
        db::open_memory_database().unwrap()
    }

    fn tok() -> Tokenizer {
        Tokenizer::new()
    }

    fn event(conn: &Connection, tokenizer: &Tokenizer, content: &str) -> Memory {
        create_memory(
            conn,
            tokenizer,
            &NewMemory::new("default", content, MemoryType::Event),
        )
        .unwrap()
        .expect("fresh content should insert")
    }

    #[test]
    fn create_sets_type_defaults() {
        let conn = test_db();
        let tokenizer = tok();

        let m = create_memory(
            &conn,
            &tokenizer,
            &NewMemory::new("default", "I am an assistant", MemoryType::Identity),
        )
        .unwrap()
        .unwrap();

        assert_eq!(m.priority, 0);
        assert_eq!(m.stability, STABILITY_CEILING);
        assert_eq!(m.vitality, 1.0);
        assert_eq!(m.access_count, 0);
        assert!(m.last_accessed.is_none());
        assert_eq!(m.hash.len(), 16);
    }

    #[test]
    fn create_duplicate_content_is_noop() {
        let conn = test_db();
        let tokenizer = tok();

        let first = event(&conn, &tokenizer, "test dedup");
        let second = create_memory(
            &conn,
            &tokenizer,
            &NewMemory::new("default", "test dedup", MemoryType::Event),
        )
        .unwrap();

        assert!(second.is_none());
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
        assert!(get_by_hash(&conn, "default", &first.hash).unwrap().is_some());
    }

    #[test]
    fn same_content_different_agents_coexist() {
        let conn = test_db();
        let tokenizer = tok();

        event(&conn, &tokenizer, "shared wording");
        let other = create_memory(
            &conn,
            &tokenizer,
            &NewMemory::new("other", "shared wording", MemoryType::Event),
        )
        .unwrap();
        assert!(other.is_some());
    }

    #[test]
    fn create_syncs_fts() {
        let conn = test_db();
        let tokenizer = tok();

        let m = event(&conn, &tokenizer, "the quantum computer hums");
        let id: String = conn
            .query_row(
                "SELECT id FROM memories_fts WHERE memories_fts MATCH 'quantum'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(id, m.id);
    }

    #[test]
    fn create_rejects_empty_and_bad_emotion() {
        let conn = test_db();
        let tokenizer = tok();

        assert!(create_memory(
            &conn,
            &tokenizer,
            &NewMemory::new("default", "   ", MemoryType::Event)
        )
        .is_err());

        let mut input = NewMemory::new("default", "fine content", MemoryType::Event);
        input.emotion_val = 2.0;
        assert!(create_memory(&conn, &tokenizer, &input).is_err());
    }

    #[test]
    fn update_content_resyncs_fts_and_hash() {
        let conn = test_db();
        let tokenizer = tok();

        let m = event(&conn, &tokenizer, "original wording here");
        let old_hash = m.hash.clone();

        let updated = update_memory(
            &conn,
            &tokenizer,
            "default",
            &m.id,
            &MemoryUpdate::content("replacement text entirely"),
        )
        .unwrap();
        assert!(updated);

        let fresh = get_memory(&conn, "default", &m.id).unwrap().unwrap();
        assert_eq!(fresh.content, "replacement text entirely");
        assert_ne!(fresh.hash, old_hash);

        let hits: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM memories_fts WHERE memories_fts MATCH 'original'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(hits, 0);
        let hits: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM memories_fts WHERE memories_fts MATCH 'replacement'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(hits, 1);
    }

    #[test]
    fn update_wrong_agent_is_not_found() {
        let conn = test_db();
        let tokenizer = tok();

        let m = event(&conn, &tokenizer, "tenant bound");
        let updated = update_memory(
            &conn,
            &tokenizer,
            "other",
            &m.id,
            &MemoryUpdate::content("hijacked"),
        )
        .unwrap();
        assert!(!updated);
    }

    #[test]
    fn delete_removes_every_reference() {
        let conn = test_db();
        let tokenizer = tok();

        let m = event(&conn, &tokenizer, "doomed memory content");
        crate::memory::snapshots::record_snapshot(
            &conn,
            &m.id,
            &m.content,
            Some("test"),
            crate::memory::types::SnapshotAction::Create,
        )
        .unwrap();
        crate::memory::embeddings::upsert_embedding(
            &conn,
            "default",
            &m.id,
            "test-model",
            &[1.0, 0.0],
        )
        .unwrap();

        assert!(delete_memory(&conn, "default", &m.id).unwrap());

        for (table, col) in [
            ("memories", "id"),
            ("snapshots", "memory_id"),
            ("embeddings", "memory_id"),
            ("memories_fts", "id"),
        ] {
            let count: i64 = conn
                .query_row(
                    &format!("SELECT COUNT(*) FROM {table} WHERE {col} = ?1"),
                    params![m.id],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(count, 0, "{table} still references the deleted memory");
        }
    }

    #[test]
    fn record_access_is_monotonic() {
        let conn = test_db();
        let tokenizer = tok();

        let m = event(&conn, &tokenizer, "recallable fact");
        conn.execute(
            "UPDATE memories SET vitality = 0.5, stability = 14.0 WHERE id = ?1",
            params![m.id],
        )
        .unwrap();

        assert!(record_access(&conn, "default", &m.id, 1.5).unwrap());

        let fresh = get_memory(&conn, "default", &m.id).unwrap().unwrap();
        assert_eq!(fresh.access_count, 1);
        assert!((fresh.stability - 21.0).abs() < 1e-9);
        assert!((fresh.vitality - 0.6).abs() < 1e-9);
        assert!(fresh.last_accessed.is_some());

        // Repeated access keeps climbing but stays capped
        for _ in 0..50 {
            record_access(&conn, "default", &m.id, 1.5).unwrap();
        }
        let fresh = get_memory(&conn, "default", &m.id).unwrap().unwrap();
        assert!(fresh.vitality <= 1.0);
        assert!(fresh.stability <= STABILITY_CEILING);
        assert_eq!(fresh.access_count, 51);
    }

    #[test]
    fn list_filters_and_orders() {
        let conn = test_db();
        let tokenizer = tok();

        create_memory(
            &conn,
            &tokenizer,
            &NewMemory::new("default", "identity fact", MemoryType::Identity),
        )
        .unwrap();
        event(&conn, &tokenizer, "an event happened");
        create_memory(
            &conn,
            &tokenizer,
            &NewMemory::new("other", "other tenant memory", MemoryType::Event),
        )
        .unwrap();

        let all = list_memories(&conn, "default", &ListFilter::default()).unwrap();
        assert_eq!(all.len(), 2);
        // priority ASC puts identity first
        assert_eq!(all[0].memory_type, MemoryType::Identity);

        let events = list_memories(
            &conn,
            "default",
            &ListFilter {
                memory_type: Some(MemoryType::Event),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(events.len(), 1);

        let vital = list_memories(
            &conn,
            "default",
            &ListFilter {
                min_vitality: Some(0.5),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(vital.len(), 2);
    }
}
