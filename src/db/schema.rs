//! SQL DDL for all hypnos tables.
//!
//! Defines the `memories`, `paths`, `links`, `snapshots`, `embeddings`,
//! `schema_meta` tables and the `memories_fts` FTS5 mirror. All DDL uses
//! `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

/// All schema DDL statements for the current (v3) layout.
const SCHEMA_SQL: &str = r#"
-- Core memory storage
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL DEFAULT 'default',
    content TEXT NOT NULL,
    type TEXT NOT NULL CHECK(type IN ('identity','emotion','knowledge','event')),
    priority INTEGER NOT NULL CHECK(priority BETWEEN 0 AND 3),
    emotion_val REAL NOT NULL DEFAULT 0.0 CHECK(emotion_val >= -1.0 AND emotion_val <= 1.0),
    vitality REAL NOT NULL DEFAULT 1.0 CHECK(vitality >= 0.0 AND vitality <= 1.0),
    stability REAL NOT NULL CHECK(stability > 0.0),
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    source TEXT,
    hash TEXT NOT NULL,
    UNIQUE(hash, agent_id)
);

CREATE INDEX IF NOT EXISTS idx_memories_agent ON memories(agent_id);
CREATE INDEX IF NOT EXISTS idx_memories_type ON memories(agent_id, type);
CREATE INDEX IF NOT EXISTS idx_memories_priority ON memories(agent_id, priority);
CREATE INDEX IF NOT EXISTS idx_memories_vitality ON memories(agent_id, vitality);

-- URI anchors onto memories
CREATE TABLE IF NOT EXISTS paths (
    id TEXT PRIMARY KEY,
    memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    agent_id TEXT NOT NULL DEFAULT 'default',
    uri TEXT NOT NULL,
    alias TEXT,
    domain TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(agent_id, uri)
);

CREATE INDEX IF NOT EXISTS idx_paths_memory ON paths(memory_id);

-- Directed typed edges between memories of one agent
CREATE TABLE IF NOT EXISTS links (
    agent_id TEXT NOT NULL DEFAULT 'default',
    source_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    target_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    relation TEXT NOT NULL CHECK(relation IN ('related','caused','reminds','evolved','contradicts')),
    weight REAL NOT NULL DEFAULT 1.0,
    created_at TEXT NOT NULL,
    PRIMARY KEY (agent_id, source_id, target_id)
);

CREATE INDEX IF NOT EXISTS idx_links_source ON links(source_id);
CREATE INDEX IF NOT EXISTS idx_links_target ON links(target_id);

-- Append-only prior-state history. No FK to memories: a delete tombstone
-- must survive the deletion it records.
CREATE TABLE IF NOT EXISTS snapshots (
    id TEXT PRIMARY KEY,
    memory_id TEXT NOT NULL,
    content TEXT NOT NULL,
    changed_by TEXT,
    action TEXT NOT NULL CHECK(action IN ('create','update','delete','merge')),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_snapshots_memory ON snapshots(memory_id, created_at);

-- Dense vectors, one row per (agent, memory, model)
CREATE TABLE IF NOT EXISTS embeddings (
    agent_id TEXT NOT NULL,
    memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    model TEXT NOT NULL,
    dim INTEGER NOT NULL,
    vector BLOB NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (agent_id, memory_id, model)
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// The FTS5 mirror stores pre-segmented token text, not raw content, so the
/// unicode61 tokenizer sees CJK words the engine already split.
const FTS_SQL: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    id UNINDEXED,
    content,
    tokenize = 'unicode61'
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute_batch(FTS_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        for expected in ["memories", "paths", "links", "snapshots", "embeddings", "schema_meta"] {
            assert!(tables.contains(&expected.to_string()), "missing table {expected}");
        }

        // FTS virtual table answers queries
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM memories_fts", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap(); // second call should not error
    }

    #[test]
    fn link_relation_is_constrained() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        conn.execute(
            "INSERT INTO memories (id, agent_id, content, type, priority, stability, created_at, updated_at, hash) \
             VALUES ('m1', 'default', 'a', 'event', 3, 14.0, '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z', 'h1'), \
                    ('m2', 'default', 'b', 'event', 3, 14.0, '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z', 'h2')",
            [],
        )
        .unwrap();

        let err = conn.execute(
            "INSERT INTO links (agent_id, source_id, target_id, relation, created_at) \
             VALUES ('default', 'm1', 'm2', 'bogus', '2026-01-01T00:00:00Z')",
            [],
        );
        assert!(err.is_err());
    }
}
