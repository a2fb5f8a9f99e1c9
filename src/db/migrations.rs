//! Forward-only schema migration framework.
//!
//! Tracks the schema version in `schema_meta` and runs sequential migrations
//! to bring the database up to [`CURRENT_SCHEMA_VERSION`]. Stores created
//! before version tracking existed are recognized structurally: a `paths`
//! table without an `agent_id` column is v1, a store without an `embeddings`
//! table is v2.

use rusqlite::Connection;

/// The schema version that the current binary expects.
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

/// Get the recorded schema version, if any.
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<Option<u32>> {
    match conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'version'",
        [],
        |row| row.get::<_, String>(0),
    ) {
        Ok(val) => Ok(val.parse::<u32>().ok()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

fn set_schema_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_meta (key, value) VALUES ('version', ?1)",
        [version.to_string()],
    )?;
    Ok(())
}

/// Check whether a table has a given column via pragma table_info.
fn has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let cols: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cols.iter().any(|c| c == column))
}

fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table','view') AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Infer the schema version of a store with no recorded version row.
fn infer_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    if !has_column(conn, "paths", "agent_id")? {
        return Ok(1);
    }
    if !table_exists(conn, "embeddings")? {
        return Ok(2);
    }
    Ok(CURRENT_SCHEMA_VERSION)
}

/// Run any pending forward-only migrations.
///
/// Each migration runs in its own transaction with foreign keys relaxed, and
/// updates the version row inside the same transaction as the table rewrites.
/// A failed migration rolls back and leaves the store at the prior version.
pub fn run_migrations(conn: &mut Connection) -> rusqlite::Result<()> {
    let mut version = match get_schema_version(conn)? {
        Some(v) => v,
        None => {
            let inferred = infer_schema_version(conn)?;
            tracing::debug!(inferred, "no version row, inferred structurally");
            inferred
        }
    };

    if version >= CURRENT_SCHEMA_VERSION {
        set_schema_version(conn, version)?;
        return Ok(());
    }

    // Table rewrites need FK enforcement off; pragma changes are a no-op
    // inside an open transaction, so toggle around each one.
    conn.pragma_update(None, "foreign_keys", "OFF")?;
    let result = (|| {
        while version < CURRENT_SCHEMA_VERSION {
            let next = version + 1;
            tracing::info!(from = version, to = next, "running migration");

            let tx = conn.transaction()?;
            match next {
                2 => migrate_v1_to_v2(&tx)?,
                3 => migrate_v2_to_v3(&tx)?,
                _ => unreachable!("no migration to version {next}"),
            }
            set_schema_version(&tx, next)?;
            tx.commit()?;

            version = next;
        }
        Ok(())
    })();
    conn.pragma_update(None, "foreign_keys", "ON")?;
    result
}

/// Migration v1 → v2: rebuild `paths` and `links` so each row carries an
/// `agent_id`, derived from the owning memory (paths) or the source endpoint
/// (links). Links whose endpoints disagree on tenant are dropped — cross-agent
/// edges are no longer representable. Path uniqueness becomes `(agent_id, uri)`.
fn migrate_v1_to_v2(tx: &Connection) -> rusqlite::Result<()> {
    tx.execute_batch(
        r#"
        CREATE TABLE paths_v2 (
            id TEXT PRIMARY KEY,
            memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
            agent_id TEXT NOT NULL DEFAULT 'default',
            uri TEXT NOT NULL,
            alias TEXT,
            domain TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(agent_id, uri)
        );

        INSERT OR IGNORE INTO paths_v2 (id, memory_id, agent_id, uri, alias, domain, created_at)
        SELECT p.id, p.memory_id, COALESCE(m.agent_id, 'default'), p.uri, p.alias, p.domain, p.created_at
        FROM paths p
        LEFT JOIN memories m ON m.id = p.memory_id;

        DROP TABLE paths;
        ALTER TABLE paths_v2 RENAME TO paths;
        CREATE INDEX IF NOT EXISTS idx_paths_memory ON paths(memory_id);

        CREATE TABLE links_v2 (
            agent_id TEXT NOT NULL DEFAULT 'default',
            source_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
            target_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
            relation TEXT NOT NULL CHECK(relation IN ('related','caused','reminds','evolved','contradicts')),
            weight REAL NOT NULL DEFAULT 1.0,
            created_at TEXT NOT NULL,
            PRIMARY KEY (agent_id, source_id, target_id)
        );

        INSERT OR IGNORE INTO links_v2 (agent_id, source_id, target_id, relation, weight, created_at)
        SELECT ms.agent_id, l.source_id, l.target_id, l.relation, l.weight, l.created_at
        FROM links l
        JOIN memories ms ON ms.id = l.source_id
        JOIN memories mt ON mt.id = l.target_id
        WHERE ms.agent_id = mt.agent_id;

        DROP TABLE links;
        ALTER TABLE links_v2 RENAME TO links;
        CREATE INDEX IF NOT EXISTS idx_links_source ON links(source_id);
        CREATE INDEX IF NOT EXISTS idx_links_target ON links(target_id);
        "#,
    )?;
    Ok(())
}

/// Migration v2 → v3: additively create the `embeddings` table. No data rewrite.
fn migrate_v2_to_v3(tx: &Connection) -> rusqlite::Result<()> {
    tx.execute_batch(
        r#"
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
        "#,
    )?;
    Ok(())
}
