use hypnos::db::{migrations, schema};
use rusqlite::{params, Connection};

/// Build a v1-layout store by hand: `paths` keyed on bare `uri`, `links`
/// without `agent_id`, no `embeddings`, no version row.
fn v1_store() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        r#"
        CREATE TABLE memories (
            id TEXT PRIMARY KEY,
            agent_id TEXT NOT NULL DEFAULT 'default',
            content TEXT NOT NULL,
            type TEXT NOT NULL,
            priority INTEGER NOT NULL,
            emotion_val REAL NOT NULL DEFAULT 0.0,
            vitality REAL NOT NULL DEFAULT 1.0,
            stability REAL NOT NULL,
            access_count INTEGER NOT NULL DEFAULT 0,
            last_accessed TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            source TEXT,
            hash TEXT NOT NULL,
            UNIQUE(hash, agent_id)
        );

        CREATE TABLE paths (
            id TEXT PRIMARY KEY,
            memory_id TEXT NOT NULL,
            uri TEXT NOT NULL UNIQUE,
            alias TEXT,
            domain TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE links (
            source_id TEXT NOT NULL,
            target_id TEXT NOT NULL,
            relation TEXT NOT NULL,
            weight REAL NOT NULL DEFAULT 1.0,
            created_at TEXT NOT NULL,
            PRIMARY KEY (source_id, target_id)
        );
        "#,
    )
    .unwrap();

    let now = "2026-01-01T00:00:00Z";
    for (id, agent, content, hash) in [
        ("ma", "a", "memory in tenant a", "ha"),
        ("mb", "b", "memory in tenant b", "hb"),
        ("mc", "a", "second memory tenant a", "hc"),
    ] {
        conn.execute(
            "INSERT INTO memories (id, agent_id, content, type, priority, stability, created_at, updated_at, hash) \
             VALUES (?1, ?2, ?3, 'knowledge', 2, 90.0, ?4, ?4, ?5)",
            params![id, agent, content, now, hash],
        )
        .unwrap();
    }

    conn.execute(
        "INSERT INTO paths (id, memory_id, uri, domain, created_at) \
         VALUES ('p1', 'ma', 'knowledge://shared', 'knowledge', ?1), \
                ('p2', 'orphan-memory', 'knowledge://orphaned', 'knowledge', ?1)",
        params![now],
    )
    .unwrap();

    // One same-tenant link and one cross-agent link (a → b)
    conn.execute(
        "INSERT INTO links (source_id, target_id, relation, created_at) \
         VALUES ('ma', 'mc', 'related', ?1), ('ma', 'mb', 'related', ?1)",
        params![now],
    )
    .unwrap();

    conn
}

fn open_legacy(mut conn: Connection) -> Connection {
    schema::init_schema(&conn).unwrap();
    migrations::run_migrations(&mut conn).unwrap();
    conn
}

#[test]
fn v1_store_migrates_to_current_version() {
    let conn = open_legacy(v1_store());
    assert_eq!(
        migrations::get_schema_version(&conn).unwrap(),
        Some(migrations::CURRENT_SCHEMA_VERSION)
    );
}

#[test]
fn paths_and_links_gain_agent_id() {
    let conn = open_legacy(v1_store());

    let path_agent: String = conn
        .query_row("SELECT agent_id FROM paths WHERE id = 'p1'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(path_agent, "a", "path tenant derived from owning memory");

    let orphan_agent: String = conn
        .query_row("SELECT agent_id FROM paths WHERE id = 'p2'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(orphan_agent, "default", "orphan paths fall back to default");

    let link_agent: String = conn
        .query_row(
            "SELECT agent_id FROM links WHERE source_id = 'ma' AND target_id = 'mc'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(link_agent, "a", "link tenant derived from source endpoint");
}

#[test]
fn cross_agent_links_are_dropped() {
    let conn = open_legacy(v1_store());

    let survivors: i64 = conn
        .query_row("SELECT COUNT(*) FROM links", [], |r| r.get(0))
        .unwrap();
    assert_eq!(survivors, 1, "only the same-tenant edge survives");

    let cross: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM links WHERE source_id = 'ma' AND target_id = 'mb'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(cross, 0);
}

#[test]
fn same_uri_allowed_once_per_tenant_after_migration() {
    let conn = open_legacy(v1_store());

    // Tenant b can now claim the URI tenant a already holds
    conn.execute(
        "INSERT INTO paths (id, memory_id, agent_id, uri, domain, created_at) \
         VALUES ('p3', 'mb', 'b', 'knowledge://shared', 'knowledge', '2026-01-01T00:00:00Z')",
        [],
    )
    .unwrap();

    // But a second claim inside the same tenant still violates uniqueness
    let duplicate = conn.execute(
        "INSERT INTO paths (id, memory_id, agent_id, uri, domain, created_at) \
         VALUES ('p4', 'mc', 'a', 'knowledge://shared', 'knowledge', '2026-01-01T00:00:00Z')",
        [],
    );
    assert!(duplicate.is_err());
}

#[test]
fn embeddings_table_exists_after_migration() {
    let conn = open_legacy(v1_store());
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM embeddings", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn reopening_a_migrated_store_changes_nothing() {
    let mut conn = open_legacy(v1_store());

    let tables_before: Vec<String> = conn
        .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
        .unwrap()
        .query_map([], |r| r.get(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let links_before: i64 = conn
        .query_row("SELECT COUNT(*) FROM links", [], |r| r.get(0))
        .unwrap();

    schema::init_schema(&conn).unwrap();
    migrations::run_migrations(&mut conn).unwrap();

    let tables_after: Vec<String> = conn
        .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
        .unwrap()
        .query_map([], |r| r.get(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let links_after: i64 = conn
        .query_row("SELECT COUNT(*) FROM links", [], |r| r.get(0))
        .unwrap();

    assert_eq!(tables_before, tables_after);
    assert_eq!(links_before, links_after);
    assert_eq!(
        migrations::get_schema_version(&conn).unwrap(),
        Some(migrations::CURRENT_SCHEMA_VERSION)
    );
}
