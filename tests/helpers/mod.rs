#![allow(dead_code)]

use hypnos::db;
use hypnos::memory::store::{create_memory, NewMemory};
use hypnos::memory::types::{Memory, MemoryType};
use hypnos::tokenizer::Tokenizer;
use rusqlite::Connection;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    let mut conn = Connection::open_in_memory().unwrap();
    conn.pragma_update(None, "foreign_keys", "ON").unwrap();
    db::schema::init_schema(&conn).unwrap();
    db::migrations::run_migrations(&mut conn).unwrap();
    conn
}

pub fn tokenizer() -> Tokenizer {
    Tokenizer::new()
}

/// Insert a memory with the type's default priority. Returns the full record.
pub fn add_memory(
    conn: &Connection,
    tok: &Tokenizer,
    agent: &str,
    content: &str,
    memory_type: MemoryType,
) -> Memory {
    create_memory(conn, tok, &NewMemory::new(agent, content, memory_type))
        .unwrap()
        .expect("content should be fresh")
}

/// Backdate creation (and optionally last access) to simulate aging.
pub fn backdate(conn: &Connection, id: &str, days_ago: i64) {
    let old = (chrono::Utc::now() - chrono::Duration::days(days_ago)).to_rfc3339();
    conn.execute(
        "UPDATE memories SET created_at = ?1, updated_at = ?1 WHERE id = ?2",
        rusqlite::params![old, id],
    )
    .unwrap();
}

/// Force a vitality value, bypassing the engine (for threshold tests).
pub fn set_vitality(conn: &Connection, id: &str, vitality: f64) {
    conn.execute(
        "UPDATE memories SET vitality = ?1 WHERE id = ?2",
        rusqlite::params![vitality, id],
    )
    .unwrap();
}
