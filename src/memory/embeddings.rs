//! Dense vector rows attached to memories.
//!
//! One row per `(agent_id, memory_id, model)`; vectors are packed
//! little-endian f32 blobs. Embeddings are opportunistic — their absence
//! never blocks a write or a lexical search.

use anyhow::Result;
use rusqlite::{params, Connection};

use crate::memory::{bytes_to_vector, now_rfc3339, vector_to_bytes};

/// Insert or refresh the vector for one memory under one model.
pub fn upsert_embedding(
    conn: &Connection,
    agent_id: &str,
    memory_id: &str,
    model: &str,
    vector: &[f32],
) -> Result<()> {
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO embeddings (agent_id, memory_id, model, dim, vector, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6) \
         ON CONFLICT(agent_id, memory_id, model) DO UPDATE SET \
             dim = excluded.dim, vector = excluded.vector, updated_at = excluded.updated_at",
        params![
            agent_id,
            memory_id,
            model,
            vector.len() as i64,
            vector_to_bytes(vector),
            now,
        ],
    )?;
    Ok(())
}

/// All stored vectors for `(agent_id, model)` as `(memory_id, vector)` pairs.
pub fn list_embeddings(
    conn: &Connection,
    agent_id: &str,
    model: &str,
) -> Result<Vec<(String, Vec<f32>)>> {
    let mut stmt = conn.prepare(
        "SELECT memory_id, vector FROM embeddings WHERE agent_id = ?1 AND model = ?2",
    )?;
    let rows = stmt
        .query_map(params![agent_id, model], |row| {
            let memory_id: String = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            Ok((memory_id, bytes_to_vector(&blob)))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Memories in scope with no vector for `model`, as `(id, content)` pairs.
pub fn list_missing(
    conn: &Connection,
    agent_id: &str,
    model: &str,
    limit: usize,
) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT m.id, m.content FROM memories m \
         WHERE m.agent_id = ?1 AND NOT EXISTS ( \
             SELECT 1 FROM embeddings e \
             WHERE e.agent_id = ?1 AND e.memory_id = m.id AND e.model = ?2) \
         LIMIT ?3",
    )?;
    let rows = stmt
        .query_map(params![agent_id, model, limit as i64], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Count of memories with and without a vector for `model`, as `(with, without)`.
pub fn coverage(conn: &Connection, agent_id: &str, model: &str) -> Result<(i64, i64)> {
    let with: i64 = conn.query_row(
        "SELECT COUNT(*) FROM memories m WHERE m.agent_id = ?1 AND EXISTS ( \
             SELECT 1 FROM embeddings e \
             WHERE e.agent_id = ?1 AND e.memory_id = m.id AND e.model = ?2)",
        params![agent_id, model],
        |row| row.get(0),
    )?;
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM memories WHERE agent_id = ?1",
        params![agent_id],
        |row| row.get(0),
    )?;
    Ok((with, total - with))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::memory::store::{create_memory, NewMemory};
    use crate::memory::types::MemoryType;
    use crate::tokenizer::Tokenizer;

    fn setup() -> (Connection, Tokenizer) {
        (db::open_memory_database().unwrap(), Tokenizer::new())
    }

    fn mem(conn: &Connection, tokenizer: &Tokenizer, content: &str) -> String {
        create_memory(conn, tokenizer, &NewMemory::new("default", content, MemoryType::Knowledge))
            .unwrap()
            .unwrap()
            .id
    }

    #[test]
    fn upsert_then_list_round_trips() {
        let (conn, tokenizer) = setup();
        let id = mem(&conn, &tokenizer, "vectorized content");

        upsert_embedding(&conn, "default", &id, "model-a", &[0.1, 0.2, 0.3]).unwrap();
        let rows = list_embeddings(&conn, "default", "model-a").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, id);
        assert_eq!(rows[0].1, vec![0.1, 0.2, 0.3]);

        // Second upsert replaces, not duplicates
        upsert_embedding(&conn, "default", &id, "model-a", &[0.9, 0.8]).unwrap();
        let rows = list_embeddings(&conn, "default", "model-a").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1, vec![0.9, 0.8]);
    }

    #[test]
    fn one_row_per_model() {
        let (conn, tokenizer) = setup();
        let id = mem(&conn, &tokenizer, "multi model content");

        upsert_embedding(&conn, "default", &id, "model-a", &[1.0]).unwrap();
        upsert_embedding(&conn, "default", &id, "model-b", &[2.0]).unwrap();

        assert_eq!(list_embeddings(&conn, "default", "model-a").unwrap().len(), 1);
        assert_eq!(list_embeddings(&conn, "default", "model-b").unwrap().len(), 1);
    }

    #[test]
    fn missing_sweep_finds_unembedded() {
        let (conn, tokenizer) = setup();
        let a = mem(&conn, &tokenizer, "embedded already");
        let b = mem(&conn, &tokenizer, "still waiting");

        upsert_embedding(&conn, "default", &a, "model-a", &[1.0]).unwrap();

        let missing = list_missing(&conn, "default", "model-a", 10).unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].0, b);

        let (with, without) = coverage(&conn, "default", "model-a").unwrap();
        assert_eq!((with, without), (1, 1));
    }

    #[test]
    fn embeddings_cascade_on_memory_delete() {
        let (conn, tokenizer) = setup();
        let id = mem(&conn, &tokenizer, "cascading vector");
        upsert_embedding(&conn, "default", &id, "model-a", &[1.0]).unwrap();

        crate::memory::store::delete_memory(&conn, "default", &id).unwrap();

        assert!(list_embeddings(&conn, "default", "model-a").unwrap().is_empty());
    }
}
