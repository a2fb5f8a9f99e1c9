//! CLI `status` command — store statistics for the bound agent.

use anyhow::Result;

use crate::config::HypnosConfig;
use crate::memory::stats;

pub fn status(config: &HypnosConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = crate::db::open_database(&db_path)?;

    let model = if config.embeddings.provider == "none" || config.embeddings.provider.is_empty() {
        None
    } else {
        Some(config.embeddings.model.as_str()).filter(|m| !m.is_empty())
    };

    let response = stats::status(
        &conn,
        &config.storage.agent_id,
        Some(db_path.as_path()),
        model,
    )?;

    println!("agent: {}", config.storage.agent_id);
    println!("memories: {}", response.total_memories);
    for key in ["identity", "emotion", "knowledge", "event"] {
        println!("  {key}: {}", response.by_type.get(key).copied().unwrap_or(0));
    }
    println!("paths: {}", response.paths);
    println!("links: {}", response.links);
    println!("snapshots: {}", response.snapshots);
    println!("low vitality (< 0.05): {}", response.low_vitality);
    println!("db size: {} bytes", response.db_size_bytes);
    if let Some((with, without)) = response.embedding_coverage {
        println!("embedding coverage: {with} embedded, {without} missing");
    }

    let health = crate::db::check_database_health(&conn)?;
    println!(
        "schema v{}, integrity {}",
        health.schema_version,
        if health.integrity_ok { "ok" } else { &health.integrity_details }
    );

    Ok(())
}
