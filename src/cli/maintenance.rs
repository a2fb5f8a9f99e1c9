//! CLI maintenance commands — `reflect` and `reindex` for operator use.

use anyhow::Result;

use crate::config::HypnosConfig;
use crate::memory::sleep;
use crate::tokenizer::Tokenizer;

/// Run one or all sleep-cycle maintenance phases and print the counters.
pub fn reflect(config: &HypnosConfig, phase: &str) -> Result<()> {
    let db_path = config.resolved_db_path();
    let mut conn = crate::db::open_database(&db_path)?;
    let agent = config.storage.agent_id.as_str();

    let run_decay = phase == "decay" || phase == "all";
    let run_tidy = phase == "tidy" || phase == "all";
    let run_govern = phase == "govern" || phase == "all";
    if !(run_decay || run_tidy || run_govern) {
        anyhow::bail!("unknown phase: {phase} (decay, tidy, govern, all)");
    }

    if run_decay {
        let report = sleep::decay(&mut conn, Some(agent))?;
        println!(
            "decay: {} updated, {} decayed, {} below threshold",
            report.updated, report.decayed, report.below_threshold
        );
    }

    if run_tidy {
        let report = sleep::tidy(
            &mut conn,
            Some(agent),
            config.sleep.tidy_threshold,
            config.sleep.max_snapshots_per_memory,
        )?;
        println!(
            "tidy: {} archived, {} orphan paths cleaned, {} snapshots pruned",
            report.archived, report.orphans_cleaned, report.snapshots_pruned
        );
    }

    if run_govern {
        let report = sleep::govern(&mut conn, Some(agent))?;
        println!(
            "govern: {} orphan paths, {} orphan links, {} empty memories removed",
            report.orphan_paths, report.orphan_links, report.empty_memories
        );
    }

    Ok(())
}

/// Drop and rebuild the FTS index from current memory content.
pub fn reindex(config: &HypnosConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let mut conn = crate::db::open_database(&db_path)?;
    let tokenizer = Tokenizer::new();

    let count = sleep::reindex(&mut conn, &tokenizer)?;
    println!("reindexed {count} memories");
    Ok(())
}

/// Embed every memory missing a vector for the configured model.
///
/// Async because each vector comes from the embedding provider. Batches of
/// 64 until the sweep runs dry; provider errors abort with context rather
/// than looping forever.
pub async fn embed_missing(config: &HypnosConfig) -> Result<()> {
    let provider = crate::embedding::create_provider(&config.embeddings)?
        .ok_or_else(|| anyhow::anyhow!("no embeddings provider configured"))?;

    let db_path = config.resolved_db_path();
    let conn = crate::db::open_database(&db_path)?;
    let agent = config.storage.agent_id.as_str();
    let model = provider.model();

    let mut total = 0usize;
    loop {
        let batch = crate::memory::embeddings::list_missing(&conn, agent, model, 64)?;
        if batch.is_empty() {
            break;
        }
        for (memory_id, content) in &batch {
            let vector = provider.embed(content).await?;
            crate::memory::embeddings::upsert_embedding(&conn, agent, memory_id, model, &vector)?;
            total += 1;
        }
        println!("embedded {total} so far...");
    }

    println!("embedding sweep complete: {total} memories embedded with {model}");
    Ok(())
}
