//! Query history commands: `docqa queries recent|get|stats`.

use anyhow::{bail, Result};
use docqa_core::store::QueryStore;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

pub async fn run_recent(config: &Config, owner: &str, limit: usize) -> Result<()> {
    let store = SqliteStore::new(db::connect(config).await?);
    let recent = store.recent_queries(owner, limit).await?;

    if recent.is_empty() {
        println!("No queries.");
    }
    for q in &recent {
        let confidence = q
            .confidence
            .map(|c| format!("{:.2}", c))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {:<10}  {:>4}  {}",
            q.id, q.status, confidence, q.query_text
        );
    }

    store.pool().close().await;
    Ok(())
}

pub async fn run_get(config: &Config, owner: &str, id: &str) -> Result<()> {
    let store = SqliteStore::new(db::connect(config).await?);
    let record = store.get_query(id).await?;
    if record.query.owner_id != owner {
        bail!("not found: query {}", id);
    }

    let query = &record.query;
    println!("--- query ---");
    println!("id: {}", query.id);
    println!("query: {}", query.query_text);
    if let Some(context) = &query.context {
        println!("context: {}", context);
    }
    println!("status: {}", query.status);
    if let Some(reason) = &query.failure_reason {
        println!("failure: {}", reason);
    }
    println!("created: {}", query.created_at.to_rfc3339());

    if let Some(result) = &record.result {
        println!("--- result ---");
        println!("confidence: {:.2}", result.confidence);
        println!("model: {}", result.metadata.model_used);
        println!("time: {} ms", result.metadata.processing_time_ms);
        println!(
            "chunks: {} in prompt of {} retrieved",
            result.metadata.chunks_considered, result.metadata.chunks_retrieved
        );
        for cited in &result.cited_chunks {
            println!(
                "  {}. {} (chunk {})",
                cited.rank, cited.document_name, cited.chunk_index
            );
        }
        println!();
        println!("{}", result.answer);
    }

    store.pool().close().await;
    Ok(())
}

pub async fn run_stats(config: &Config, owner: &str) -> Result<()> {
    let store = SqliteStore::new(db::connect(config).await?);
    let stats = store.query_stats(owner).await?;

    println!("total queries: {}", stats.total_queries);
    println!("completed: {}", stats.completed_queries);
    println!("failed: {}", stats.failed_queries);
    match stats.avg_confidence {
        Some(avg) => println!("average confidence: {:.2}", avg),
        None => println!("average confidence: -"),
    }
    match stats.last_query_time {
        Some(t) => println!("last query: {}", t.to_rfc3339()),
        None => println!("last query: -"),
    }

    store.pool().close().await;
    Ok(())
}
