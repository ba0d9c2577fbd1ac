//! Document management commands.
//!
//! `docqa documents list|get|delete`. Each command is scoped to the
//! `--owner` identity; another owner's document is reported as not found.

use anyhow::{bail, Result};
use docqa_core::models::Document;
use docqa_core::store::DocumentStore;

use crate::config::Config;
use crate::db;
use crate::ingest;
use crate::sqlite_store::SqliteStore;

async fn open_store(config: &Config) -> Result<SqliteStore> {
    Ok(SqliteStore::new(db::connect(config).await?))
}

async fn owned_document(store: &SqliteStore, owner: &str, id: &str) -> Result<Document> {
    let doc = store.get_document(id).await?;
    if doc.owner_id != owner {
        bail!("not found: document {}", id);
    }
    Ok(doc)
}

pub async fn run_list(config: &Config, owner: &str, limit: usize, offset: usize) -> Result<()> {
    let store = open_store(config).await?;
    let docs = store.list_by_owner(owner, limit, offset).await?;

    if docs.is_empty() {
        println!("No documents.");
    } else {
        println!(
            "{:<36}  {:<10}  {:>6}  {:>10}  FILENAME",
            "ID", "STATUS", "CHUNKS", "BYTES"
        );
        for doc in &docs {
            println!(
                "{:<36}  {:<10}  {:>6}  {:>10}  {}",
                doc.id, doc.status, doc.chunk_count, doc.size_bytes, doc.filename
            );
        }
    }

    store.pool().close().await;
    Ok(())
}

pub async fn run_get(config: &Config, owner: &str, id: &str) -> Result<()> {
    let store = open_store(config).await?;
    let doc = owned_document(&store, owner, id).await?;
    let chunks = store.get_chunks(id).await?;

    println!("--- document ---");
    println!("id: {}", doc.id);
    println!("filename: {}", doc.filename);
    println!("format: {}", doc.format);
    println!("size: {} bytes", doc.size_bytes);
    println!("status: {}", doc.status);
    if let Some(reason) = &doc.failure_reason {
        println!("failure: {}", reason);
    }
    println!("created: {}", doc.created_at.to_rfc3339());
    println!("updated: {}", doc.updated_at.to_rfc3339());
    println!("chunks: {}", chunks.len());
    for chunk in &chunks {
        let preview: String = chunk.content.chars().take(80).collect();
        println!("  [{}] {}", chunk.chunk_index, preview.replace('\n', " "));
    }

    store.pool().close().await;
    Ok(())
}

pub async fn run_delete(config: &Config, owner: &str, id: &str) -> Result<()> {
    let store = open_store(config).await?;
    owned_document(&store, owner, id).await?;
    let doc = ingest::delete_document(&store, id).await?;
    println!("Deleted document {} ({})", doc.id, doc.filename);
    store.pool().close().await;
    Ok(())
}
