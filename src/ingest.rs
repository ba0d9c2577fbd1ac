//! Ingestion pipeline orchestration.
//!
//! Coordinates one upload end to end: validation → document creation →
//! extraction → chunking → atomic chunk append. Any failure after the
//! document exists leaves it `failed` with the reason recorded; validation
//! failures (unsupported extension, oversize payload) happen before a
//! document is created.

use std::path::Path;

use anyhow::Context;
use docqa_core::chunk::Chunker;
use docqa_core::error::{Error, ExtractError, Result};
use docqa_core::models::{Document, DocumentFormat, NewDocument};
use docqa_core::store::DocumentStore;

use crate::config::Config;
use crate::db;
use crate::extract;
use crate::sqlite_store::SqliteStore;
use crate::upload::{self, StagedUpload};

/// One document to ingest.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub owner_id: String,
    pub filename: String,
    pub bytes: Vec<u8>,
    pub storage_location: Option<String>,
}

/// What a successful ingestion produced.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IngestOutcome {
    pub document: Document,
    /// Length of the extracted text in characters.
    pub text_chars: usize,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct IngestPipeline {
    chunker: Chunker,
    max_upload_bytes: u64,
}

impl IngestPipeline {
    pub fn new(chunker: Chunker, max_upload_bytes: u64) -> Self {
        Self {
            chunker,
            max_upload_bytes,
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let chunk_config = config.chunking.to_chunk_config()?;
        Ok(Self::new(
            Chunker::new(chunk_config),
            config.ingest.max_upload_bytes,
        ))
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    /// Check an upload before anything is staged or stored.
    pub fn validate(&self, owner_id: &str, filename: &str, size: u64) -> Result<DocumentFormat> {
        if owner_id.trim().is_empty() {
            return Err(Error::InvalidInput("owner id must not be empty".to_string()));
        }
        if filename.trim().is_empty() {
            return Err(Error::InvalidInput("filename must not be empty".to_string()));
        }
        let format = DocumentFormat::from_filename(filename)?;
        if size > self.max_upload_bytes {
            return Err(Error::PayloadTooLarge {
                size,
                max: self.max_upload_bytes,
            });
        }
        Ok(format)
    }

    /// Ingest one document into `store`.
    pub async fn ingest<S>(&self, store: &S, request: IngestRequest) -> Result<IngestOutcome>
    where
        S: DocumentStore + ?Sized,
    {
        let format = self.validate(
            &request.owner_id,
            &request.filename,
            request.bytes.len() as u64,
        )?;

        let doc = store
            .create_document(&NewDocument {
                owner_id: request.owner_id.clone(),
                filename: request.filename.clone(),
                format,
                size_bytes: request.bytes.len() as u64,
                storage_location: request.storage_location.clone(),
            })
            .await?;
        tracing::info!(
            document_id = %doc.id,
            filename = %doc.filename,
            format = %format,
            size = doc.size_bytes,
            "document created"
        );

        match self.process(store, &doc.id, format, request.bytes).await {
            Ok((text_chars, chunk_count)) => {
                let document = store.get_document(&doc.id).await?;
                tracing::info!(document_id = %doc.id, chunks = chunk_count, "document processed");
                Ok(IngestOutcome {
                    document,
                    text_chars,
                    chunk_count,
                })
            }
            Err(e) => {
                tracing::warn!(document_id = %doc.id, error = %e, "ingestion failed");
                if let Err(mark_err) = store.mark_failed(&doc.id, &e.to_string()).await {
                    tracing::error!(document_id = %doc.id, error = %mark_err, "could not mark document failed");
                }
                Err(e)
            }
        }
    }

    async fn process<S>(
        &self,
        store: &S,
        document_id: &str,
        format: DocumentFormat,
        bytes: Vec<u8>,
    ) -> Result<(usize, usize)>
    where
        S: DocumentStore + ?Sized,
    {
        store.mark_processing(document_id).await?;

        let text = tokio::task::spawn_blocking(move || extract::extract_text(&bytes, format))
            .await
            .map_err(|e| ExtractError::ExtractionFailure {
                format,
                message: e.to_string(),
            })??;
        let text_chars = text.chars().count();

        let chunks = self.chunker.chunk_document(document_id, &text);
        if chunks.is_empty() {
            return Err(ExtractError::EmptyExtraction.into());
        }
        store.append_chunks(document_id, &chunks).await?;
        Ok((text_chars, chunks.len()))
    }
}

/// Delete a document and release its staged upload.
pub async fn delete_document<S>(store: &S, document_id: &str) -> Result<Document>
where
    S: DocumentStore + ?Sized,
{
    let doc = store.delete_document(document_id).await?;
    if let Some(location) = &doc.storage_location {
        if let Err(e) = upload::release(location).await {
            tracing::warn!(document_id, location = %location, error = %e, "could not release staged upload");
        }
    }
    tracing::info!(document_id, "document deleted");
    Ok(doc)
}

/// Stage `bytes`, ingest them, and keep the staged file only on success.
pub async fn ingest_staged<S>(
    pipeline: &IngestPipeline,
    store: &S,
    upload_dir: &Path,
    owner_id: &str,
    filename: &str,
    bytes: Vec<u8>,
) -> Result<IngestOutcome>
where
    S: DocumentStore + ?Sized,
{
    pipeline.validate(owner_id, filename, bytes.len() as u64)?;

    let staged = StagedUpload::write(upload_dir, filename, &bytes)
        .await
        .map_err(|e| docqa_core::error::StoreError::StorageFailure(e.to_string()))?;
    let outcome = pipeline
        .ingest(
            store,
            IngestRequest {
                owner_id: owner_id.to_string(),
                filename: filename.to_string(),
                bytes,
                storage_location: Some(staged.location()),
            },
        )
        .await?;
    staged.keep();
    Ok(outcome)
}

/// `docqa ingest <file> --owner <id>`.
pub async fn run_ingest(config: &Config, path: &Path, owner: &str) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Invalid file name: {}", path.display()))?
        .to_string();

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let pipeline = IngestPipeline::from_config(config)?;

    let outcome = ingest_staged(
        &pipeline,
        &store,
        &config.ingest.upload_dir,
        owner,
        &filename,
        bytes,
    )
    .await?;

    println!("ingest {}", filename);
    println!("  document: {}", outcome.document.id);
    println!("  status: {}", outcome.document.status);
    println!("  text length: {} chars", outcome.text_chars);
    println!("  chunks: {}", outcome.chunk_count);

    store.pool().close().await;
    Ok(())
}
