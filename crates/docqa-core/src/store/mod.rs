//! Persistence contracts for docqa.
//!
//! [`DocumentStore`] covers documents and their chunks; [`QueryStore`]
//! covers queries and their results. Both are async (via `async-trait`) so
//! the SQLite backend in the app crate and the in-memory backend here share
//! one interface.
//!
//! Implementations must be `Send + Sync` and must uphold:
//!
//! - a document has chunks if and only if it is `processed`;
//! - [`append_chunks`](DocumentStore::append_chunks) is all-or-nothing, and
//!   a failed append leaves the document `failed` with zero chunks;
//! - [`delete_document`](DocumentStore::delete_document) removes the
//!   document and its chunks in one step;
//! - [`complete_query`](QueryStore::complete_query) stores the result and
//!   marks the query `completed` in one step.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`create_document`](DocumentStore::create_document) | Allocate a document in `uploaded` |
//! | [`mark_processing`](DocumentStore::mark_processing) | `uploaded → processing` |
//! | [`mark_failed`](DocumentStore::mark_failed) | Record a failure |
//! | [`append_chunks`](DocumentStore::append_chunks) | Persist the full chunk set |
//! | [`get_document`](DocumentStore::get_document) | Fetch one document |
//! | [`get_chunks`](DocumentStore::get_chunks) | Chunks of a document, by index |
//! | [`list_by_owner`](DocumentStore::list_by_owner) | Owner's documents, newest first |
//! | [`delete_document`](DocumentStore::delete_document) | Remove document and chunks |
//! | [`candidate_chunks`](DocumentStore::candidate_chunks) | Ranker input for an owner |

pub mod memory;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{
    CandidateChunk, Chunk, Document, NewDocument, NewQuery, Query, QueryRecord, QueryResult,
    QueryStats, QuerySummary,
};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Allocate a new document in `uploaded` status.
    async fn create_document(&self, doc: &NewDocument) -> StoreResult<Document>;

    async fn mark_processing(&self, id: &str) -> StoreResult<()>;

    /// Move the document to `failed` with `reason`.
    ///
    /// Calling it again is harmless. A `processed` document keeps its
    /// status and chunks. A failed document keeps no staged upload, so its
    /// storage location is cleared.
    async fn mark_failed(&self, id: &str, reason: &str) -> StoreResult<()>;

    /// Persist `chunks` as the document's complete chunk set and mark it
    /// `processed`.
    ///
    /// `chunks` must be non-empty with indices `0..n`. On any failure no
    /// chunk is visible and the document is `failed`.
    async fn append_chunks(&self, id: &str, chunks: &[Chunk]) -> StoreResult<()>;

    async fn get_document(&self, id: &str) -> StoreResult<Document>;

    async fn get_chunks(&self, id: &str) -> StoreResult<Vec<Chunk>>;

    async fn list_by_owner(
        &self,
        owner_id: &str,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<Document>>;

    /// Remove the document and all its chunks, returning the last snapshot
    /// with status `deleted`. The caller releases any staged file named in
    /// `storage_location`.
    async fn delete_document(&self, id: &str) -> StoreResult<Document>;

    /// Every chunk of the owner's `processed` documents.
    async fn candidate_chunks(&self, owner_id: &str) -> StoreResult<Vec<CandidateChunk>>;
}

#[async_trait]
pub trait QueryStore: Send + Sync {
    /// Record a new query in `processing` status.
    async fn create_query(&self, query: &NewQuery) -> StoreResult<Query>;

    /// Store `result` and mark its query `completed`.
    ///
    /// Fails if the query is not `processing`.
    async fn complete_query(&self, result: &QueryResult) -> StoreResult<()>;

    async fn fail_query(&self, id: &str, reason: &str) -> StoreResult<()>;

    async fn get_query(&self, id: &str) -> StoreResult<QueryRecord>;

    /// The owner's most recent queries, newest first.
    async fn recent_queries(&self, owner_id: &str, limit: usize)
        -> StoreResult<Vec<QuerySummary>>;

    async fn query_stats(&self, owner_id: &str) -> StoreResult<QueryStats>;
}

/// Check that `chunks` is a non-empty, gap-free run of indices from 0 with
/// non-blank content, all belonging to `document_id`.
pub fn validate_chunk_set(document_id: &str, chunks: &[Chunk]) -> StoreResult<()> {
    if chunks.is_empty() {
        return Err(StoreError::StorageFailure(format!(
            "empty chunk set for document {}",
            document_id
        )));
    }
    for (i, chunk) in chunks.iter().enumerate() {
        if chunk.chunk_index != i as i64 {
            return Err(StoreError::StorageFailure(format!(
                "chunk index {} at position {} of document {}",
                chunk.chunk_index, i, document_id
            )));
        }
        if chunk.document_id != document_id {
            return Err(StoreError::StorageFailure(format!(
                "chunk {} belongs to document {}",
                chunk.id, chunk.document_id
            )));
        }
        if chunk.content.trim().is_empty() {
            return Err(StoreError::StorageFailure(format!(
                "chunk {} of document {} is blank",
                chunk.chunk_index, document_id
            )));
        }
    }
    Ok(())
}
