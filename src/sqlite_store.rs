//! SQLite-backed [`DocumentStore`] and [`QueryStore`].
//!
//! Timestamps are stored as Unix milliseconds. Listings are newest first,
//! with `rowid` breaking ties between rows created in the same millisecond.
//! Chunk appends, document deletes, and query completion each run in one
//! transaction, so readers never observe a partial state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use docqa_core::error::StoreError;
use docqa_core::models::{
    CandidateChunk, Chunk, CitedChunk, Document, DocumentStatus, NewDocument, NewQuery, Query,
    QueryRecord, QueryResult, QueryStats, QueryStatus, QuerySummary, ResultMetadata,
};
use docqa_core::store::{validate_chunk_set, DocumentStore, QueryStore, StoreResult};

/// SQLite implementation of the store traits.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn try_append(&self, id: &str, chunks: &[Chunk]) -> StoreResult<()> {
        validate_chunk_set(id, chunks)?;

        let mut tx = self.pool.begin().await.map_err(storage)?;
        let now = Utc::now().timestamp_millis();

        let updated = sqlx::query(
            r#"
            UPDATE documents
            SET status = 'processed', chunk_count = ?, failure_reason = NULL, updated_at = ?
            WHERE id = ? AND status IN ('uploaded', 'processing')
            "#,
        )
        .bind(chunks.len() as i64)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        if updated.rows_affected() == 0 {
            let status: Option<String> =
                sqlx::query_scalar("SELECT status FROM documents WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(storage)?;
            return Err(match status {
                None => not_found("document", id),
                Some(status) => StoreError::StorageFailure(format!(
                    "document {} is {} and cannot take chunks",
                    id, status
                )),
            });
        }

        for chunk in chunks {
            sqlx::query(
                "INSERT INTO chunks (id, document_id, chunk_index, content, hash, created_at) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(&chunk.hash)
            .bind(chunk.created_at.timestamp_millis())
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }

        tx.commit().await.map_err(storage)?;
        Ok(())
    }
}

fn storage(e: impl std::fmt::Display) -> StoreError {
    StoreError::StorageFailure(e.to_string())
}

fn not_found(kind: &str, id: &str) -> StoreError {
    StoreError::NotFound(format!("{} {}", kind, id))
}

fn from_millis(ms: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::StorageFailure(format!("invalid timestamp: {}", ms)))
}

const DOCUMENT_COLUMNS: &str = "id, owner_id, filename, format, size_bytes, storage_location, \
status, failure_reason, chunk_count, created_at, updated_at";

fn document_from_row(row: &SqliteRow) -> StoreResult<Document> {
    let format: String = row.try_get("format").map_err(storage)?;
    let status: String = row.try_get("status").map_err(storage)?;
    let size_bytes: i64 = row.try_get("size_bytes").map_err(storage)?;
    let chunk_count: i64 = row.try_get("chunk_count").map_err(storage)?;
    Ok(Document {
        id: row.try_get("id").map_err(storage)?,
        owner_id: row.try_get("owner_id").map_err(storage)?,
        filename: row.try_get("filename").map_err(storage)?,
        format: format.parse().map_err(storage)?,
        size_bytes: size_bytes as u64,
        storage_location: row.try_get("storage_location").map_err(storage)?,
        status: status.parse().map_err(storage)?,
        failure_reason: row.try_get("failure_reason").map_err(storage)?,
        chunk_count: chunk_count as u64,
        created_at: from_millis(row.try_get("created_at").map_err(storage)?)?,
        updated_at: from_millis(row.try_get("updated_at").map_err(storage)?)?,
    })
}

fn query_from_row(row: &SqliteRow) -> StoreResult<Query> {
    let status: String = row.try_get("status").map_err(storage)?;
    Ok(Query {
        id: row.try_get("id").map_err(storage)?,
        owner_id: row.try_get("owner_id").map_err(storage)?,
        query_text: row.try_get("query_text").map_err(storage)?,
        context: row.try_get("context").map_err(storage)?,
        status: status.parse().map_err(storage)?,
        failure_reason: row.try_get("failure_reason").map_err(storage)?,
        created_at: from_millis(row.try_get("created_at").map_err(storage)?)?,
        updated_at: from_millis(row.try_get("updated_at").map_err(storage)?)?,
    })
}

fn result_from_row(row: &SqliteRow) -> StoreResult<QueryResult> {
    let cited_json: String = row.try_get("cited_chunks_json").map_err(storage)?;
    let metadata_json: String = row.try_get("metadata_json").map_err(storage)?;
    let cited_chunks: Vec<CitedChunk> = serde_json::from_str(&cited_json).map_err(storage)?;
    let metadata: ResultMetadata = serde_json::from_str(&metadata_json).map_err(storage)?;
    Ok(QueryResult {
        id: row.try_get("id").map_err(storage)?,
        query_id: row.try_get("query_id").map_err(storage)?,
        answer: row.try_get("answer").map_err(storage)?,
        confidence: row.try_get("confidence").map_err(storage)?,
        cited_chunks,
        metadata,
        created_at: from_millis(row.try_get("created_at").map_err(storage)?)?,
    })
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn create_document(&self, new: &NewDocument) -> StoreResult<Document> {
        let now = Utc::now();
        // Round-trip through milliseconds so the returned value matches reads.
        let now = from_millis(now.timestamp_millis())?;
        let doc = Document {
            id: Uuid::new_v4().to_string(),
            owner_id: new.owner_id.clone(),
            filename: new.filename.clone(),
            format: new.format,
            size_bytes: new.size_bytes,
            storage_location: new.storage_location.clone(),
            status: DocumentStatus::Uploaded,
            failure_reason: None,
            chunk_count: 0,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO documents (id, owner_id, filename, format, size_bytes, storage_location,
                                   status, failure_reason, chunk_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, NULL, 0, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.owner_id)
        .bind(&doc.filename)
        .bind(doc.format.as_str())
        .bind(doc.size_bytes as i64)
        .bind(&doc.storage_location)
        .bind(doc.status.as_str())
        .bind(doc.created_at.timestamp_millis())
        .bind(doc.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(doc)
    }

    async fn mark_processing(&self, id: &str) -> StoreResult<()> {
        let updated = sqlx::query(
            "UPDATE documents SET status = 'processing', updated_at = ? WHERE id = ? AND status = 'uploaded'",
        )
        .bind(Utc::now().timestamp_millis())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if updated.rows_affected() == 0 {
            let doc = self.get_document(id).await?;
            return Err(StoreError::StorageFailure(format!(
                "document {} is {}, expected uploaded",
                id, doc.status
            )));
        }
        Ok(())
    }

    async fn mark_failed(&self, id: &str, reason: &str) -> StoreResult<()> {
        let updated = sqlx::query(
            "UPDATE documents SET status = 'failed', failure_reason = ?, storage_location = NULL, updated_at = ? WHERE id = ? AND status != 'processed'",
        )
        .bind(reason)
        .bind(Utc::now().timestamp_millis())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if updated.rows_affected() == 0 {
            // Either missing (NotFound) or already processed (left as is).
            self.get_document(id).await?;
        }
        Ok(())
    }

    async fn append_chunks(&self, id: &str, chunks: &[Chunk]) -> StoreResult<()> {
        match self.try_append(id, chunks).await {
            Ok(()) => {
                tracing::debug!(document_id = id, chunks = chunks.len(), "chunks appended");
                Ok(())
            }
            Err(StoreError::NotFound(what)) => Err(StoreError::NotFound(what)),
            Err(e) => {
                tracing::warn!(document_id = id, error = %e, "chunk append failed");
                if let Err(mark_err) = self.mark_failed(id, &e.to_string()).await {
                    tracing::error!(document_id = id, error = %mark_err, "could not mark document failed");
                }
                Err(e)
            }
        }
    }

    async fn get_document(&self, id: &str) -> StoreResult<Document> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE id = ?",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        match row {
            Some(row) => document_from_row(&row),
            None => Err(not_found("document", id)),
        }
    }

    async fn get_chunks(&self, id: &str) -> StoreResult<Vec<Chunk>> {
        // Distinguish "no chunks" from "no document".
        self.get_document(id).await?;

        let rows = sqlx::query(
            "SELECT id, document_id, chunk_index, content, hash, created_at FROM chunks WHERE document_id = ? ORDER BY chunk_index ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter()
            .map(|row| {
                Ok(Chunk {
                    id: row.try_get("id").map_err(storage)?,
                    document_id: row.try_get("document_id").map_err(storage)?,
                    chunk_index: row.try_get("chunk_index").map_err(storage)?,
                    content: row.try_get("content").map_err(storage)?,
                    hash: row.try_get("hash").map_err(storage)?,
                    created_at: from_millis(row.try_get("created_at").map_err(storage)?)?,
                })
            })
            .collect()
    }

    async fn list_by_owner(
        &self,
        owner_id: &str,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE owner_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            DOCUMENT_COLUMNS
        ))
        .bind(owner_id)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter().map(document_from_row).collect()
    }

    async fn delete_document(&self, id: &str) -> StoreResult<Document> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE id = ?",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage)?;
        let mut doc = match row {
            Some(row) => document_from_row(&row)?,
            None => return Err(not_found("document", id)),
        };

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        tx.commit().await.map_err(storage)?;

        doc.status = DocumentStatus::Deleted;
        doc.updated_at = Utc::now();
        Ok(doc)
    }

    async fn candidate_chunks(&self, owner_id: &str) -> StoreResult<Vec<CandidateChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id AS chunk_id, c.document_id, d.filename, d.created_at,
                   c.chunk_index, c.content
            FROM chunks c
            JOIN documents d ON d.id = c.document_id
            WHERE d.owner_id = ? AND d.status = 'processed'
            ORDER BY d.created_at DESC, c.document_id, c.chunk_index
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter()
            .map(|row| {
                Ok(CandidateChunk {
                    chunk_id: row.try_get("chunk_id").map_err(storage)?,
                    document_id: row.try_get("document_id").map_err(storage)?,
                    document_name: row.try_get("filename").map_err(storage)?,
                    document_created_at: from_millis(
                        row.try_get("created_at").map_err(storage)?,
                    )?,
                    chunk_index: row.try_get("chunk_index").map_err(storage)?,
                    content: row.try_get("content").map_err(storage)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl QueryStore for SqliteStore {
    async fn create_query(&self, new: &NewQuery) -> StoreResult<Query> {
        let now = from_millis(Utc::now().timestamp_millis())?;
        let query = Query {
            id: Uuid::new_v4().to_string(),
            owner_id: new.owner_id.clone(),
            query_text: new.query_text.clone(),
            context: new.context.clone(),
            status: QueryStatus::Processing,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO queries (id, owner_id, query_text, context, status, failure_reason,
                                 created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, NULL, ?, ?)
            "#,
        )
        .bind(&query.id)
        .bind(&query.owner_id)
        .bind(&query.query_text)
        .bind(&query.context)
        .bind(query.status.as_str())
        .bind(query.created_at.timestamp_millis())
        .bind(query.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(query)
    }

    async fn complete_query(&self, result: &QueryResult) -> StoreResult<()> {
        let cited_json = serde_json::to_string(&result.cited_chunks).map_err(storage)?;
        let metadata_json = serde_json::to_string(&result.metadata).map_err(storage)?;

        let mut tx = self.pool.begin().await.map_err(storage)?;

        let updated = sqlx::query(
            "UPDATE queries SET status = 'completed', updated_at = ? WHERE id = ? AND status = 'processing'",
        )
        .bind(Utc::now().timestamp_millis())
        .bind(&result.query_id)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        if updated.rows_affected() == 0 {
            let status: Option<String> =
                sqlx::query_scalar("SELECT status FROM queries WHERE id = ?")
                    .bind(&result.query_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(storage)?;
            return Err(match status {
                None => not_found("query", &result.query_id),
                Some(status) => StoreError::StorageFailure(format!(
                    "query {} is {}, expected processing",
                    result.query_id, status
                )),
            });
        }

        sqlx::query(
            r#"
            INSERT INTO query_results (id, query_id, answer, confidence, cited_chunks_json,
                                       metadata_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&result.id)
        .bind(&result.query_id)
        .bind(&result.answer)
        .bind(result.confidence)
        .bind(&cited_json)
        .bind(&metadata_json)
        .bind(result.created_at.timestamp_millis())
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    async fn fail_query(&self, id: &str, reason: &str) -> StoreResult<()> {
        let updated = sqlx::query(
            "UPDATE queries SET status = 'failed', failure_reason = ?, updated_at = ? WHERE id = ? AND status = 'processing'",
        )
        .bind(reason)
        .bind(Utc::now().timestamp_millis())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if updated.rows_affected() == 0 {
            self.get_query(id).await?;
        }
        Ok(())
    }

    async fn get_query(&self, id: &str) -> StoreResult<QueryRecord> {
        let row = sqlx::query(
            "SELECT id, owner_id, query_text, context, status, failure_reason, created_at, updated_at FROM queries WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        let query = match row {
            Some(row) => query_from_row(&row)?,
            None => return Err(not_found("query", id)),
        };

        let result_row = sqlx::query(
            "SELECT id, query_id, answer, confidence, cited_chunks_json, metadata_json, created_at FROM query_results WHERE query_id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        let result = match result_row {
            Some(row) => Some(result_from_row(&row)?),
            None => None,
        };

        Ok(QueryRecord { query, result })
    }

    async fn recent_queries(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<QuerySummary>> {
        let rows = sqlx::query(
            r#"
            SELECT q.id, q.query_text, q.status, q.created_at, r.confidence
            FROM queries q
            LEFT JOIN query_results r ON r.query_id = q.id
            WHERE q.owner_id = ?
            ORDER BY q.created_at DESC, q.rowid DESC
            LIMIT ?
            "#,
        )
        .bind(owner_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter()
            .map(|row| {
                let status: String = row.try_get("status").map_err(storage)?;
                Ok(QuerySummary {
                    id: row.try_get("id").map_err(storage)?,
                    query_text: row.try_get("query_text").map_err(storage)?,
                    status: status.parse().map_err(storage)?,
                    confidence: row.try_get("confidence").map_err(storage)?,
                    created_at: from_millis(row.try_get("created_at").map_err(storage)?)?,
                })
            })
            .collect()
    }

    async fn query_stats(&self, owner_id: &str) -> StoreResult<QueryStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0) AS completed,
                   COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0) AS failed,
                   MAX(created_at) AS last_query_time
            FROM queries
            WHERE owner_id = ?
            "#,
        )
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;

        let avg_confidence: Option<f64> = sqlx::query_scalar(
            r#"
            SELECT AVG(r.confidence)
            FROM query_results r
            JOIN queries q ON q.id = r.query_id
            WHERE q.owner_id = ?
            "#,
        )
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;

        let total: i64 = row.try_get("total").map_err(storage)?;
        let completed: i64 = row.try_get("completed").map_err(storage)?;
        let failed: i64 = row.try_get("failed").map_err(storage)?;
        let last: Option<i64> = row.try_get("last_query_time").map_err(storage)?;

        Ok(QueryStats {
            total_queries: total as u64,
            completed_queries: completed as u64,
            failed_queries: failed as u64,
            avg_confidence,
            last_query_time: last.map(from_millis).transpose()?,
        })
    }
}
