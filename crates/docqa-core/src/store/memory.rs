//! In-memory [`DocumentStore`] and [`QueryStore`] for tests and embedding.
//!
//! All state sits behind one `std::sync::RwLock`, so every operation is
//! atomic with respect to readers. A monotonically increasing sequence
//! number gives the newest-first order of listings.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    CandidateChunk, Chunk, Document, DocumentStatus, NewDocument, NewQuery, Query, QueryRecord,
    QueryResult, QueryStats, QueryStatus, QuerySummary,
};

use super::{validate_chunk_set, DocumentStore, QueryStore, StoreResult};

struct StoredDoc {
    seq: u64,
    doc: Document,
    chunks: Vec<Chunk>,
}

struct StoredQuery {
    seq: u64,
    query: Query,
    result: Option<QueryResult>,
}

#[derive(Default)]
struct State {
    next_seq: u64,
    docs: HashMap<String, StoredDoc>,
    queries: HashMap<String, StoredQuery>,
}

impl State {
    fn bump(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn doc_mut(&mut self, id: &str) -> StoreResult<&mut StoredDoc> {
        self.docs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("document {}", id)))
    }

    fn query_mut(&mut self, id: &str) -> StoreResult<&mut StoredQuery> {
        self.queries
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("query {}", id)))
    }
}

/// In-memory store for testing.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| StoreError::StorageFailure("store lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| StoreError::StorageFailure("store lock poisoned".to_string()))
    }
}

fn fail_doc(doc: &mut Document, reason: &str) {
    doc.status = DocumentStatus::Failed;
    doc.failure_reason = Some(reason.to_string());
    doc.storage_location = None;
    doc.updated_at = Utc::now();
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn create_document(&self, new: &NewDocument) -> StoreResult<Document> {
        let now = Utc::now();
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
        let mut state = self.write()?;
        let seq = state.bump();
        state.docs.insert(
            doc.id.clone(),
            StoredDoc {
                seq,
                doc: doc.clone(),
                chunks: Vec::new(),
            },
        );
        Ok(doc)
    }

    async fn mark_processing(&self, id: &str) -> StoreResult<()> {
        let mut state = self.write()?;
        let stored = state.doc_mut(id)?;
        if stored.doc.status != DocumentStatus::Uploaded {
            return Err(StoreError::StorageFailure(format!(
                "document {} is {}, expected uploaded",
                id, stored.doc.status
            )));
        }
        stored.doc.status = DocumentStatus::Processing;
        stored.doc.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_failed(&self, id: &str, reason: &str) -> StoreResult<()> {
        let mut state = self.write()?;
        let stored = state.doc_mut(id)?;
        if stored.doc.status != DocumentStatus::Processed {
            fail_doc(&mut stored.doc, reason);
        }
        Ok(())
    }

    async fn append_chunks(&self, id: &str, chunks: &[Chunk]) -> StoreResult<()> {
        let mut state = self.write()?;
        let stored = state.doc_mut(id)?;
        if !stored.doc.status.accepts_chunks() {
            return Err(StoreError::StorageFailure(format!(
                "document {} is {} and cannot take chunks",
                id, stored.doc.status
            )));
        }
        if let Err(e) = validate_chunk_set(id, chunks) {
            fail_doc(&mut stored.doc, &e.to_string());
            return Err(e);
        }
        stored.chunks = chunks.to_vec();
        stored.doc.chunk_count = chunks.len() as u64;
        stored.doc.status = DocumentStatus::Processed;
        stored.doc.failure_reason = None;
        stored.doc.updated_at = Utc::now();
        Ok(())
    }

    async fn get_document(&self, id: &str) -> StoreResult<Document> {
        let state = self.read()?;
        state
            .docs
            .get(id)
            .map(|s| s.doc.clone())
            .ok_or_else(|| StoreError::NotFound(format!("document {}", id)))
    }

    async fn get_chunks(&self, id: &str) -> StoreResult<Vec<Chunk>> {
        let state = self.read()?;
        state
            .docs
            .get(id)
            .map(|s| s.chunks.clone())
            .ok_or_else(|| StoreError::NotFound(format!("document {}", id)))
    }

    async fn list_by_owner(
        &self,
        owner_id: &str,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<Document>> {
        let state = self.read()?;
        let mut docs: Vec<&StoredDoc> = state
            .docs
            .values()
            .filter(|s| s.doc.owner_id == owner_id)
            .collect();
        docs.sort_by(|a, b| b.seq.cmp(&a.seq));
        Ok(docs
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|s| s.doc.clone())
            .collect())
    }

    async fn delete_document(&self, id: &str) -> StoreResult<Document> {
        let mut state = self.write()?;
        let stored = state
            .docs
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(format!("document {}", id)))?;
        let mut doc = stored.doc;
        doc.status = DocumentStatus::Deleted;
        doc.updated_at = Utc::now();
        Ok(doc)
    }

    async fn candidate_chunks(&self, owner_id: &str) -> StoreResult<Vec<CandidateChunk>> {
        let state = self.read()?;
        Ok(state
            .docs
            .values()
            .filter(|s| s.doc.owner_id == owner_id && s.doc.status == DocumentStatus::Processed)
            .flat_map(|s| {
                s.chunks.iter().map(move |c| CandidateChunk {
                    chunk_id: c.id.clone(),
                    document_id: s.doc.id.clone(),
                    document_name: s.doc.filename.clone(),
                    document_created_at: s.doc.created_at,
                    chunk_index: c.chunk_index,
                    content: c.content.clone(),
                })
            })
            .collect())
    }
}

#[async_trait]
impl QueryStore for InMemoryStore {
    async fn create_query(&self, new: &NewQuery) -> StoreResult<Query> {
        let now = Utc::now();
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
        let mut state = self.write()?;
        let seq = state.bump();
        state.queries.insert(
            query.id.clone(),
            StoredQuery {
                seq,
                query: query.clone(),
                result: None,
            },
        );
        Ok(query)
    }

    async fn complete_query(&self, result: &QueryResult) -> StoreResult<()> {
        let mut state = self.write()?;
        let stored = state.query_mut(&result.query_id)?;
        if stored.query.status != QueryStatus::Processing {
            return Err(StoreError::StorageFailure(format!(
                "query {} is {}, expected processing",
                result.query_id, stored.query.status
            )));
        }
        stored.query.status = QueryStatus::Completed;
        stored.query.updated_at = Utc::now();
        stored.result = Some(result.clone());
        Ok(())
    }

    async fn fail_query(&self, id: &str, reason: &str) -> StoreResult<()> {
        let mut state = self.write()?;
        let stored = state.query_mut(id)?;
        if stored.query.status == QueryStatus::Processing {
            stored.query.status = QueryStatus::Failed;
            stored.query.failure_reason = Some(reason.to_string());
            stored.query.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn get_query(&self, id: &str) -> StoreResult<QueryRecord> {
        let state = self.read()?;
        state
            .queries
            .get(id)
            .map(|s| QueryRecord {
                query: s.query.clone(),
                result: s.result.clone(),
            })
            .ok_or_else(|| StoreError::NotFound(format!("query {}", id)))
    }

    async fn recent_queries(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<QuerySummary>> {
        let state = self.read()?;
        let mut queries: Vec<&StoredQuery> = state
            .queries
            .values()
            .filter(|s| s.query.owner_id == owner_id)
            .collect();
        queries.sort_by(|a, b| b.seq.cmp(&a.seq));
        Ok(queries
            .into_iter()
            .take(limit)
            .map(|s| QuerySummary {
                id: s.query.id.clone(),
                query_text: s.query.query_text.clone(),
                status: s.query.status,
                confidence: s.result.as_ref().map(|r| r.confidence),
                created_at: s.query.created_at,
            })
            .collect())
    }

    async fn query_stats(&self, owner_id: &str) -> StoreResult<QueryStats> {
        let state = self.read()?;
        let mut stats = QueryStats::default();
        let mut confidence_sum = 0.0;
        let mut confidence_count = 0u64;
        for s in state.queries.values().filter(|s| s.query.owner_id == owner_id) {
            stats.total_queries += 1;
            match s.query.status {
                QueryStatus::Completed => stats.completed_queries += 1,
                QueryStatus::Failed => stats.failed_queries += 1,
                QueryStatus::Processing => {}
            }
            if let Some(result) = &s.result {
                confidence_sum += result.confidence;
                confidence_count += 1;
            }
            if stats
                .last_query_time
                .map_or(true, |t| s.query.created_at > t)
            {
                stats.last_query_time = Some(s.query.created_at);
            }
        }
        if confidence_count > 0 {
            stats.avg_confidence = Some(confidence_sum / confidence_count as f64);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunker;
    use crate::models::{DocumentFormat, ResultMetadata};

    fn new_doc(owner: &str, name: &str) -> NewDocument {
        NewDocument {
            owner_id: owner.to_string(),
            filename: name.to_string(),
            format: DocumentFormat::Txt,
            size_bytes: 10,
            storage_location: None,
        }
    }

    async fn processed_doc(store: &InMemoryStore, owner: &str, name: &str, text: &str) -> Document {
        let doc = store.create_document(&new_doc(owner, name)).await.unwrap();
        store.mark_processing(&doc.id).await.unwrap();
        let chunks = Chunker::default().chunk_document(&doc.id, text);
        store.append_chunks(&doc.id, &chunks).await.unwrap();
        store.get_document(&doc.id).await.unwrap()
    }

    fn result_for(query_id: &str, confidence: f64) -> QueryResult {
        QueryResult {
            id: Uuid::new_v4().to_string(),
            query_id: query_id.to_string(),
            answer: "answer".to_string(),
            confidence,
            cited_chunks: Vec::new(),
            metadata: ResultMetadata {
                chunks_considered: 0,
                chunks_retrieved: 0,
                processing_time_ms: 1,
                model_used: "stub".to_string(),
                prompt_tokens: 1,
                response_tokens: 1,
            },
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_document_lifecycle() {
        let store = InMemoryStore::new();
        let doc = store.create_document(&new_doc("alice", "a.txt")).await.unwrap();
        assert_eq!(doc.status, DocumentStatus::Uploaded);

        store.mark_processing(&doc.id).await.unwrap();
        let chunks = Chunker::default().chunk_document(&doc.id, "Some policy text.");
        store.append_chunks(&doc.id, &chunks).await.unwrap();

        let doc = store.get_document(&doc.id).await.unwrap();
        assert_eq!(doc.status, DocumentStatus::Processed);
        assert_eq!(doc.chunk_count, 1);
        assert_eq!(store.get_chunks(&doc.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_append_with_gap_fails_document_and_keeps_no_chunks() {
        let store = InMemoryStore::new();
        let doc = store.create_document(&new_doc("alice", "a.txt")).await.unwrap();
        store.mark_processing(&doc.id).await.unwrap();

        let mut chunks = Chunker::with_settings(10, 0)
            .unwrap()
            .chunk_document(&doc.id, "abcdefghijklmnopqrstuvwxyz");
        chunks[2].chunk_index = 1;

        let err = store.append_chunks(&doc.id, &chunks).await.unwrap_err();
        assert!(matches!(err, StoreError::StorageFailure(_)));

        let doc = store.get_document(&doc.id).await.unwrap();
        assert_eq!(doc.status, DocumentStatus::Failed);
        assert!(store.get_chunks(&doc.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_failed_does_not_demote_processed() {
        let store = InMemoryStore::new();
        let doc = processed_doc(&store, "alice", "a.txt", "Coverage text.").await;

        store.mark_failed(&doc.id, "late failure").await.unwrap();
        let doc = store.get_document(&doc.id).await.unwrap();
        assert_eq!(doc.status, DocumentStatus::Processed);
        assert_eq!(doc.chunk_count, 1);
    }

    #[tokio::test]
    async fn test_mark_failed_forgets_storage_location() {
        let store = InMemoryStore::new();
        let mut new = new_doc("alice", "a.txt");
        new.storage_location = Some("/uploads/a.txt".to_string());
        let doc = store.create_document(&new).await.unwrap();
        assert!(doc.storage_location.is_some());

        store.mark_failed(&doc.id, "extraction failed").await.unwrap();
        let doc = store.get_document(&doc.id).await.unwrap();
        assert_eq!(doc.status, DocumentStatus::Failed);
        assert_eq!(doc.storage_location, None);
    }

    #[tokio::test]
    async fn test_mark_failed_is_idempotent() {
        let store = InMemoryStore::new();
        let doc = store.create_document(&new_doc("alice", "a.txt")).await.unwrap();
        store.mark_failed(&doc.id, "first").await.unwrap();
        store.mark_failed(&doc.id, "second").await.unwrap();
        let doc = store.get_document(&doc.id).await.unwrap();
        assert_eq!(doc.status, DocumentStatus::Failed);
    }

    #[tokio::test]
    async fn test_delete_removes_document_and_chunks() {
        let store = InMemoryStore::new();
        let doc = processed_doc(&store, "alice", "a.txt", "Coverage text.").await;

        let snapshot = store.delete_document(&doc.id).await.unwrap();
        assert_eq!(snapshot.status, DocumentStatus::Deleted);
        assert!(matches!(
            store.get_document(&doc.id).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(store.candidate_chunks("alice").await.unwrap().is_empty());
        assert!(matches!(
            store.delete_document(&doc.id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_by_owner_newest_first_and_paged() {
        let store = InMemoryStore::new();
        for name in ["1.txt", "2.txt", "3.txt"] {
            store.create_document(&new_doc("alice", name)).await.unwrap();
        }
        store.create_document(&new_doc("bob", "b.txt")).await.unwrap();

        let all = store.list_by_owner("alice", 10, 0).await.unwrap();
        let names: Vec<&str> = all.iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, vec!["3.txt", "2.txt", "1.txt"]);

        let page = store.list_by_owner("alice", 1, 1).await.unwrap();
        assert_eq!(page[0].filename, "2.txt");
    }

    #[tokio::test]
    async fn test_candidates_scoped_to_owner_and_processed_docs() {
        let store = InMemoryStore::new();
        processed_doc(&store, "alice", "a.txt", "Alice policy.").await;
        processed_doc(&store, "bob", "b.txt", "Bob policy.").await;
        let pending = store.create_document(&new_doc("alice", "p.txt")).await.unwrap();
        store.mark_processing(&pending.id).await.unwrap();

        let candidates = store.candidate_chunks("alice").await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].document_name, "a.txt");
    }

    #[tokio::test]
    async fn test_query_lifecycle_and_stats() {
        let store = InMemoryStore::new();
        let q1 = store
            .create_query(&NewQuery {
                owner_id: "alice".to_string(),
                query_text: "first".to_string(),
                context: None,
            })
            .await
            .unwrap();
        let q2 = store
            .create_query(&NewQuery {
                owner_id: "alice".to_string(),
                query_text: "second".to_string(),
                context: Some("ctx".to_string()),
            })
            .await
            .unwrap();

        store.complete_query(&result_for(&q1.id, 0.8)).await.unwrap();
        store.fail_query(&q2.id, "timeout").await.unwrap();

        let record = store.get_query(&q1.id).await.unwrap();
        assert_eq!(record.query.status, QueryStatus::Completed);
        assert!(record.result.is_some());

        let record = store.get_query(&q2.id).await.unwrap();
        assert_eq!(record.query.status, QueryStatus::Failed);
        assert!(record.result.is_none());

        // A failed query cannot be completed afterwards.
        assert!(store.complete_query(&result_for(&q2.id, 0.5)).await.is_err());

        let recent = store.recent_queries("alice", 10).await.unwrap();
        assert_eq!(recent[0].query_text, "second");
        assert_eq!(recent[1].confidence, Some(0.8));

        let stats = store.query_stats("alice").await.unwrap();
        assert_eq!(stats.total_queries, 2);
        assert_eq!(stats.completed_queries, 1);
        assert_eq!(stats.failed_queries, 1);
        assert_eq!(stats.avg_confidence, Some(0.8));

        assert_eq!(store.query_stats("bob").await.unwrap(), QueryStats::default());
    }
}
