//! Core data models used throughout docqa.
//!
//! These types represent the documents, chunks, queries, and results that
//! flow through the ingestion and answer pipelines.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ExtractError;

/// Supported input formats, selected by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Txt,
}

impl DocumentFormat {
    /// Detect the format from a filename's extension (case-insensitive).
    ///
    /// Fails with [`ExtractError::UnsupportedFormat`] carrying the offending
    /// extension (with its leading dot, or empty when there is none).
    pub fn from_filename(filename: &str) -> Result<Self, ExtractError> {
        let ext = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Ok(DocumentFormat::Pdf),
            "docx" => Ok(DocumentFormat::Docx),
            "txt" => Ok(DocumentFormat::Txt),
            "" => Err(ExtractError::UnsupportedFormat(String::new())),
            other => Err(ExtractError::UnsupportedFormat(format!(".{}", other))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Txt => "txt",
        }
    }

    /// File extension including the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => ".pdf",
            DocumentFormat::Docx => ".docx",
            DocumentFormat::Txt => ".txt",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentFormat {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pdf" => Ok(DocumentFormat::Pdf),
            "docx" => Ok(DocumentFormat::Docx),
            "txt" => Ok(DocumentFormat::Txt),
            other => Err(ExtractError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Document lifecycle.
///
/// `uploaded → processing → processed | failed`, with `deleted` reachable
/// from any other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploaded,
    Processing,
    Processed,
    Failed,
    Deleted,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Processed => "processed",
            DocumentStatus::Failed => "failed",
            DocumentStatus::Deleted => "deleted",
        }
    }

    /// Whether `append_chunks` may run against a document in this state.
    pub fn accepts_chunks(&self) -> bool {
        matches!(self, DocumentStatus::Uploaded | DocumentStatus::Processing)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(DocumentStatus::Uploaded),
            "processing" => Ok(DocumentStatus::Processing),
            "processed" => Ok(DocumentStatus::Processed),
            "failed" => Ok(DocumentStatus::Failed),
            "deleted" => Ok(DocumentStatus::Deleted),
            other => Err(format!("unknown document status: {}", other)),
        }
    }
}

/// Metadata needed to allocate a new document.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub owner_id: String,
    pub filename: String,
    pub format: DocumentFormat,
    pub size_bytes: u64,
    /// Where the staged upload lives, if it was kept on disk.
    pub storage_location: Option<String>,
}

/// A stored document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub owner_id: String,
    pub filename: String,
    pub format: DocumentFormat,
    pub size_bytes: u64,
    pub storage_location: Option<String>,
    pub status: DocumentStatus,
    pub failure_reason: Option<String>,
    pub chunk_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A chunk of a document's extracted text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub content: String,
    /// SHA-256 of `content`, hex encoded.
    pub hash: String,
    pub created_at: DateTime<Utc>,
}

/// A stored chunk offered to the ranker, joined with its document.
#[derive(Debug, Clone)]
pub struct CandidateChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub document_name: String,
    pub document_created_at: DateTime<Utc>,
    pub chunk_index: i64,
    pub content: String,
}

/// A candidate that scored above zero, with its 1-based rank.
#[derive(Debug, Clone)]
pub struct RankedChunk {
    pub chunk: CandidateChunk,
    pub score: f64,
    pub rank: usize,
}

/// Query lifecycle: `processing → completed | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Processing,
    Completed,
    Failed,
}

impl QueryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryStatus::Processing => "processing",
            QueryStatus::Completed => "completed",
            QueryStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(QueryStatus::Processing),
            "completed" => Ok(QueryStatus::Completed),
            "failed" => Ok(QueryStatus::Failed),
            other => Err(format!("unknown query status: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewQuery {
    pub owner_id: String,
    pub query_text: String,
    pub context: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub id: String,
    pub owner_id: String,
    pub query_text: String,
    pub context: Option<String>,
    pub status: QueryStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A chunk cited in an answer, in the order it appeared in the prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitedChunk {
    pub content: String,
    pub document_name: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub rank: usize,
}

impl From<&RankedChunk> for CitedChunk {
    fn from(ranked: &RankedChunk) -> Self {
        CitedChunk {
            content: ranked.chunk.content.clone(),
            document_name: ranked.chunk.document_name.clone(),
            document_id: ranked.chunk.document_id.clone(),
            chunk_index: ranked.chunk.chunk_index,
            rank: ranked.rank,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// Chunks placed in the prompt.
    pub chunks_considered: usize,
    /// Chunks returned by the ranker, before the prompt budget applied.
    pub chunks_retrieved: usize,
    pub processing_time_ms: u64,
    pub model_used: String,
    pub prompt_tokens: u64,
    pub response_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub id: String,
    pub query_id: String,
    pub answer: String,
    pub confidence: f64,
    pub cited_chunks: Vec<CitedChunk>,
    pub metadata: ResultMetadata,
    pub created_at: DateTime<Utc>,
}

/// A query together with its result, if it completed.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRecord {
    pub query: Query,
    pub result: Option<QueryResult>,
}

/// Row of the recent-queries listing.
#[derive(Debug, Clone, Serialize)]
pub struct QuerySummary {
    pub id: String,
    pub query_text: String,
    pub status: QueryStatus,
    pub confidence: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Per-owner query statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryStats {
    pub total_queries: u64,
    pub completed_queries: u64,
    pub failed_queries: u64,
    pub avg_confidence: Option<f64>,
    pub last_query_time: Option<DateTime<Utc>>,
}

/// Rough token estimate used for result metadata (4 chars per token).
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_filename_case_insensitive() {
        assert_eq!(
            DocumentFormat::from_filename("Policy.PDF").unwrap(),
            DocumentFormat::Pdf
        );
        assert_eq!(
            DocumentFormat::from_filename("notes.v2.Docx").unwrap(),
            DocumentFormat::Docx
        );
        assert_eq!(
            DocumentFormat::from_filename("readme.txt").unwrap(),
            DocumentFormat::Txt
        );
    }

    #[test]
    fn test_format_from_filename_rejects_others() {
        let err = DocumentFormat::from_filename("setup.exe").unwrap_err();
        assert_eq!(err, ExtractError::UnsupportedFormat(".exe".to_string()));

        let err = DocumentFormat::from_filename("Makefile").unwrap_err();
        assert_eq!(err, ExtractError::UnsupportedFormat(String::new()));
    }

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            DocumentStatus::Uploaded,
            DocumentStatus::Processing,
            DocumentStatus::Processed,
            DocumentStatus::Failed,
            DocumentStatus::Deleted,
        ] {
            assert_eq!(status.as_str().parse::<DocumentStatus>().unwrap(), status);
        }
        assert!(DocumentStatus::Processing.accepts_chunks());
        assert!(!DocumentStatus::Failed.accepts_chunks());
    }

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
