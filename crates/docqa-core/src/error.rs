//! Error taxonomy for docqa.
//!
//! Each pipeline stage has its own error enum so callers can match on the
//! exact failure kind. [`Error`] wraps them for code that spans stages
//! (the ingestion and answer pipelines).

use std::time::Duration;

use thiserror::Error;

use crate::models::DocumentFormat;

/// Text extraction errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// The file extension is not one of `.pdf`, `.docx`, `.txt`.
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// The parser for the declared format rejected the bytes.
    #[error("{format} extraction failed: {message}")]
    ExtractionFailure {
        format: DocumentFormat,
        message: String,
    },

    /// Extraction succeeded but produced only whitespace.
    #[error("no text content found in document")]
    EmptyExtraction,
}

/// Chunking errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("invalid chunking configuration: {0}")]
    InvalidConfiguration(String),
}

/// Persistence errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage failure: {0}")]
    StorageFailure(String),
}

/// Completion-service errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    #[error("completion timed out after {0:?}")]
    Timeout(Duration),

    #[error("completion service rate limited the request: {0}")]
    RateLimited(String),

    #[error("completion service error: {0}")]
    ServiceError(String),

    #[error("completion service returned no candidate")]
    EmptyCompletion,
}

/// Top-level error for the ingestion and answer pipelines.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Chunk(#[from] ChunkError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    /// Request-level validation (query length, empty filename, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("payload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: u64, max: u64 },
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;
