//! Overlapping window chunker.
//!
//! Splits extracted document text into [`Chunk`]s of at most `size`
//! characters, consecutive chunks sharing up to `overlap` characters.
//! Window ends snap back to the last sentence or line boundary (`.` or
//! `\n`) found in the final 30% of the window, so chunks tend to end on
//! whole sentences.
//!
//! Lengths are measured in characters (Unicode scalar values), not bytes,
//! so multi-byte text never splits inside a code point.
//!
//! # Algorithm
//!
//! 1. `start = 0`.
//! 2. While `start < len`:
//!    - `end = min(start + size, len)`.
//!    - If `end < len`, search backward from `end - 1` to
//!      `start + floor(0.7 × size)` for `.` or `\n`; if found at `b`,
//!      `end = b + 1`.
//!    - Emit `trim(text[start..end])` if non-empty.
//!    - Stop once the window reached the end of the text; otherwise
//!      `start = max(end - overlap, start + 1)`.
//!
//! The `start + 1` floor keeps the cursor strictly increasing, so the loop
//! terminates for every input.
//!
//! # Example
//!
//! ```rust
//! use docqa_core::chunk::{ChunkConfig, Chunker};
//!
//! let chunker = Chunker::new(ChunkConfig::default());
//! let pieces = chunker.split("  A short note.  ");
//! assert_eq!(pieces, vec!["A short note.".to_string()]);
//! ```

use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ChunkError;
use crate::models::Chunk;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Validated chunker settings.
///
/// Construct through [`ChunkConfig::new`]; `overlap` must be strictly
/// smaller than `size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    size: usize,
    overlap: usize,
}

impl ChunkConfig {
    pub fn new(size: usize, overlap: usize) -> Result<Self, ChunkError> {
        if size == 0 {
            return Err(ChunkError::InvalidConfiguration(
                "chunk size must be > 0".to_string(),
            ));
        }
        if overlap >= size {
            return Err(ChunkError::InvalidConfiguration(format!(
                "overlap ({}) must be smaller than chunk size ({})",
                overlap, size
            )));
        }
        Ok(Self { size, overlap })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Stateless chunker; cheap to copy and safe to share across tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct Chunker {
    config: ChunkConfig,
}

impl Chunker {
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// Build a chunker straight from raw settings.
    pub fn with_settings(size: usize, overlap: usize) -> Result<Self, ChunkError> {
        ChunkConfig::new(size, overlap).map(Self::new)
    }

    pub fn config(&self) -> ChunkConfig {
        self.config
    }

    /// Split `text` into trimmed, non-empty chunk texts in document order.
    pub fn split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        self.windows(&chars)
            .into_iter()
            .map(|(start, end)| chars[start..end].iter().collect::<String>())
            .map(|piece| piece.trim().to_string())
            .filter(|piece| !piece.is_empty())
            .collect()
    }

    /// Split `text` and wrap each piece as a [`Chunk`] of `document_id`.
    ///
    /// Indices are contiguous from 0 because empty windows are dropped
    /// before numbering.
    pub fn chunk_document(&self, document_id: &str, text: &str) -> Vec<Chunk> {
        self.split(text)
            .into_iter()
            .enumerate()
            .map(|(i, piece)| make_chunk(document_id, i as i64, piece))
            .collect()
    }

    /// Compute the `[start, end)` windows over `chars`.
    fn windows(&self, chars: &[char]) -> Vec<(usize, usize)> {
        let len = chars.len();
        let size = self.config.size;
        let overlap = self.config.overlap;
        let snap_floor = size * 7 / 10;

        let mut out = Vec::new();
        let mut start = 0usize;

        while start < len {
            let mut end = (start + size).min(len);

            if end < len {
                let lower = start + snap_floor;
                if let Some(b) = (lower..end)
                    .rev()
                    .find(|&i| chars[i] == '.' || chars[i] == '\n')
                {
                    end = b + 1;
                }
            }

            out.push((start, end));

            if end >= len {
                break;
            }
            start = end.saturating_sub(overlap).max(start + 1);
        }

        out
    }
}

/// Create a single [`Chunk`] with a UUID and SHA-256 content hash.
fn make_chunk(document_id: &str, index: i64, content: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        content,
        hash,
        created_at: Utc::now(),
    }
}
