//! # docqa core
//!
//! Pure logic for docqa: data models, the error taxonomy, chunking,
//! relevance ranking, prompt composition, confidence scoring, and the
//! storage and completion traits the application crate plugs into.
//!
//! This crate contains no tokio, sqlx, HTTP client, or filesystem I/O.
//! Everything here is deterministic given its inputs, except the
//! [`store::memory::InMemoryStore`], which keeps state behind `RwLock`s.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Documents, chunks, queries, and results |
//! | [`error`] | Typed error taxonomy for every pipeline stage |
//! | [`chunk`] | Overlapping window chunker with boundary snapping |
//! | [`rank`] | Lexical relevance ranking |
//! | [`prompt`] | Bounded prompt assembly |
//! | [`confidence`] | Answer confidence heuristic |
//! | [`completion`] | Completion-service trait and request types |
//! | [`store`] | Document and query persistence traits |

pub mod chunk;
pub mod completion;
pub mod confidence;
pub mod error;
pub mod models;
pub mod prompt;
pub mod rank;
pub mod store;
