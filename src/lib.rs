//! # docqa
//!
//! Document question answering over an owner's own files.
//!
//! docqa ingests PDF, DOCX, and plain-text documents, splits them into
//! overlapping chunks, and answers natural-language questions by ranking
//! those chunks, composing a bounded prompt, and asking a completion
//! service. Every answer carries the chunks it was grounded on and a
//! heuristic confidence score.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────┐
//! │  Upload  │──▶│ Extract +    │──▶│  SQLite  │
//! │ CLI/HTTP │   │ Chunk        │   │ docs+qs  │
//! └──────────┘   └──────────────┘   └────┬─────┘
//!                                        │
//!      ┌────────────┐   ┌───────────┐    │
//!      │ Completion │◀──│ Rank +    │◀───┘
//!      │  (Gemini)  │   │ Prompt    │
//!      └────────────┘   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docqa init
//! docqa ingest policy.pdf --owner alice
//! docqa ask "What is the waiting period?" --owner alice
//! docqa serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite document and query store |
//! | [`extract`] | PDF/DOCX/TXT text extraction |
//! | [`upload`] | Staged upload files |
//! | [`ingest`] | Ingestion pipeline |
//! | [`completion`] | Gemini completion client |
//! | [`answer`] | Query answering pipeline |
//! | [`documents`] | Document CLI commands |
//! | [`queries`] | Query history CLI commands |
//! | [`server`] | HTTP API |

pub mod answer;
pub mod completion;
pub mod config;
pub mod db;
pub mod documents;
pub mod extract;
pub mod ingest;
pub mod migrate;
pub mod queries;
pub mod server;
pub mod sqlite_store;
pub mod upload;
