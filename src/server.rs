//! HTTP API server.
//!
//! Exposes ingestion, document management, and query answering as a JSON
//! API. Every route except `/health` requires the caller's identity in the
//! `x-user-id` header; requests without it are rejected with `401`. A
//! caller only ever sees its own documents and queries: another owner's
//! resource is reported as `404`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/documents/upload` | Upload and ingest a file (multipart field `document`) |
//! | `GET`    | `/documents` | List the caller's documents (`limit`, `offset`) |
//! | `GET`    | `/documents/{id}` | One document |
//! | `DELETE` | `/documents/{id}` | Delete a document and its chunks |
//! | `POST`   | `/queries` | Ask a question |
//! | `GET`    | `/queries/recent` | Recent queries (`limit`) |
//! | `GET`    | `/queries/stats/summary` | Query statistics |
//! | `GET`    | `/queries/{id}` | One query with its result |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "unsupported_format", "message": "unsupported file format: .exe" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unsupported_format` (400),
//! `extraction_failed` (422), `empty_document` (422), `unauthorized` (401),
//! `not_found` (404), `payload_too_large` (413), `rate_limited` (429),
//! `completion_failed` (502), `timeout` (504), `internal` (500).

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use docqa_core::completion::CompletionClient;
use docqa_core::error::{CompletionError, Error, ExtractError, StoreError};
use docqa_core::models::{Document, QueryRecord, QueryResult, QueryStats, QuerySummary};
use docqa_core::store::{DocumentStore, QueryStore};

use crate::answer::{AnswerPipeline, AskRequest};
use crate::completion::create_client;
use crate::config::Config;
use crate::db;
use crate::ingest::{self, IngestOutcome, IngestPipeline};
use crate::sqlite_store::SqliteStore;
use crate::upload;

const USER_HEADER: &str = "x-user-id";
const UPLOAD_FIELD: &str = "document";
const DEFAULT_PAGE_LIMIT: usize = 20;
const MAX_PAGE_LIMIT: usize = 100;
const DEFAULT_RECENT_LIMIT: usize = 10;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    store: Arc<SqliteStore>,
    ingest: IngestPipeline,
    answer: Arc<AnswerPipeline>,
    upload_dir: PathBuf,
}

impl AppState {
    pub fn new(
        store: Arc<SqliteStore>,
        ingest: IngestPipeline,
        answer: Arc<AnswerPipeline>,
        upload_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            ingest,
            answer,
            upload_dir,
        }
    }
}

/// Starts the HTTP server on `[server].bind`.
///
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();

    let pool = db::connect(config).await?;
    crate::migrate::apply(&pool).await?;
    let store = Arc::new(SqliteStore::new(pool));

    let client: Arc<dyn CompletionClient> = Arc::from(create_client(&config.completion)?);
    if !config.completion.is_enabled() {
        tracing::warn!("completion provider is disabled; queries will fail");
    }

    let state = AppState::new(
        store,
        IngestPipeline::from_config(config)?,
        Arc::new(AnswerPipeline::from_config(config, client)),
        config.ingest.upload_dir.clone(),
    );
    let app = router(state);

    tracing::info!(bind = %bind_addr, "docqa server listening");
    println!("docqa server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router for `state`.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Leave headroom for multipart framing; the pipeline enforces the exact limit.
    let body_limit = (state.ingest.max_upload_bytes() as usize).saturating_add(1024 * 1024);

    Router::new()
        .route("/health", get(handle_health))
        .route("/documents", get(handle_list_documents))
        .route("/documents/upload", post(handle_upload))
        .route(
            "/documents/{id}",
            get(handle_get_document).delete(handle_delete_document),
        )
        .route("/queries", post(handle_ask))
        .route("/queries/recent", get(handle_recent_queries))
        .route("/queries/stats/summary", get(handle_query_stats))
        .route("/queries/{id}", get(handle_get_query))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::NOT_FOUND, "not_found", message)
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        let (status, code) = match &err {
            Error::InvalidInput(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Error::PayloadTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
            Error::Extract(ExtractError::UnsupportedFormat(_)) => {
                (StatusCode::BAD_REQUEST, "unsupported_format")
            }
            Error::Extract(ExtractError::ExtractionFailure { .. }) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "extraction_failed")
            }
            Error::Extract(ExtractError::EmptyExtraction) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "empty_document")
            }
            Error::Chunk(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            Error::Store(StoreError::NotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
            Error::Store(StoreError::StorageFailure(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
            Error::Completion(CompletionError::Timeout(_)) => {
                (StatusCode::GATEWAY_TIMEOUT, "timeout")
            }
            Error::Completion(CompletionError::RateLimited(_)) => {
                (StatusCode::TOO_MANY_REQUESTS, "rate_limited")
            }
            Error::Completion(_) => (StatusCode::BAD_GATEWAY, "completion_failed"),
        };
        AppError::new(status, code, message)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        Error::from(err).into()
    }
}

/// The caller's identity from the `x-user-id` header.
fn owner_id(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            AppError::new(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                format!("missing {} header", USER_HEADER),
            )
        })
}

/// Fetch a document, hiding other owners' documents.
async fn owned_document(state: &AppState, owner: &str, id: &str) -> Result<Document, AppError> {
    let doc = state.store.get_document(id).await?;
    if doc.owner_id != owner {
        return Err(not_found(format!("not found: document {}", id)));
    }
    Ok(doc)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Documents ============

#[derive(Serialize)]
struct UploadResponse {
    document_id: String,
    filename: String,
    status: String,
    text_length: usize,
    chunk_count: usize,
}

impl From<IngestOutcome> for UploadResponse {
    fn from(outcome: IngestOutcome) -> Self {
        Self {
            document_id: outcome.document.id,
            filename: outcome.document.filename,
            status: outcome.document.status.to_string(),
            text_length: outcome.text_chars,
            chunk_count: outcome.chunk_count,
        }
    }
}

/// Handler for `POST /documents/upload`.
///
/// Reads the multipart field `document`, validates its name and size
/// before staging it, then ingests it synchronously.
async fn handle_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let owner = owner_id(&headers)?;

    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Failed to read multipart: {}", e)))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = upload::base_filename(field.file_name().unwrap_or("")).to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("Failed to read file: {}", e)))?;
        upload = Some((filename, bytes.to_vec()));
    }

    let (filename, bytes) =
        upload.ok_or_else(|| bad_request(format!("missing multipart field '{}'", UPLOAD_FIELD)))?;

    let outcome = ingest::ingest_staged(
        &state.ingest,
        state.store.as_ref(),
        &state.upload_dir,
        &owner,
        &filename,
        bytes,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(outcome.into())))
}

#[derive(Deserialize)]
struct PageParams {
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Serialize)]
struct DocumentListResponse {
    documents: Vec<Document>,
    limit: usize,
    offset: usize,
}

async fn handle_list_documents(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(page): Query<PageParams>,
) -> Result<Json<DocumentListResponse>, AppError> {
    let owner = owner_id(&headers)?;
    let limit = page.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
    let offset = page.offset.unwrap_or(0);
    let documents = state.store.list_by_owner(&owner, limit, offset).await?;
    Ok(Json(DocumentListResponse {
        documents,
        limit,
        offset,
    }))
}

async fn handle_get_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Document>, AppError> {
    let owner = owner_id(&headers)?;
    Ok(Json(owned_document(&state, &owner, &id).await?))
}

async fn handle_delete_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Document>, AppError> {
    let owner = owner_id(&headers)?;
    owned_document(&state, &owner, &id).await?;
    let doc = ingest::delete_document(state.store.as_ref(), &id).await?;
    Ok(Json(doc))
}

// ============ Queries ============

#[derive(Deserialize)]
struct AskBody {
    query: String,
    #[serde(default)]
    context: Option<String>,
}

/// Handler for `POST /queries`.
///
/// The answer runs detached, so a client that disconnects mid-completion
/// still leaves its query `completed` or `failed`.
async fn handle_ask(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AskBody>,
) -> Result<Json<QueryResult>, AppError> {
    let owner = owner_id(&headers)?;
    let result = state
        .answer
        .clone()
        .answer_detached(
            state.store.clone(),
            AskRequest {
                owner_id: owner,
                query: body.query,
                context: body.context,
            },
        )
        .await?;
    Ok(Json(result))
}

#[derive(Deserialize)]
struct RecentParams {
    limit: Option<usize>,
}

async fn handle_recent_queries(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<RecentParams>,
) -> Result<Json<Vec<QuerySummary>>, AppError> {
    let owner = owner_id(&headers)?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_RECENT_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT);
    Ok(Json(state.store.recent_queries(&owner, limit).await?))
}

async fn handle_query_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<QueryStats>, AppError> {
    let owner = owner_id(&headers)?;
    Ok(Json(state.store.query_stats(&owner).await?))
}

async fn handle_get_query(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<QueryRecord>, AppError> {
    let owner = owner_id(&headers)?;
    let record = state.store.get_query(&id).await?;
    if record.query.owner_id != owner {
        return Err(not_found(format!("not found: query {}", id)));
    }
    Ok(Json(record))
}
