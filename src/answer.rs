//! Query answering pipeline.
//!
//! Coordinates one query end to end:
//!
//! ```text
//! validate → create query (processing)
//!          → candidate chunks (owner) → rank → compose prompt
//!          → completion (bounded by timeout) → confidence
//!          → complete query with result
//! ```
//!
//! Any error after the query is recorded marks it `failed` and is returned
//! to the caller; no result is stored for a failed query. The completion
//! call holds no store transaction while it waits.
//!
//! [`AnswerPipeline::answer_detached`] runs the same work on its own task,
//! so a caller that goes away (an HTTP client disconnecting) does not leave
//! the query stuck in `processing`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::Utc;
use uuid::Uuid;

use docqa_core::completion::{CompletionClient, CompletionRequest, GenerationParams};
use docqa_core::confidence;
use docqa_core::error::{CompletionError, Error, Result, StoreError};
use docqa_core::models::{estimate_tokens, CitedChunk, NewQuery, Query, QueryResult, ResultMetadata};
use docqa_core::prompt::PromptComposer;
use docqa_core::rank::RelevanceRanker;
use docqa_core::store::{DocumentStore, QueryStore};

use crate::completion::create_client;
use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

pub const MAX_QUERY_CHARS: usize = 1000;
pub const MAX_CONTEXT_CHARS: usize = 500;

/// A question from one owner.
#[derive(Debug, Clone)]
pub struct AskRequest {
    pub owner_id: String,
    pub query: String,
    pub context: Option<String>,
}

pub struct AnswerPipeline {
    ranker: RelevanceRanker,
    composer: PromptComposer,
    params: GenerationParams,
    timeout: Duration,
    client: Arc<dyn CompletionClient>,
}

impl AnswerPipeline {
    pub fn new(
        ranker: RelevanceRanker,
        composer: PromptComposer,
        params: GenerationParams,
        timeout: Duration,
        client: Arc<dyn CompletionClient>,
    ) -> Self {
        Self {
            ranker,
            composer,
            params,
            timeout,
            client,
        }
    }

    pub fn from_config(config: &Config, client: Arc<dyn CompletionClient>) -> Self {
        Self::new(
            RelevanceRanker::new(config.retrieval.top_k),
            PromptComposer::new(
                config.prompt.system_role.clone(),
                config.prompt.max_prompt_chars,
            ),
            config.completion.generation_params(),
            Duration::from_secs(config.completion.timeout_secs),
            client,
        )
    }

    /// Answer `request`, persisting the query and its result.
    pub async fn answer<S>(&self, store: &S, request: &AskRequest) -> Result<QueryResult>
    where
        S: DocumentStore + QueryStore + ?Sized,
    {
        let started = Instant::now();
        let new_query = validate(request)?;

        let query = store.create_query(&new_query).await?;
        tracing::info!(query_id = %query.id, owner = %query.owner_id, "query received");

        let outcome = match self.run(store, &query, started).await {
            Ok(result) => store.complete_query(&result).await.map(|_| result).map_err(Error::from),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(result) => {
                tracing::info!(
                    query_id = %query.id,
                    confidence = result.confidence,
                    chunks = result.cited_chunks.len(),
                    elapsed_ms = result.metadata.processing_time_ms,
                    "query completed"
                );
                Ok(result)
            }
            Err(e) => {
                tracing::warn!(query_id = %query.id, error = %e, "query failed");
                if let Err(mark_err) = store.fail_query(&query.id, &e.to_string()).await {
                    tracing::error!(query_id = %query.id, error = %mark_err, "could not mark query failed");
                }
                Err(e)
            }
        }
    }

    /// Run [`answer`](Self::answer) on a spawned task and wait for it.
    ///
    /// Dropping the returned future does not cancel the work: the query
    /// still ends `completed` or `failed`, bounded by the completion timeout.
    pub async fn answer_detached<S>(
        self: Arc<Self>,
        store: Arc<S>,
        request: AskRequest,
    ) -> Result<QueryResult>
    where
        S: DocumentStore + QueryStore + 'static,
    {
        let task = tokio::spawn(async move { self.answer(store.as_ref(), &request).await });
        task.await.map_err(|e| {
            Error::Store(StoreError::StorageFailure(format!(
                "answer task did not finish: {}",
                e
            )))
        })?
    }

    async fn run<S>(&self, store: &S, query: &Query, started: Instant) -> Result<QueryResult>
    where
        S: DocumentStore + ?Sized,
    {
        let candidates = store.candidate_chunks(&query.owner_id).await?;
        let candidate_count = candidates.len();
        let ranked = self.ranker.rank(&query.query_text, candidates);
        tracing::debug!(
            query_id = %query.id,
            candidates = candidate_count,
            ranked = ranked.len(),
            "chunks ranked"
        );

        let prompt = self
            .composer
            .compose(&query.query_text, query.context.as_deref(), &ranked);
        let used = &ranked[..prompt.chunks_included];

        let request = CompletionRequest {
            prompt: prompt.text,
            params: self.params.clone(),
        };
        let answer = tokio::time::timeout(self.timeout, self.client.complete(&request))
            .await
            .map_err(|_| CompletionError::Timeout(self.timeout))??;

        Ok(QueryResult {
            id: Uuid::new_v4().to_string(),
            query_id: query.id.clone(),
            confidence: confidence::score(&answer, used.len()),
            cited_chunks: used.iter().map(CitedChunk::from).collect(),
            metadata: ResultMetadata {
                chunks_considered: used.len(),
                chunks_retrieved: ranked.len(),
                processing_time_ms: started.elapsed().as_millis() as u64,
                model_used: self.client.model_name().to_string(),
                prompt_tokens: estimate_tokens(&request.prompt),
                response_tokens: estimate_tokens(&answer),
            },
            answer,
            created_at: Utc::now(),
        })
    }
}

/// Normalize and bound-check a request.
fn validate(request: &AskRequest) -> Result<NewQuery> {
    let owner_id = request.owner_id.trim();
    if owner_id.is_empty() {
        return Err(Error::InvalidInput("owner id must not be empty".to_string()));
    }

    let query = request.query.trim();
    let query_len = query.chars().count();
    if query_len == 0 {
        return Err(Error::InvalidInput("query must not be empty".to_string()));
    }
    if query_len > MAX_QUERY_CHARS {
        return Err(Error::InvalidInput(format!(
            "query must be at most {} characters",
            MAX_QUERY_CHARS
        )));
    }

    let context = request
        .context
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());
    if let Some(context) = context {
        if context.chars().count() > MAX_CONTEXT_CHARS {
            return Err(Error::InvalidInput(format!(
                "context must be at most {} characters",
                MAX_CONTEXT_CHARS
            )));
        }
    }

    Ok(NewQuery {
        owner_id: owner_id.to_string(),
        query_text: query.to_string(),
        context: context.map(str::to_string),
    })
}

/// `docqa ask <query> --owner <id> [--context <text>]`.
pub async fn run_ask(
    config: &Config,
    owner: &str,
    query: &str,
    context: Option<String>,
) -> anyhow::Result<()> {
    let client: Arc<dyn CompletionClient> = Arc::from(create_client(&config.completion)?);
    let pipeline = AnswerPipeline::from_config(config, client);

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    let result = pipeline
        .answer(
            &store,
            &AskRequest {
                owner_id: owner.to_string(),
                query: query.to_string(),
                context,
            },
        )
        .await
        .with_context(|| "Query failed")?;

    println!("{}", result.answer);
    println!();
    println!("query: {}", result.query_id);
    println!("confidence: {:.2}", result.confidence);
    if result.cited_chunks.is_empty() {
        println!("sources: none");
    } else {
        println!("sources:");
        for cited in &result.cited_chunks {
            println!(
                "  {}. {} (chunk {})",
                cited.rank, cited.document_name, cited.chunk_index
            );
        }
    }

    store.pool().close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ask(query: &str, context: Option<&str>) -> AskRequest {
        AskRequest {
            owner_id: "alice".to_string(),
            query: query.to_string(),
            context: context.map(str::to_string),
        }
    }

    #[test]
    fn test_validate_trims_and_accepts() {
        let q = validate(&ask("  What is covered?  ", Some("   "))).unwrap();
        assert_eq!(q.query_text, "What is covered?");
        assert_eq!(q.context, None);
    }

    #[test]
    fn test_validate_bounds() {
        assert!(matches!(
            validate(&ask("   ", None)),
            Err(Error::InvalidInput(_))
        ));
        assert!(validate(&ask(&"q".repeat(1000), None)).is_ok());
        assert!(matches!(
            validate(&ask(&"q".repeat(1001), None)),
            Err(Error::InvalidInput(_))
        ));
        assert!(validate(&ask("q", Some(&"c".repeat(500)))).is_ok());
        assert!(matches!(
            validate(&ask("q", Some(&"c".repeat(501)))),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_validate_requires_owner() {
        let mut request = ask("q", None);
        request.owner_id = String::new();
        assert!(matches!(validate(&request), Err(Error::InvalidInput(_))));
    }
}
