//! Completion clients.
//!
//! Concrete [`CompletionClient`] implementations selected by
//! `[completion] provider`:
//!
//! | Provider | Client | Notes |
//! |----------|--------|-------|
//! | `gemini` | [`GeminiClient`] | `generateContent` over HTTPS, API key from the environment |
//! | `disabled` | [`DisabledClient`] | Every call fails with `ServiceError` |
//!
//! No retries happen here: a 429 surfaces as `RateLimited`, other non-2xx
//! statuses and transport errors as `ServiceError`, and a client-side
//! timeout as `Timeout`.

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use docqa_core::completion::{CompletionClient, CompletionRequest};
use docqa_core::error::CompletionError;

use crate::config::CompletionConfig;

/// Client for the Gemini `generateContent` API.
pub struct GeminiClient {
    http: reqwest::Client,
    model: String,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl GeminiClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key environment variable named by
    /// `completion.api_key_env` is unset or empty.
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let api_key = match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => key,
            _ => bail!("{} environment variable not set", config.api_key_env),
        };
        let timeout = Duration::from_secs(config.timeout_secs);
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl CompletionClient for GeminiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let body = request_body(request);

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Timeout(self.timeout)
                } else {
                    CompletionError::ServiceError(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let body_text = response.text().await.unwrap_or_default();
            return Err(CompletionError::RateLimited(body_text));
        }
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(CompletionError::ServiceError(format!(
                "Gemini API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                CompletionError::Timeout(self.timeout)
            } else {
                CompletionError::ServiceError(e.to_string())
            }
        })?;
        parse_response(&json)
    }
}

/// Placeholder used when no provider is configured.
pub struct DisabledClient;

#[async_trait]
impl CompletionClient for DisabledClient {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<String, CompletionError> {
        Err(CompletionError::ServiceError(
            "completion provider is disabled".to_string(),
        ))
    }
}

/// Create the client selected by `config.provider`.
pub fn create_client(config: &CompletionConfig) -> Result<Box<dyn CompletionClient>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledClient)),
        "gemini" => Ok(Box::new(GeminiClient::new(config)?)),
        other => bail!("Unknown completion provider: {}", other),
    }
}

fn request_body(request: &CompletionRequest) -> serde_json::Value {
    let params = &request.params;
    serde_json::json!({
        "contents": [{
            "parts": [{ "text": request.prompt }],
        }],
        "generationConfig": {
            "temperature": params.temperature,
            "topK": params.top_k,
            "topP": params.top_p,
            "maxOutputTokens": params.max_output_tokens,
        },
        "safetySettings": params.safety,
    })
}

/// Extract the answer text from a `generateContent` response.
///
/// Joins the text parts of the first candidate. A response with no
/// candidate, or only blank text, is [`CompletionError::EmptyCompletion`].
pub fn parse_response(json: &serde_json::Value) -> Result<String, CompletionError> {
    let candidate = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or(CompletionError::EmptyCompletion)?;

    let text: String = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(CompletionError::EmptyCompletion);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::completion::GenerationParams;
    use serde_json::json;

    #[test]
    fn test_parse_joins_text_parts() {
        let json = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "The policy " }, { "text": "covers flood." }] }
            }]
        });
        assert_eq!(parse_response(&json).unwrap(), "The policy covers flood.");
    }

    #[test]
    fn test_parse_no_candidates_is_empty_completion() {
        let json = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        assert_eq!(
            parse_response(&json).unwrap_err(),
            CompletionError::EmptyCompletion
        );
        assert_eq!(
            parse_response(&json!({ "candidates": [] })).unwrap_err(),
            CompletionError::EmptyCompletion
        );
    }

    #[test]
    fn test_parse_blank_text_is_empty_completion() {
        let json = json!({ "candidates": [{ "content": { "parts": [{ "text": "  " }] } }] });
        assert_eq!(
            parse_response(&json).unwrap_err(),
            CompletionError::EmptyCompletion
        );
    }

    #[test]
    fn test_request_body_passes_params_through() {
        let request = CompletionRequest {
            prompt: "hello".to_string(),
            params: GenerationParams::default(),
        };
        let body = request_body(&request);
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(body["generationConfig"]["topK"], 40);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 2048);
        assert_eq!(
            body["safetySettings"][0]["threshold"],
            "BLOCK_MEDIUM_AND_ABOVE"
        );
        assert_eq!(body["safetySettings"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_disabled_client_fails() {
        let request = CompletionRequest {
            prompt: "hello".to_string(),
            params: GenerationParams::default(),
        };
        let err = DisabledClient.complete(&request).await.unwrap_err();
        assert!(matches!(err, CompletionError::ServiceError(_)));
    }

    #[test]
    fn test_gemini_requires_api_key() {
        let config = CompletionConfig {
            provider: "gemini".to_string(),
            api_key_env: "DOCQA_TEST_UNSET_KEY_VAR".to_string(),
            ..CompletionConfig::default()
        };
        let err = GeminiClient::new(&config).err().unwrap();
        assert!(err.to_string().contains("DOCQA_TEST_UNSET_KEY_VAR"));
    }
}
