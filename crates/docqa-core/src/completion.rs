//! Completion-service abstraction.
//!
//! Defines the [`CompletionClient`] trait the answer pipeline calls with a
//! composed prompt, plus the generation parameters sent with each request.
//!
//! Concrete clients (Gemini over HTTP, the disabled placeholder) live in
//! the `docqa` app crate; tests plug in stubs.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CompletionError;

/// Upper bound on a single completion call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_TEMPERATURE: f32 = 0.3;
pub const DEFAULT_TOP_K: u32 = 40;
pub const DEFAULT_TOP_P: f32 = 0.95;
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 2048;
pub const DEFAULT_SAFETY_THRESHOLD: &str = "BLOCK_MEDIUM_AND_ABOVE";

const SAFETY_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetySetting {
    pub category: String,
    pub threshold: String,
}

/// Sampling and safety parameters for one completion.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
    pub safety: Vec<SafetySetting>,
}

impl GenerationParams {
    /// Default parameters with every harm category at `threshold`.
    pub fn with_safety_threshold(threshold: &str) -> Self {
        Self {
            safety: SAFETY_CATEGORIES
                .iter()
                .map(|c| SafetySetting {
                    category: c.to_string(),
                    threshold: threshold.to_string(),
                })
                .collect(),
            ..Self::default()
        }
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            top_k: DEFAULT_TOP_K,
            top_p: DEFAULT_TOP_P,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            safety: SAFETY_CATEGORIES
                .iter()
                .map(|c| SafetySetting {
                    category: c.to_string(),
                    threshold: DEFAULT_SAFETY_THRESHOLD.to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub params: GenerationParams,
}

/// A text-completion backend.
///
/// Implementations return the generated text or a typed
/// [`CompletionError`]; they never return an empty string as success.
/// The caller enforces the overall timeout.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Model identifier recorded in result metadata.
    fn model_name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}
