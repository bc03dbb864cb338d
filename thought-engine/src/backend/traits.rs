//! Core traits for generation backends.
//!
//! This module defines the `GenerationEngine` trait - the abstraction over
//! the model server that turns a conversation window into new content.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::conversation::ConversationWindow;

/// Error types for engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Backend is not available
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Request failed
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Rate limited by the backend
    #[error("Rate limited, retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    /// Network error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Parsing error
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Core trait for generation engines.
///
/// Token ids are opaque to the caller; only the engine that produced them
/// can turn them back into text.
#[async_trait]
pub trait GenerationEngine: Send + Sync {
    /// Get the backend identifier (e.g., model name).
    fn id(&self) -> &str;

    /// Produce one response to the window's trailing prompt.
    ///
    /// The same window and seed should yield the same text.
    async fn complete(
        &self,
        window: &ConversationWindow,
        seed: u64,
    ) -> Result<Completion, EngineError>;

    /// Encode text into token ids.
    async fn tokenize(&self, text: &str) -> Result<Vec<u32>, EngineError>;

    /// Decode token ids into text.
    async fn detokenize(&self, tokens: &[u32]) -> Result<String, EngineError>;

    /// Generate one response and return it as tokens.
    ///
    /// Token-level form of the engine contract for callers that only handle
    /// ids. The commit loop in `thoughtchain-node` does not use it: it calls
    /// `complete` and `tokenize` separately, with its cursor check between.
    async fn generate(
        &self,
        window: &ConversationWindow,
        seed: u64,
    ) -> Result<Vec<u32>, EngineError> {
        let completion = self.complete(window, seed).await?;
        self.tokenize(&completion.text).await
    }
}

/// Response from a generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// Generated text
    pub text: String,
    /// Why generation stopped
    pub finish_reason: FinishReason,
}

impl Completion {
    /// A completion that stopped naturally.
    pub fn stop(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finish_reason: FinishReason::Stop,
        }
    }
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop (end of response or stop sequence)
    Stop,
    /// Hit max tokens limit
    Length,
}

/// Sampling parameters shared by HTTP backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Temperature (0.0-2.0)
    pub temperature: Option<f32>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            max_tokens: Some(512),
            temperature: None,
        }
    }
}

impl SamplingParams {
    /// Set temperature.
    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp.clamp(0.0, 2.0));
        self
    }

    /// Set max tokens.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }
}
