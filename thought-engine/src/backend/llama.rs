//! llama.cpp server backend.
//!
//! Talks to `llama-server` (or any server exposing the same routes):
//! - `POST /v1/chat/completions` with a `seed`
//! - `POST /tokenize`
//! - `POST /detokenize`
//!
//! Tokenization goes through the server so token ids always belong to the
//! loaded model's vocabulary.

use async_trait::async_trait;
use reqwest::{header, Client, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::traits::*;
use crate::conversation::ConversationWindow;

/// llama.cpp-compatible backend.
pub struct LlamaServerEngine {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    sampling: SamplingParams,
}

impl LlamaServerEngine {
    /// Create a new backend for a server at `base_url` (no trailing `/v1`).
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, EngineError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| EngineError::Unavailable(format!("building HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            sampling: SamplingParams::default(),
        })
    }

    /// Create a backend pointing to a local llama-server.
    pub fn local(port: u16, model: &str) -> Result<Self, EngineError> {
        Self::new(format!("http://localhost:{}", port), model, None)
    }

    /// Set sampling parameters.
    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response, EngineError> {
        let mut request = self.client.post(self.url(path));
        if let Some(key) = &self.api_key {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", key));
        }

        let response = request
            .json(body)
            .send()
            .await
            .map_err(|e| EngineError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                return Err(EngineError::RateLimited { retry_after_ms: None });
            }
            if status.as_u16() == 503 {
                return Err(EngineError::Unavailable(body));
            }

            return Err(EngineError::RequestFailed(format!("HTTP {}: {}", status, body)));
        }

        Ok(response)
    }
}

/// Chat completion request body.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    seed: u64,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageResponse,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct TokenizeRequest<'a> {
    content: &'a str,
    add_special: bool,
}

#[derive(Debug, Deserialize)]
struct TokenizeResponse {
    tokens: Vec<u32>,
}

#[derive(Debug, Serialize)]
struct DetokenizeRequest<'a> {
    tokens: &'a [u32],
}

#[derive(Debug, Deserialize)]
struct DetokenizeResponse {
    content: String,
}

#[async_trait]
impl GenerationEngine for LlamaServerEngine {
    fn id(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        window: &ConversationWindow,
        seed: u64,
    ) -> Result<Completion, EngineError> {
        let turns = window.messages();
        let messages = turns
            .iter()
            .map(|turn| ChatMessage {
                role: turn.role.as_str(),
                content: turn.content.as_str(),
            })
            .collect();

        let chat_request = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: self.sampling.max_tokens,
            temperature: self.sampling.temperature,
            seed,
            stream: false,
        };

        debug!(model = %self.model, turns = turns.len(), seed, "Requesting completion");

        let chat_response: ChatResponse = self
            .post("/v1/chat/completions", &chat_request)
            .await?
            .json()
            .await
            .map_err(|e| EngineError::ParseError(e.to_string()))?;

        let choice = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::ParseError("No choices in response".to_string()))?;

        let finish_reason = match choice.finish_reason.as_deref() {
            Some("length") => FinishReason::Length,
            _ => FinishReason::Stop,
        };

        Ok(Completion {
            text: choice.message.content.unwrap_or_default(),
            finish_reason,
        })
    }

    async fn tokenize(&self, text: &str) -> Result<Vec<u32>, EngineError> {
        let body = TokenizeRequest {
            content: text,
            add_special: false,
        };
        let response: TokenizeResponse = self
            .post("/tokenize", &body)
            .await?
            .json()
            .await
            .map_err(|e| EngineError::ParseError(e.to_string()))?;
        Ok(response.tokens)
    }

    async fn detokenize(&self, tokens: &[u32]) -> Result<String, EngineError> {
        let response: DetokenizeResponse = self
            .post("/detokenize", &DetokenizeRequest { tokens })
            .await?
            .json()
            .await
            .map_err(|e| EngineError::ParseError(e.to_string()))?;
        Ok(response.content)
    }
}
