//! Mock generation backend for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use super::traits::*;
use crate::conversation::ConversationWindow;

type CompleteHook = Box<dyn Fn(&ConversationWindow, u64) + Send + Sync>;

/// Mock engine for testing.
///
/// Tokenizes at byte level so that `detokenize(tokenize(s)) == s`. Replies
/// are taken from a script queue, falling back to a fixed response.
pub struct MockEngine {
    model_id: String,
    available: AtomicBool,
    response_content: String,
    script: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<(ConversationWindow, u64)>>,
    call_count: AtomicU32,
    hook: Option<CompleteHook>,
}

impl MockEngine {
    /// Create a new mock engine.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            available: AtomicBool::new(true),
            response_content: "Mock response".to_string(),
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            call_count: AtomicU32::new(0),
            hook: None,
        }
    }

    /// Set the fallback response content.
    pub fn with_response(mut self, content: impl Into<String>) -> Self {
        self.response_content = content.into();
        self
    }

    /// Queue responses returned in order before the fallback.
    pub fn with_script<I, S>(self, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Ok(mut script) = self.script.lock() {
            script.extend(replies.into_iter().map(Into::into));
        }
        self
    }

    /// Set availability.
    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    /// Run a callback inside every `complete` call, before it returns.
    ///
    /// Lets tests mutate shared state while generation is "in flight".
    pub fn with_hook(
        mut self,
        hook: impl Fn(&ConversationWindow, u64) + Send + Sync + 'static,
    ) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Get the number of times complete was called.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Windows and seeds seen so far, in call order.
    pub fn calls(&self) -> Vec<(ConversationWindow, u64)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new("mock-model")
    }
}

#[async_trait]
impl GenerationEngine for MockEngine {
    fn id(&self) -> &str {
        &self.model_id
    }

    async fn complete(
        &self,
        window: &ConversationWindow,
        seed: u64,
    ) -> Result<Completion, EngineError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if !self.available.load(Ordering::SeqCst) {
            return Err(EngineError::Unavailable("Mock engine disabled".to_string()));
        }

        if let Ok(mut calls) = self.calls.lock() {
            calls.push((window.clone(), seed));
        }

        if let Some(hook) = &self.hook {
            hook(window, seed);
        }

        let text = self
            .script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| self.response_content.clone());

        Ok(Completion::stop(text))
    }

    async fn tokenize(&self, text: &str) -> Result<Vec<u32>, EngineError> {
        Ok(text.bytes().map(u32::from).collect())
    }

    async fn detokenize(&self, tokens: &[u32]) -> Result<String, EngineError> {
        let bytes = tokens
            .iter()
            .map(|&t| {
                u8::try_from(t).map_err(|_| EngineError::ParseError(format!("token {} out of range", t)))
            })
            .collect::<Result<Vec<u8>, _>>()?;
        String::from_utf8(bytes).map_err(|e| EngineError::ParseError(e.to_string()))
    }
}
