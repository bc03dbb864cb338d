//! Generation backend abstraction layer.
//!
//! Provides a trait-based interface over the model server:
//! - llama.cpp server (chat completions plus tokenizer routes)
//! - Mock backend for testing

pub mod llama;
pub mod mock;
pub mod traits;

pub use llama::LlamaServerEngine;
pub use mock::MockEngine;
pub use traits::{Completion, EngineError, FinishReason, GenerationEngine, SamplingParams};
