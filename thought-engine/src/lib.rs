//! Thoughtchain Engine - generation backends
//!
//! Provides the content-generation side of the thoughtchain agent:
//! - Trait-based generation backends (llama.cpp server, mock)
//! - Typed conversation windows handed to a backend in one call
//! - Tokenize/detokenize through the backend's own vocabulary
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │ ConversationWindow   │
//! │ (system + turns)     │
//! └──────────┬───────────┘
//!            ▼
//! ┌──────────────────────┐
//! │ GenerationEngine     │
//! │ (llama-server/Mock)  │
//! └──────────────────────┘
//! ```

pub mod backend;
pub mod conversation;

// Re-export main types for convenience
pub use backend::traits::{Completion, EngineError, FinishReason, GenerationEngine, SamplingParams};
pub use backend::{LlamaServerEngine, MockEngine};
pub use conversation::{ConversationWindow, Role, Turn};
