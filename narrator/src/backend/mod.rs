//! LLM Backend abstraction layer.
//!
//! Provides a trait-based interface over text-generation services:
//! - OpenAI-compatible (vLLM, Ollama, OpenAI, etc.)
//! - Google Gemini (`generateContent`)
//! - Mock backend for testing

pub mod gemini;
pub mod mock;
pub mod openai;
pub mod traits;

pub use gemini::GeminiBackend;
pub use mock::MockBackend;
pub use openai::OpenAiBackend;
pub use traits::{CompletionRequest, CompletionResponse, LlmBackend, LlmError};
