//! Narrator - plain-language explanations of eligibility decisions
//!
//! Provides:
//! - Trait-based LLM backends (OpenAI-compatible, Gemini, mock)
//! - Prompt assembly from applicant, decision and attribution
//! - A generator whose failures are explicit, with a deterministic fallback
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         NarrativeGenerator              │
//! │  (prompt + timeout + fallback text)     │
//! └────────────────┬────────────────────────┘
//!                  │
//!                  ▼
//!           ┌─────────────┐
//!           │ LlmBackend  │
//!           │ (OpenAI /   │
//!           │  Gemini)    │
//!           └─────────────┘
//! ```

pub mod backend;
pub mod generator;
pub mod prompt;

// Re-export main types for convenience
pub use backend::traits::{
    CompletionRequest, CompletionResponse, FinishReason, LlmBackend, LlmError,
};
pub use backend::{GeminiBackend, MockBackend, OpenAiBackend};
pub use generator::{
    Narration, Narrative, NarrativeGenerationFailed, NarrativeGenerator, NarrativeSource,
};
pub use prompt::NarrativePrompt;
