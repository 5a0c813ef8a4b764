//! Mock LLM backend for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::traits::*;

/// Mock backend for testing.
///
/// Configurable responses, latency and failure behavior for unit tests.
pub struct MockBackend {
    model_id: String,
    available: AtomicBool,
    response_content: String,
    finish_reason: FinishReason,
    delay: Option<Duration>,
    call_count: AtomicU32,
    last_request: Mutex<Option<CompletionRequest>>,
}

impl MockBackend {
    /// Create a new mock backend.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            available: AtomicBool::new(true),
            response_content: "Mock response".to_string(),
            finish_reason: FinishReason::Stop,
            delay: None,
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Set the response content.
    pub fn with_response(mut self, content: impl Into<String>) -> Self {
        self.response_content = content.into();
        self
    }

    /// When false, every completion fails with `LlmError::Unavailable`.
    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    /// Report the given finish reason on every completion.
    pub fn with_finish_reason(mut self, reason: FinishReason) -> Self {
        self.finish_reason = reason;
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get the number of times complete was called.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Reset the call count.
    pub fn reset_call_count(&self) {
        self.call_count.store(0, Ordering::SeqCst);
    }

    /// The most recent request passed to `complete`.
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.last_request
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or(None)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new("mock-model")
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    fn id(&self) -> &str {
        &self.model_id
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if let Ok(mut slot) = self.last_request.lock() {
            *slot = Some(request.clone());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if !self.available.load(Ordering::SeqCst) {
            return Err(LlmError::Unavailable("Mock backend disabled".to_string()));
        }

        // Estimate token counts
        let prompt_tokens: u32 = request
            .messages
            .iter()
            .map(|m| m.content.len() as u32 / 4)
            .sum();

        let completion_tokens = self.response_content.len() as u32 / 4;

        Ok(CompletionResponse {
            content: self.response_content.clone(),
            finish_reason: self.finish_reason,
            usage: Usage {
                prompt_tokens,
                completion_tokens,
            },
        })
    }
}
