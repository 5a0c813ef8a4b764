//! Narrative generation with an explicit, deterministic fallback.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use eligibility::{Applicant, Attribution, Decision};

use crate::backend::traits::{FinishReason, LlmBackend, LlmError};
use crate::prompt::{NarrativePrompt, DEFAULT_SCHEME};

/// Why a narrative could not be generated.
#[derive(Debug, thiserror::Error)]
pub enum NarrativeGenerationFailed {
    #[error("No narrative backend configured")]
    NoBackend,

    #[error("Narrative backend failed: {0}")]
    Backend(#[from] LlmError),

    #[error("Narrative backend timed out after {0:?}")]
    Timeout(Duration),

    #[error("Narrative backend returned empty text")]
    Empty,

    #[error("Narrative withheld by content filter")]
    Filtered,
}

/// Where a narrative's text came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NarrativeSource {
    Generated { model: String },
    Fallback,
}

/// Plain-language explanation of one decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Narrative {
    pub text: String,
    pub source: NarrativeSource,
}

impl Narrative {
    pub fn is_fallback(&self) -> bool {
        self.source == NarrativeSource::Fallback
    }
}

/// Outcome of [`NarrativeGenerator::narrate`].
#[derive(Debug)]
pub struct Narration {
    pub narrative: Narrative,
    /// Why a configured backend's output was replaced by the fallback.
    pub failure: Option<NarrativeGenerationFailed>,
}

impl Narration {
    pub fn is_degraded(&self) -> bool {
        self.failure.is_some()
    }
}

/// Turns decisions into narratives through an optional LLM backend.
pub struct NarrativeGenerator {
    backend: Option<Arc<dyn LlmBackend>>,
    timeout: Duration,
    max_tokens: u32,
    temperature: f32,
    scheme: String,
}

impl NarrativeGenerator {
    /// Create a generator. `None` means every narrative falls back.
    pub fn new(backend: Option<Arc<dyn LlmBackend>>, timeout: Duration) -> Self {
        Self {
            backend,
            timeout,
            max_tokens: 256,
            temperature: 0.3,
            scheme: DEFAULT_SCHEME.to_string(),
        }
    }

    /// A generator with no backend.
    pub fn disabled() -> Self {
        Self::new(None, Duration::from_secs(1))
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Generate a narrative, surfacing every failure.
    pub async fn generate(
        &self,
        applicant: &Applicant,
        decision: &Decision,
        attribution: &Attribution,
    ) -> Result<Narrative, NarrativeGenerationFailed> {
        let backend = self
            .backend
            .as_ref()
            .ok_or(NarrativeGenerationFailed::NoBackend)?;

        let request = NarrativePrompt::new(applicant, decision, attribution)
            .with_scheme(&self.scheme)
            .to_request(self.max_tokens, self.temperature);

        let response = tokio::time::timeout(self.timeout, backend.complete(request))
            .await
            .map_err(|_| NarrativeGenerationFailed::Timeout(self.timeout))??;

        if response.finish_reason == FinishReason::ContentFilter {
            return Err(NarrativeGenerationFailed::Filtered);
        }

        let text = response.content.trim();
        if text.is_empty() {
            return Err(NarrativeGenerationFailed::Empty);
        }

        debug!(
            model = backend.id(),
            tokens = response.usage.total(),
            "Generated narrative"
        );
        Ok(Narrative {
            text: text.to_string(),
            source: NarrativeSource::Generated {
                model: backend.id().to_string(),
            },
        })
    }

    /// Deterministic narrative stating only the outcome.
    pub fn fallback(decision: &Decision) -> Narrative {
        Narrative {
            text: format!("Decision: {} based on model prediction.", decision.label()),
            source: NarrativeSource::Fallback,
        }
    }

    /// Generate a narrative, substituting the fallback on failure.
    ///
    /// An unconfigured backend is not a failure; its fallback carries no
    /// reason.
    pub async fn narrate(
        &self,
        applicant: &Applicant,
        decision: &Decision,
        attribution: &Attribution,
    ) -> Narration {
        match self.generate(applicant, decision, attribution).await {
            Ok(narrative) => Narration {
                narrative,
                failure: None,
            },
            Err(NarrativeGenerationFailed::NoBackend) => Narration {
                narrative: Self::fallback(decision),
                failure: None,
            },
            Err(e) => {
                warn!(error = %e, degraded = true, "Narrative generation failed, using fallback");
                Narration {
                    narrative: Self::fallback(decision),
                    failure: Some(e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;

    fn fixture() -> (Applicant, Decision, Attribution) {
        let applicant = Applicant {
            national_id: 111_122_223_333,
            name: "Meena".to_string(),
            age: 52,
            group: "General".to_string(),
            income: 320_000.0,
            land_ownership: true,
            housing: "pucca".to_string(),
        };
        let decision = Decision {
            eligible: false,
            confidence: 0.9,
        };
        let attribution = Attribution {
            method: "exact-shapley".to_string(),
            feature_names: eligibility::FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            values: vec![0.0, 0.0, -0.2, -0.15, -0.05],
            baseline: 0.5,
        };
        (applicant, decision, attribution)
    }

    #[test]
    fn test_fallback_text() {
        let eligible = Decision {
            eligible: true,
            confidence: 0.7,
        };
        let narrative = NarrativeGenerator::fallback(&eligible);
        assert_eq!(narrative.text, "Decision: Eligible based on model prediction.");
        assert!(narrative.is_fallback());

        let (_, rejected, _) = fixture();
        assert_eq!(
            NarrativeGenerator::fallback(&rejected).text,
            "Decision: Not Eligible based on model prediction."
        );
    }

    #[tokio::test]
    async fn test_generate_with_backend() {
        let backend =
            Arc::new(MockBackend::new("mock-narrator").with_response("  High income. \n"));
        let generator = NarrativeGenerator::new(Some(backend.clone()), Duration::from_secs(1));
        let (applicant, decision, attribution) = fixture();

        let narrative = generator
            .generate(&applicant, &decision, &attribution)
            .await
            .unwrap();

        assert_eq!(narrative.text, "High income.");
        assert_eq!(
            narrative.source,
            NarrativeSource::Generated {
                model: "mock-narrator".to_string()
            }
        );
        assert_eq!(backend.call_count(), 1);
        let sent = backend.last_request().unwrap();
        assert!(sent.user_text().contains("NOT ELIGIBLE"));
    }

    #[tokio::test]
    async fn test_no_backend() {
        let generator = NarrativeGenerator::disabled();
        let (applicant, decision, attribution) = fixture();

        let result = generator.generate(&applicant, &decision, &attribution).await;
        assert!(matches!(result, Err(NarrativeGenerationFailed::NoBackend)));

        let narration = generator.narrate(&applicant, &decision, &attribution).await;
        assert!(narration.narrative.is_fallback());
        assert!(!narration.is_degraded());
    }

    #[tokio::test]
    async fn test_backend_failure_falls_back() {
        let backend = Arc::new(MockBackend::default().with_available(false));
        let generator = NarrativeGenerator::new(Some(backend), Duration::from_secs(1));
        let (applicant, decision, attribution) = fixture();

        let result = generator.generate(&applicant, &decision, &attribution).await;
        assert!(matches!(result, Err(NarrativeGenerationFailed::Backend(_))));

        let narration = generator.narrate(&applicant, &decision, &attribution).await;
        assert_eq!(narration.narrative, NarrativeGenerator::fallback(&decision));
        assert!(matches!(
            narration.failure,
            Some(NarrativeGenerationFailed::Backend(LlmError::Unavailable(_)))
        ));
    }

    #[tokio::test]
    async fn test_timeout() {
        let backend = Arc::new(MockBackend::default().with_delay(Duration::from_millis(200)));
        let generator = NarrativeGenerator::new(Some(backend), Duration::from_millis(20));
        let (applicant, decision, attribution) = fixture();

        let result = generator.generate(&applicant, &decision, &attribution).await;
        assert!(matches!(result, Err(NarrativeGenerationFailed::Timeout(_))));

        let narration = generator.narrate(&applicant, &decision, &attribution).await;
        assert!(narration.narrative.is_fallback());
        assert!(matches!(
            narration.failure,
            Some(NarrativeGenerationFailed::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_generated_narration_is_not_degraded() {
        let backend = Arc::new(MockBackend::default().with_response("Meena does not qualify."));
        let generator = NarrativeGenerator::new(Some(backend), Duration::from_secs(1));
        let (applicant, decision, attribution) = fixture();

        let narration = generator.narrate(&applicant, &decision, &attribution).await;
        assert!(!narration.is_degraded());
        assert_eq!(narration.narrative.text, "Meena does not qualify.");
    }

    #[tokio::test]
    async fn test_empty_and_filtered() {
        let (applicant, decision, attribution) = fixture();

        let empty = NarrativeGenerator::new(
            Some(Arc::new(MockBackend::default().with_response("   "))),
            Duration::from_secs(1),
        );
        assert!(matches!(
            empty.generate(&applicant, &decision, &attribution).await,
            Err(NarrativeGenerationFailed::Empty)
        ));

        let filtered = NarrativeGenerator::new(
            Some(Arc::new(
                MockBackend::default().with_finish_reason(FinishReason::ContentFilter),
            )),
            Duration::from_secs(1),
        );
        assert!(matches!(
            filtered.generate(&applicant, &decision, &attribution).await,
            Err(NarrativeGenerationFailed::Filtered)
        ));
    }
}
