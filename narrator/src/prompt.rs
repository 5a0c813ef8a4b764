//! Prompt assembly for decision narratives.

use eligibility::{Applicant, Attribution, Decision};

use crate::backend::traits::CompletionRequest;

/// Default scheme named in prompts.
pub const DEFAULT_SCHEME: &str = "PM-KISAN";

const SYSTEM_PROMPT: &str = "You explain welfare eligibility decisions to applicants. \
Use plain language, avoid jargon, and do not invent criteria that are not in the data.";

/// Everything the narrative for one decision is built from.
#[derive(Debug, Clone)]
pub struct NarrativePrompt<'a> {
    pub scheme: &'a str,
    pub applicant: &'a Applicant,
    pub decision: &'a Decision,
    pub attribution: &'a Attribution,
}

impl<'a> NarrativePrompt<'a> {
    pub fn new(
        applicant: &'a Applicant,
        decision: &'a Decision,
        attribution: &'a Attribution,
    ) -> Self {
        Self {
            scheme: DEFAULT_SCHEME,
            applicant,
            decision,
            attribution,
        }
    }

    /// Name a different scheme in the prompt.
    pub fn with_scheme(mut self, scheme: &'a str) -> Self {
        self.scheme = scheme;
        self
    }

    /// Render the user-facing prompt text.
    pub fn render(&self) -> String {
        let mut text = format!(
            "Explain in plain language the eligibility decision for the {} scheme.\n\nApplicant Details:\n",
            self.scheme
        );
        for line in self.applicant.summary_lines() {
            text.push_str("- ");
            text.push_str(&line);
            text.push('\n');
        }

        text.push_str(&format!(
            "\nDecision: {} (confidence {:.2})\n\nFeature contributions toward eligibility (baseline {:.4}):\n",
            self.decision.label().to_uppercase(),
            self.decision.confidence,
            self.attribution.baseline
        ));
        for (feature, value) in self.attribution.contributions() {
            text.push_str(&format!("- {}: {:+.4}\n", feature, value));
        }

        text.push_str(&format!(
            "\nProvide a clear, simple explanation in 2-3 sentences about why this decision was made based on the {} eligibility criteria.",
            self.scheme
        ));
        text
    }

    /// Build the completion request sent to a backend.
    pub fn to_request(&self, max_tokens: u32, temperature: f32) -> CompletionRequest {
        CompletionRequest::user(self.render())
            .with_system(SYSTEM_PROMPT)
            .with_max_tokens(max_tokens)
            .with_temperature(temperature)
    }
}
