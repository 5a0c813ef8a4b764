//! Classifier adapter boundary.
//!
//! The trained model is consumed as a black box: encoded features in, class
//! probabilities out. Everything the pipeline needs on top of that (label,
//! confidence, baseline) is derived here so concrete models stay small.

use serde::{Deserialize, Serialize};

use crate::encoder::EncodedFeatures;

/// Index of the "not eligible" class.
pub const NEGATIVE_CLASS: usize = 0;

/// Index of the "eligible" class.
pub const POSITIVE_CLASS: usize = 1;

/// Errors from an opaque classifier.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClassifierError {
    /// Model artifact could not be loaded or is inconsistent
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// Inference failed
    #[error("Inference failed: {0}")]
    Inference(String),
}

/// Probability of each class, `[not eligible, eligible]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities(pub [f64; 2]);

impl ClassProbabilities {
    /// Probability of the eligible class.
    pub fn eligible(&self) -> f64 {
        self.0[POSITIVE_CLASS]
    }

    /// Probability of the not-eligible class.
    pub fn not_eligible(&self) -> f64 {
        self.0[NEGATIVE_CLASS]
    }

    /// Probability of a class by index.
    pub fn class(&self, index: usize) -> f64 {
        self.0[index]
    }
}

/// Outcome of classifying one applicant. Never mutated after creation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether the applicant is eligible
    pub eligible: bool,
    /// Probability of the predicted class (0.0 - 1.0)
    pub confidence: f64,
}

impl Decision {
    /// Derive a decision from class probabilities.
    ///
    /// Ties go to the negative class.
    pub fn from_probabilities(probabilities: ClassProbabilities) -> Self {
        let eligible = probabilities.eligible() > probabilities.not_eligible();
        let confidence = probabilities
            .eligible()
            .max(probabilities.not_eligible())
            .clamp(0.0, 1.0);
        Self {
            eligible,
            confidence,
        }
    }

    /// Label written to the ledger.
    pub fn label(&self) -> &'static str {
        if self.eligible {
            "Eligible"
        } else {
            "Not Eligible"
        }
    }
}

/// Opaque binary eligibility classifier.
///
/// Implementations must be side-effect free. Calls may be CPU heavy; callers
/// running on an async runtime should move them off the executor.
pub trait EligibilityClassifier: Send + Sync {
    /// Identifier of the model (e.g., artifact fingerprint).
    fn id(&self) -> &str;

    /// Class probabilities for one encoded applicant.
    fn predict_proba(&self, features: &EncodedFeatures)
        -> Result<ClassProbabilities, ClassifierError>;

    /// Expected eligible-class output over the model's reference data.
    ///
    /// Attributions are measured relative to this value, so it must match the
    /// baseline reported by the attribution method used with this model.
    fn expected_baseline(&self) -> f64;

    /// Reference rows the baseline was computed over.
    fn background(&self) -> &[EncodedFeatures];

    /// Classify one encoded applicant.
    fn classify(&self, features: &EncodedFeatures) -> Result<Decision, ClassifierError> {
        let probabilities = self.predict_proba(features)?;
        Ok(Decision::from_probabilities(probabilities))
    }
}
