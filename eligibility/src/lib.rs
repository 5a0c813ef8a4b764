//! Eligibility decisions for welfare scheme applicants.
//!
//! The three model-facing stages of a decision live here:
//!
//! - [`FeatureEncoder`]: maps raw applicant attributes onto the fixed feature vector
//! - [`EligibilityClassifier`]: opaque binary classifier, with [`ForestClassifier`] as
//!   the tree-ensemble adapter for exported models
//! - [`AttributionEngine`]: resolves per-feature contributions for the eligible class
//!
//! # Architecture
//!
//! ```text
//! Applicant ──► FeatureEncoder ──► EncodedFeatures
//!                                       │
//!                    ┌──────────────────┴──────────────────┐
//!                    ▼                                     ▼
//!          EligibilityClassifier ◄──────────────── AttributionEngine
//!             (Decision)                      (Explainer ─► Attribution)
//! ```

pub mod applicant;
pub mod attribution;
pub mod classifier;
pub mod encoder;
pub mod forest;
pub mod shapley;

// Re-export main types
pub use applicant::Applicant;
pub use attribution::{
    Attribution, AttributionEngine, AttributionError, AttributionShape, ExpectedValue, Explainer,
    RawAttribution,
};
pub use classifier::{ClassProbabilities, ClassifierError, Decision, EligibilityClassifier};
pub use encoder::{CategoryMapping, EncodeError, EncodedFeatures, FeatureEncoder, FEATURE_NAMES};
pub use forest::{DecisionTree, ForestArtifact, ForestClassifier, TreeNode};
pub use shapley::ShapleyExplainer;
