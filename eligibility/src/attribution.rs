//! Attribution engine.
//!
//! Explainers report contributions in whatever shape their method produces.
//! [`AttributionEngine`] resolves that shape once, at this boundary, into the
//! canonical [`Attribution`] for the eligible class.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::classifier::{ClassifierError, EligibilityClassifier, POSITIVE_CLASS};
use crate::encoder::{EncodedFeatures, FEATURE_COUNT, FEATURE_NAMES};

/// Tolerance when comparing an explainer's baseline with the classifier's.
const BASELINE_TOLERANCE: f64 = 1e-9;

/// Errors raised while attributing a decision.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AttributionError {
    /// The classifier failed on a blended input
    #[error("Classifier error during attribution: {0}")]
    Classifier(#[from] ClassifierError),

    /// The explainer returned values that cannot be mapped onto the features
    #[error("Malformed attribution: {0}")]
    Malformed(String),
}

/// Contribution values as reported by an attribution method.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributionShape {
    /// One vector per class, indexed `[class][feature]`
    PerClassList(Vec<Vec<f64>>),
    /// Already collapsed across classes, one value per feature
    Scalar(Vec<f64>),
    /// One class vector per feature, indexed `[feature][class]`
    NestedArray(Vec<Vec<f64>>),
}

/// Expected output as reported by an attribution method.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpectedValue {
    /// One expected value per class
    PerClass(Vec<f64>),
    /// Single expected value
    Scalar(f64),
}

/// Raw explainer output, before resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAttribution {
    pub values: AttributionShape,
    pub expected: ExpectedValue,
}

/// An attribution method.
pub trait Explainer: Send + Sync {
    /// Method name recorded with the explanation.
    fn method(&self) -> &str;

    /// Explain one prediction of `classifier`.
    fn explain(
        &self,
        features: &EncodedFeatures,
        classifier: &dyn EligibilityClassifier,
    ) -> Result<RawAttribution, AttributionError>;
}

/// Per-feature contributions for one decision, toward eligibility.
///
/// Positive values pushed the applicant toward eligibility; negative values
/// pushed away. Magnitudes are preserved as the method reported them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    /// Attribution method
    pub method: String,
    /// Feature names, in encoding order
    pub feature_names: Vec<String>,
    /// Contribution per feature, in encoding order
    pub values: Vec<f64>,
    /// Expected eligible-class output the contributions are measured from
    pub baseline: f64,
}

impl Attribution {
    /// `(feature, contribution)` pairs in encoding order.
    pub fn contributions(&self) -> impl Iterator<Item = (&str, f64)> {
        self.feature_names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    /// Contributions keyed by feature name.
    pub fn by_feature(&self) -> BTreeMap<String, f64> {
        self.contributions()
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }

    /// Contribution of a single feature.
    pub fn get(&self, feature: &str) -> Option<f64> {
        self.contributions()
            .find(|(name, _)| *name == feature)
            .map(|(_, value)| value)
    }

    /// Baseline plus all contributions.
    pub fn reconstructed_output(&self) -> f64 {
        self.baseline + self.values.iter().sum::<f64>()
    }
}

/// Resolves explainer output into [`Attribution`]s.
pub struct AttributionEngine {
    explainer: Arc<dyn Explainer>,
}

impl AttributionEngine {
    /// Create an engine over an attribution method.
    pub fn new(explainer: Arc<dyn Explainer>) -> Self {
        Self { explainer }
    }

    /// Attribute one decision.
    pub fn attribute(
        &self,
        features: &EncodedFeatures,
        classifier: &dyn EligibilityClassifier,
    ) -> Result<Attribution, AttributionError> {
        let raw = self.explainer.explain(features, classifier)?;
        let values = resolve_values(raw.values)?;
        let reported = resolve_expected(&raw.expected)?;

        let baseline = classifier.expected_baseline();
        if (reported - baseline).abs() > BASELINE_TOLERANCE {
            warn!(
                method = self.explainer.method(),
                reported,
                baseline,
                "Explainer baseline differs from classifier baseline"
            );
        }

        let attribution = Attribution {
            method: self.explainer.method().to_string(),
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            values,
            baseline,
        };
        debug!(
            method = %attribution.method,
            output = attribution.reconstructed_output(),
            "Resolved attribution"
        );
        Ok(attribution)
    }
}

fn resolve_values(shape: AttributionShape) -> Result<Vec<f64>, AttributionError> {
    let values = match shape {
        AttributionShape::PerClassList(mut classes) => match classes.len() {
            0 => return Err(AttributionError::Malformed("no class vectors".to_string())),
            1 => classes.remove(0),
            _ => classes.swap_remove(POSITIVE_CLASS),
        },
        AttributionShape::Scalar(values) => values,
        AttributionShape::NestedArray(rows) => rows
            .into_iter()
            .enumerate()
            .map(|(feature, per_class)| match per_class.len() {
                1 => Ok(per_class[0]),
                n if n > POSITIVE_CLASS => Ok(per_class[POSITIVE_CLASS]),
                _ => Err(AttributionError::Malformed(format!(
                    "feature {} has no class values",
                    feature
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?,
    };

    if values.len() != FEATURE_COUNT {
        return Err(AttributionError::Malformed(format!(
            "expected {} contributions, got {}",
            FEATURE_COUNT,
            values.len()
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(AttributionError::Malformed(
            "non-finite contribution".to_string(),
        ));
    }
    Ok(values)
}

fn resolve_expected(expected: &ExpectedValue) -> Result<f64, AttributionError> {
    match expected {
        ExpectedValue::Scalar(value) => Ok(*value),
        ExpectedValue::PerClass(values) => values
            .get(POSITIVE_CLASS)
            .or_else(|| values.first())
            .copied()
            .ok_or_else(|| AttributionError::Malformed("no expected value".to_string())),
    }
}
