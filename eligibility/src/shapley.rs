//! Exact Shapley value explainer.
//!
//! With five features there are only 32 coalitions, so contributions are
//! computed exactly instead of sampled. A coalition's value is the model output
//! with the coalition's features taken from the applicant and the remaining
//! features taken from each background row, averaged over the background.

use crate::attribution::{
    AttributionError, AttributionShape, ExpectedValue, Explainer, RawAttribution,
};
use crate::classifier::EligibilityClassifier;
use crate::encoder::{EncodedFeatures, FEATURE_COUNT};

const COALITIONS: usize = 1 << FEATURE_COUNT;
const CLASSES: usize = 2;

/// Interventional Shapley values over the classifier's background sample.
#[derive(Debug, Clone)]
pub struct ShapleyExplainer {
    weights: [f64; FEATURE_COUNT],
}

impl Default for ShapleyExplainer {
    fn default() -> Self {
        Self::new()
    }
}

impl ShapleyExplainer {
    /// Create an explainer.
    pub fn new() -> Self {
        // weight(s) = s! (n - s - 1)! / n!
        let factorial = |k: usize| (1..=k).map(|i| i as f64).product::<f64>();
        let n = FEATURE_COUNT;
        let mut weights = [0.0; FEATURE_COUNT];
        for (size, weight) in weights.iter_mut().enumerate() {
            *weight = factorial(size) * factorial(n - size - 1) / factorial(n);
        }
        Self { weights }
    }
}

impl Explainer for ShapleyExplainer {
    fn method(&self) -> &str {
        "exact-shapley"
    }

    fn explain(
        &self,
        features: &EncodedFeatures,
        classifier: &dyn EligibilityClassifier,
    ) -> Result<RawAttribution, AttributionError> {
        let background = classifier.background();
        if background.is_empty() {
            return Err(AttributionError::Malformed(
                "classifier has no background rows".to_string(),
            ));
        }

        let mut value = [[0.0f64; COALITIONS]; CLASSES];
        for mask in 0..COALITIONS {
            let mut sum = [0.0; CLASSES];
            for row in background {
                let p = classifier.predict_proba(&features.blend(row, mask as u32))?;
                for (class, total) in sum.iter_mut().enumerate() {
                    *total += p.class(class);
                }
            }
            for class in 0..CLASSES {
                value[class][mask] = sum[class] / background.len() as f64;
            }
        }

        let mut phi = vec![vec![0.0; FEATURE_COUNT]; CLASSES];
        for feature in 0..FEATURE_COUNT {
            let bit = 1usize << feature;
            for mask in (0..COALITIONS).filter(|m| m & bit == 0) {
                let weight = self.weights[mask.count_ones() as usize];
                for class in 0..CLASSES {
                    phi[class][feature] += weight * (value[class][mask | bit] - value[class][mask]);
                }
            }
        }

        Ok(RawAttribution {
            values: AttributionShape::PerClassList(phi),
            expected: ExpectedValue::PerClass(vec![value[0][0], value[1][0]]),
        })
    }
}
