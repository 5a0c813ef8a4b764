//! Tree-ensemble classifier adapter.
//!
//! Loads a forest of binary decision trees exported from the training
//! environment as JSON and evaluates it natively. The artifact also carries a
//! background sample of encoded rows, which fixes the model's expected output.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::info;

use crate::classifier::{ClassProbabilities, ClassifierError, EligibilityClassifier, POSITIVE_CLASS};
use crate::encoder::{EncodedFeatures, FEATURE_COUNT, FEATURE_NAMES};

/// A node in a decision tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    /// Go `left` when `features[feature] <= threshold`, otherwise `right`
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Class distribution `[not eligible, eligible]` at this leaf
    Leaf { distribution: [f64; 2] },
}

/// One decision tree, nodes stored in an array with the root at index 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Single-split tree (a stump).
    pub fn stump(feature: usize, threshold: f64, left: [f64; 2], right: [f64; 2]) -> Self {
        Self {
            nodes: vec![
                TreeNode::Split {
                    feature,
                    threshold,
                    left: 1,
                    right: 2,
                },
                TreeNode::Leaf { distribution: left },
                TreeNode::Leaf {
                    distribution: right,
                },
            ],
        }
    }

    fn validate(&self, index: usize) -> Result<(), ClassifierError> {
        if self.nodes.is_empty() {
            return Err(ClassifierError::InvalidModel(format!(
                "tree {} has no nodes",
                index
            )));
        }
        for (position, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    left,
                    right,
                    threshold,
                } => {
                    if *feature >= FEATURE_COUNT {
                        return Err(ClassifierError::InvalidModel(format!(
                            "tree {} node {} splits on unknown feature {}",
                            index, position, feature
                        )));
                    }
                    if !threshold.is_finite() {
                        return Err(ClassifierError::InvalidModel(format!(
                            "tree {} node {} has a non-finite threshold",
                            index, position
                        )));
                    }
                    // Children strictly after the parent rules out cycles.
                    for child in [*left, *right] {
                        if child <= position || child >= self.nodes.len() {
                            return Err(ClassifierError::InvalidModel(format!(
                                "tree {} node {} has invalid child {}",
                                index, position, child
                            )));
                        }
                    }
                }
                TreeNode::Leaf { distribution } => {
                    let total: f64 = distribution.iter().sum();
                    if distribution.iter().any(|p| !p.is_finite() || *p < 0.0) || total <= 0.0 {
                        return Err(ClassifierError::InvalidModel(format!(
                            "tree {} node {} has an invalid class distribution",
                            index, position
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn predict(&self, features: &EncodedFeatures) -> [f64; 2] {
        let values = features.values();
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if values[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                TreeNode::Leaf { distribution } => {
                    let total = distribution[0] + distribution[1];
                    return [distribution[0] / total, distribution[1] / total];
                }
            }
        }
    }
}

/// Exported forest model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestArtifact {
    /// Feature names in the order the model expects
    pub feature_names: Vec<String>,
    /// Trees in the ensemble
    pub trees: Vec<DecisionTree>,
    /// Encoded reference rows (typically a sample of the training set)
    pub background: Vec<EncodedFeatures>,
}

/// Forest of decision trees averaged into class probabilities.
#[derive(Debug, Clone)]
pub struct ForestClassifier {
    id: String,
    trees: Vec<DecisionTree>,
    background: Vec<EncodedFeatures>,
    baseline: f64,
}

impl ForestClassifier {
    /// Build a classifier from an artifact, validating its structure.
    pub fn from_artifact(artifact: ForestArtifact) -> Result<Self, ClassifierError> {
        let expected: Vec<String> = FEATURE_NAMES.iter().map(|s| s.to_string()).collect();
        if artifact.feature_names != expected {
            return Err(ClassifierError::InvalidModel(format!(
                "feature names {:?} do not match encoder order {:?}",
                artifact.feature_names, expected
            )));
        }
        if artifact.trees.is_empty() {
            return Err(ClassifierError::InvalidModel("forest has no trees".to_string()));
        }
        if artifact.background.is_empty() {
            return Err(ClassifierError::InvalidModel(
                "forest has no background rows".to_string(),
            ));
        }
        for (index, tree) in artifact.trees.iter().enumerate() {
            tree.validate(index)?;
        }

        let id = fingerprint(&artifact)?;
        let mut classifier = Self {
            id,
            trees: artifact.trees,
            background: artifact.background,
            baseline: 0.0,
        };
        classifier.baseline = classifier
            .background
            .iter()
            .map(|row| classifier.average(row)[POSITIVE_CLASS])
            .sum::<f64>()
            / classifier.background.len() as f64;

        Ok(classifier)
    }

    /// Parse an artifact from JSON.
    pub fn from_json(json: &str) -> Result<Self, ClassifierError> {
        let artifact: ForestArtifact = serde_json::from_str(json)
            .map_err(|e| ClassifierError::InvalidModel(e.to_string()))?;
        Self::from_artifact(artifact)
    }

    /// Load an artifact file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ClassifierError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ClassifierError::InvalidModel(format!("cannot read {}: {}", path.display(), e))
        })?;
        let classifier = Self::from_json(&json)?;
        info!(
            model_id = %classifier.id,
            trees = classifier.trees.len(),
            baseline = classifier.baseline,
            "Loaded forest classifier"
        );
        Ok(classifier)
    }

    /// Number of trees.
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    fn average(&self, features: &EncodedFeatures) -> [f64; 2] {
        let mut sum = [0.0, 0.0];
        for tree in &self.trees {
            let p = tree.predict(features);
            sum[0] += p[0];
            sum[1] += p[1];
        }
        let n = self.trees.len() as f64;
        [sum[0] / n, sum[1] / n]
    }
}

impl EligibilityClassifier for ForestClassifier {
    fn id(&self) -> &str {
        &self.id
    }

    fn predict_proba(
        &self,
        features: &EncodedFeatures,
    ) -> Result<ClassProbabilities, ClassifierError> {
        if features.values().iter().any(|v| !v.is_finite()) {
            return Err(ClassifierError::Inference(
                "features contain non-finite values".to_string(),
            ));
        }
        Ok(ClassProbabilities(self.average(features)))
    }

    fn expected_baseline(&self) -> f64 {
        self.baseline
    }

    fn background(&self) -> &[EncodedFeatures] {
        &self.background
    }
}

fn fingerprint(artifact: &ForestArtifact) -> Result<String, ClassifierError> {
    let bytes =
        serde_json::to_vec(artifact).map_err(|e| ClassifierError::InvalidModel(e.to_string()))?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("forest-{}", &hex::encode(digest)[..16]))
}
