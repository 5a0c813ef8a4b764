//! Feature encoding.
//!
//! Turns an [`Applicant`] into the fixed-arity numeric vector the classifier was
//! trained on. The categorical mappings are owned here and fingerprinted, so a
//! decision can always be traced back to the exact encoder that produced it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

use crate::applicant::Applicant;

/// Number of features in an encoded vector.
pub const FEATURE_COUNT: usize = 5;

/// Feature names, in encoding order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] =
    ["age", "caste", "income", "land_ownership", "housing_status"];

/// Errors raised while encoding an applicant.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodeError {
    /// Categorical value outside the fitted set
    #[error("Unknown {attribute} category '{value}' (expected one of: {})", .allowed.join(", "))]
    UnknownCategory {
        attribute: &'static str,
        value: String,
        allowed: Vec<String>,
    },

    /// Numeric attribute outside its domain
    #[error("Invalid {attribute}: {reason}")]
    InvalidValue {
        attribute: &'static str,
        reason: String,
    },

    /// Mapping cannot be used for encoding
    #[error("Invalid category mapping: {0}")]
    InvalidMapping(String),
}

/// Encoded feature vector in [`FEATURE_NAMES`] order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncodedFeatures([f64; FEATURE_COUNT]);

impl EncodedFeatures {
    /// Wrap raw values already in encoding order.
    pub fn from_values(values: [f64; FEATURE_COUNT]) -> Self {
        Self(values)
    }

    /// Values in encoding order.
    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }

    /// Value of a single feature.
    pub fn get(&self, index: usize) -> Option<f64> {
        self.0.get(index).copied()
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        FEATURE_COUNT
    }

    /// Always false; the vector has fixed arity.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Take features selected by `mask` from `self` and the rest from `reference`.
    ///
    /// Bit `i` of the mask selects feature `i`.
    pub fn blend(&self, reference: &EncodedFeatures, mask: u32) -> EncodedFeatures {
        let mut values = reference.0;
        for (i, value) in values.iter_mut().enumerate() {
            if mask & (1 << i) != 0 {
                *value = self.0[i];
            }
        }
        EncodedFeatures(values)
    }
}

/// Category-to-integer mappings fitted at training time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMapping {
    /// Social group codes
    pub caste: BTreeMap<String, u32>,
    /// Housing quality codes
    pub housing_status: BTreeMap<String, u32>,
}

impl Default for CategoryMapping {
    fn default() -> Self {
        let caste = [("SC", 0), ("ST", 1), ("OBC", 2), ("General", 3)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let housing_status = [("kutcha", 0), ("semi-pucca", 1), ("pucca", 2)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Self {
            caste,
            housing_status,
        }
    }
}

impl CategoryMapping {
    /// Load a mapping exported alongside a trained model.
    pub fn from_json(json: &str) -> Result<Self, EncodeError> {
        serde_json::from_str(json).map_err(|e| EncodeError::InvalidMapping(e.to_string()))
    }

    fn validate(&self) -> Result<(), EncodeError> {
        for (attribute, codes) in [("caste", &self.caste), ("housing_status", &self.housing_status)]
        {
            if codes.is_empty() {
                return Err(EncodeError::InvalidMapping(format!(
                    "{} has no categories",
                    attribute
                )));
            }
            let distinct: BTreeSet<u32> = codes.values().copied().collect();
            if distinct.len() != codes.len() {
                return Err(EncodeError::InvalidMapping(format!(
                    "{} maps two categories to the same code",
                    attribute
                )));
            }
        }
        Ok(())
    }
}

/// Deterministic applicant encoder.
#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    mapping: CategoryMapping,
    version: String,
}

impl Default for FeatureEncoder {
    fn default() -> Self {
        let mapping = CategoryMapping::default();
        let version = fingerprint(&mapping);
        Self { mapping, version }
    }
}

impl FeatureEncoder {
    /// Create an encoder over a fitted mapping.
    pub fn new(mapping: CategoryMapping) -> Result<Self, EncodeError> {
        mapping.validate()?;
        let version = fingerprint(&mapping);
        Ok(Self { mapping, version })
    }

    /// Fingerprint of the mapping, stable across processes.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The mapping in use.
    pub fn mapping(&self) -> &CategoryMapping {
        &self.mapping
    }

    /// Encode an applicant.
    pub fn encode(&self, applicant: &Applicant) -> Result<EncodedFeatures, EncodeError> {
        if !applicant.income.is_finite() || applicant.income < 0.0 {
            return Err(EncodeError::InvalidValue {
                attribute: "income",
                reason: format!("must be a non-negative number, got {}", applicant.income),
            });
        }

        let caste = lookup("caste", &self.mapping.caste, &applicant.group)?;
        let housing = lookup(
            "housing_status",
            &self.mapping.housing_status,
            &applicant.housing,
        )?;

        Ok(EncodedFeatures([
            f64::from(applicant.age),
            f64::from(caste),
            applicant.income,
            if applicant.land_ownership { 1.0 } else { 0.0 },
            f64::from(housing),
        ]))
    }
}

fn lookup(
    attribute: &'static str,
    codes: &BTreeMap<String, u32>,
    value: &str,
) -> Result<u32, EncodeError> {
    codes
        .get(value)
        .copied()
        .ok_or_else(|| EncodeError::UnknownCategory {
            attribute,
            value: value.to_string(),
            allowed: codes.keys().cloned().collect(),
        })
}

fn fingerprint(mapping: &CategoryMapping) -> String {
    let mut hasher = Sha256::new();
    let attributes = [
        ("caste", &mapping.caste),
        ("housing_status", &mapping.housing_status),
    ];
    for (attribute, codes) in attributes {
        hasher.update(attribute.as_bytes());
        for (category, code) in codes {
            hasher.update([0u8]);
            hasher.update(category.as_bytes());
            hasher.update(code.to_le_bytes());
        }
        hasher.update([0xffu8]);
    }
    format!("enc-{}", &hex::encode(hasher.finalize())[..16])
}
