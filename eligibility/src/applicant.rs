//! Applicant records as submitted to the pipeline.
//!
//! Field names on the wire match the participant database documents, so an
//! applicant can be embedded into explanation records unchanged.

use serde::{Deserialize, Serialize};

/// One applicant, immutable once submitted.
///
/// Categorical attributes stay as raw strings; the [`crate::FeatureEncoder`]
/// decides whether they belong to the fitted category sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Applicant {
    /// Unique national identifier
    #[serde(rename = "aadhaar")]
    pub national_id: u64,
    /// Full name
    pub name: String,
    /// Age in years
    pub age: u32,
    /// Social group category
    #[serde(rename = "caste")]
    pub group: String,
    /// Annual income
    pub income: f64,
    /// Whether the applicant owns agricultural land
    pub land_ownership: bool,
    /// Housing quality category
    #[serde(rename = "housing_status")]
    pub housing: String,
}

impl Applicant {
    /// Human-readable attribute lines used in narrative prompts.
    pub fn summary_lines(&self) -> Vec<String> {
        vec![
            format!("Age: {} years", self.age),
            format!("Caste: {}", self.group),
            format!("Annual Income: ₹{}", group_thousands(self.income)),
            format!(
                "Land Ownership: {}",
                if self.land_ownership { "Yes" } else { "No" }
            ),
            format!("Housing Status: {}", self.housing),
        ]
    }
}

/// Format an amount with thousands separators, dropping a zero fraction.
fn group_thousands(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let digits = (cents / 100).to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 4);
    if amount < 0.0 {
        grouped.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if cents % 100 != 0 {
        grouped.push_str(&format!(".{:02}", cents % 100));
    }
    grouped
}
