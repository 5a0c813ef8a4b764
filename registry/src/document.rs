//! JSON documents kept in the content store.
//!
//! Field names and nesting follow the participant database layout already
//! published by earlier deployments, so existing snapshots keep decoding:
//! naive ISO timestamps are read as UTC, and genesis participants may lack an
//! explanation CID or confidence.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use eligibility::{Applicant, Attribution, Decision};
use narrator::{Narrative, NarrativeSource};

use crate::content_id::ContentId;

/// Schema version written into snapshot metadata.
pub const SNAPSHOT_VERSION: &str = "1.0";

/// Parse an ISO-8601 timestamp, treating a missing offset as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Ok(ts.with_timezone(&Utc)),
        Err(rfc_err) => raw
            .parse::<NaiveDateTime>()
            .map(|naive| naive.and_utc())
            .map_err(|_| rfc_err),
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

/// Explanation published for one decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationRecord {
    pub applicant_info: Applicant,
    pub prediction: Decision,
    pub explanation: ExplanationDetail,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// Attribution and narrative of an [`ExplanationRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationDetail {
    #[serde(default)]
    pub method: String,
    pub feature_names: Vec<String>,
    #[serde(rename = "shap_values")]
    pub values: Vec<f64>,
    #[serde(rename = "base_value")]
    pub baseline: f64,
    pub feature_contributions: BTreeMap<String, f64>,
    #[serde(rename = "llm_explanation")]
    pub narrative: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative_source: Option<NarrativeSource>,
}

impl ExplanationRecord {
    pub fn new(
        applicant: &Applicant,
        decision: &Decision,
        attribution: &Attribution,
        narrative: &Narrative,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            applicant_info: applicant.clone(),
            prediction: *decision,
            explanation: ExplanationDetail {
                method: attribution.method.clone(),
                feature_names: attribution.feature_names.clone(),
                values: attribution.values.clone(),
                baseline: attribution.baseline,
                feature_contributions: attribution.by_feature(),
                narrative: narrative.text.clone(),
                narrative_source: Some(narrative.source.clone()),
            },
            timestamp,
        }
    }
}

/// Snapshot header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub total_participants: u64,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub last_updated: DateTime<Utc>,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Set when this snapshot was started from scratch because the snapshot
    /// it should have extended could not be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rebuilt_after_unreachable: Option<ContentId>,
}

/// One registered participant. Never modified once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantEntry {
    pub participant_id: u64,
    #[serde(rename = "aadhaar")]
    pub national_id: u64,
    pub name: String,
    pub age: u32,
    #[serde(rename = "caste")]
    pub group: String,
    pub income: f64,
    pub land_ownership: bool,
    #[serde(rename = "housing_status")]
    pub housing: String,
    pub eligible: bool,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub decision_date: DateTime<Utc>,
    #[serde(default)]
    pub explanation_cid: Option<ContentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl ParticipantEntry {
    /// The applicant fields as submitted.
    pub fn applicant(&self) -> Applicant {
        Applicant {
            national_id: self.national_id,
            name: self.name.clone(),
            age: self.age,
            group: self.group.clone(),
            income: self.income,
            land_ownership: self.land_ownership,
            housing: self.housing.clone(),
        }
    }
}

/// One immutable version of the participant database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub metadata: SnapshotMetadata,
    pub participants: Vec<ParticipantEntry>,
}

impl DatabaseSnapshot {
    /// A snapshot with no participants.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            metadata: SnapshotMetadata {
                total_participants: 0,
                last_updated: now,
                version: SNAPSHOT_VERSION.to_string(),
                description: None,
                rebuilt_after_unreachable: None,
            },
            participants: Vec::new(),
        }
    }

    /// Empty snapshot standing in for `unreachable`.
    pub fn rebuilt_after(unreachable: &ContentId, now: DateTime<Utc>) -> Self {
        let mut snapshot = Self::empty(now);
        snapshot.metadata.rebuilt_after_unreachable = Some(unreachable.clone());
        snapshot
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = Some(description.into());
        self
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Identifier the next appended participant receives.
    pub fn next_participant_id(&self) -> u64 {
        self.participants.len() as u64 + 1
    }

    /// Append one participant and refresh the metadata.
    pub fn append(
        &mut self,
        applicant: &Applicant,
        decision: &Decision,
        explanation_cid: &ContentId,
        decided_at: DateTime<Utc>,
    ) -> &ParticipantEntry {
        let entry = ParticipantEntry {
            participant_id: self.next_participant_id(),
            national_id: applicant.national_id,
            name: applicant.name.clone(),
            age: applicant.age,
            group: applicant.group.clone(),
            income: applicant.income,
            land_ownership: applicant.land_ownership,
            housing: applicant.housing.clone(),
            eligible: decision.eligible,
            decision_date: decided_at,
            explanation_cid: Some(explanation_cid.clone()),
            confidence: Some(decision.confidence),
        };
        self.participants.push(entry);
        self.metadata.total_participants = self.participants.len() as u64;
        self.metadata.last_updated = decided_at;
        &self.participants[self.participants.len() - 1]
    }

    pub fn participant(&self, participant_id: u64) -> Option<&ParticipantEntry> {
        self.participants
            .iter()
            .find(|p| p.participant_id == participant_id)
    }

    pub fn eligible_count(&self) -> usize {
        self.participants.iter().filter(|p| p.eligible).count()
    }

    /// Check the count and numbering invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.metadata.total_participants != self.participants.len() as u64 {
            return Err(format!(
                "metadata counts {} participants, document holds {}",
                self.metadata.total_participants,
                self.participants.len()
            ));
        }
        for (index, participant) in self.participants.iter().enumerate() {
            if participant.participant_id != index as u64 + 1 {
                return Err(format!(
                    "participant at position {} has id {}",
                    index + 1,
                    participant.participant_id
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn applicant(id: u64) -> Applicant {
        Applicant {
            national_id: id,
            name: format!("Applicant {}", id),
            age: 40,
            group: "SC".to_string(),
            income: 60_000.0,
            land_ownership: true,
            housing: "semi-pucca".to_string(),
        }
    }

    #[test]
    fn test_append_assigns_sequential_ids() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap();
        let mut snapshot = DatabaseSnapshot::empty(now);
        let decision = Decision {
            eligible: true,
            confidence: 0.75,
        };
        let cid = ContentId::from("bafyexplanation");

        assert_eq!(snapshot.append(&applicant(1), &decision, &cid, now).participant_id, 1);
        let second = snapshot.append(&applicant(2), &decision, &cid, now).clone();

        assert_eq!(second.participant_id, 2);
        assert_eq!(second.applicant(), applicant(2));
        assert_eq!(second.explanation_cid, Some(cid));
        assert_eq!(snapshot.metadata.total_participants, 2);
        assert_eq!(snapshot.next_participant_id(), 3);
        assert!(snapshot.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_broken_invariants() {
        let now = Utc::now();
        let mut snapshot = DatabaseSnapshot::empty(now);
        let decision = Decision {
            eligible: false,
            confidence: 0.6,
        };
        snapshot.append(&applicant(1), &decision, &ContentId::from("bafyx"), now);

        let mut miscounted = snapshot.clone();
        miscounted.metadata.total_participants = 5;
        assert!(miscounted.validate().is_err());

        let mut renumbered = snapshot;
        renumbered.participants[0].participant_id = 7;
        assert!(renumbered.validate().is_err());
    }

    #[test]
    fn test_legacy_document_decodes() {
        let legacy = r#"{
          "metadata": {
            "total_participants": 1,
            "last_updated": "2024-11-02T14:05:33.412908",
            "version": "1.0",
            "description": "PM-KISAN Synthetic Database"
          },
          "participants": [
            {
              "participant_id": 1,
              "aadhaar": 123456789012,
              "name": "Lakshmi",
              "age": 47,
              "caste": "ST",
              "income": 38000,
              "land_ownership": false,
              "housing_status": "kutcha",
              "eligible": true,
              "decision_date": "2024-11-02T14:05:33",
              "explanation_cid": null
            }
          ]
        }"#;

        let snapshot: DatabaseSnapshot = serde_json::from_str(legacy).unwrap();
        assert!(snapshot.validate().is_ok());
        assert_eq!(
            snapshot.metadata.description.as_deref(),
            Some("PM-KISAN Synthetic Database")
        );

        let entry = &snapshot.participants[0];
        assert_eq!(entry.income, 38_000.0);
        assert_eq!(entry.explanation_cid, None);
        assert_eq!(entry.confidence, None);
        assert_eq!(
            entry.decision_date,
            Utc.with_ymd_and_hms(2024, 11, 2, 14, 5, 33).unwrap()
        );
    }

    #[test]
    fn test_typed_round_trip_is_byte_identical() {
        let now = Utc::now();
        let mut snapshot = DatabaseSnapshot::empty(now);
        let decision = Decision {
            eligible: true,
            confidence: 0.9251287335186839,
        };
        let mut person = applicant(42);
        person.income = 48_213.37 + 0.1 / 3.0;
        snapshot.append(&person, &decision, &ContentId::from("bafyx"), now);

        let first = serde_json::to_vec_pretty(&snapshot).unwrap();
        let decoded: DatabaseSnapshot = serde_json::from_slice(&first).unwrap();
        let second = serde_json::to_vec_pretty(&decoded).unwrap();

        assert_eq!(first, second);
        assert_eq!(decoded.participants[0].confidence, Some(0.9251287335186839));
    }

    #[test]
    fn test_confidence_does_not_drift_across_rewrites() {
        let now = Utc::now();
        let mut snapshot = DatabaseSnapshot::empty(now);
        let mut x: f64 = 0.123456789;
        for n in 1..=200u64 {
            // spread values over the full mantissa
            x = (x * 9301.0 + 0.49297).fract();
            let decision = Decision {
                eligible: x >= 0.5,
                confidence: x,
            };
            let mut person = applicant(n);
            person.income = x * 250_000.0;
            snapshot.append(&person, &decision, &ContentId::from("bafyx"), now);
        }

        // each commit decodes the previous snapshot and encodes it again
        let mut bytes = serde_json::to_vec_pretty(&snapshot).unwrap();
        for _ in 0..3 {
            let decoded: DatabaseSnapshot = serde_json::from_slice(&bytes).unwrap();
            let again = serde_json::to_vec_pretty(&decoded).unwrap();
            assert_eq!(bytes, again);
            bytes = again;
        }

        let decoded: DatabaseSnapshot = serde_json::from_slice(&bytes).unwrap();
        for (original, read) in snapshot.participants.iter().zip(&decoded.participants) {
            assert_eq!(original.confidence.map(f64::to_bits), read.confidence.map(f64::to_bits));
            assert_eq!(original.income.to_bits(), read.income.to_bits());
        }
    }

    #[test]
    fn test_parse_timestamp_offsets() {
        let with_offset = parse_timestamp("2025-01-15T10:00:00+05:30").unwrap();
        assert_eq!(with_offset, Utc.with_ymd_and_hms(2025, 1, 15, 4, 30, 0).unwrap());
        assert!(parse_timestamp("yesterday").is_err());
    }
}
