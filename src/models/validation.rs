use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ModelId;

/// Closed taxonomy of issues the validator may raise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagType {
    MissingEvidence,
    ToneSoftening,
    Overgeneralization,
    MissingOwner,
    CertaintyMismatch,
    /// Catch-all for anything outside the taxonomy
    UnsupportedClaim,
}

impl FlagType {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "missing_evidence" => Self::MissingEvidence,
            "tone_softening" => Self::ToneSoftening,
            "overgeneralization" => Self::Overgeneralization,
            "missing_owner" => Self::MissingOwner,
            "certainty_mismatch" => Self::CertaintyMismatch,
            _ => Self::UnsupportedClaim,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagSeverity {
    Warning,
    Error,
}

impl FlagSeverity {
    /// Anything other than "error" is a warning
    pub fn from_label(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("error") {
            Self::Error
        } else {
            Self::Warning
        }
    }
}

/// A categorized issue raised against a location in the summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFlag {
    #[serde(rename = "type")]
    pub flag_type: FlagType,
    pub severity: FlagSeverity,
    pub description: String,
    pub location: String,
    pub suggested_fix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionValidation {
    pub decision_id: String,
    pub confidence: u8,
    pub has_supporting_evidence: bool,
    pub language_matches_certainty: bool,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitmentValidation {
    pub commitment_id: String,
    pub confidence: u8,
    pub has_owner: bool,
    pub has_supporting_evidence: bool,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetadata {
    pub validation_timestamp: DateTime<Utc>,
    pub model_used: ModelId,
    /// Summary length in characters
    pub summary_length: usize,
    /// True when the canned fallback replaced a real validation
    pub is_fallback: bool,
}

/// Output of the validation stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Always within 0..=100
    pub overall_confidence_score: u8,
    pub decision_validations: Vec<DecisionValidation>,
    pub commitment_validations: Vec<CommitmentValidation>,
    pub flagged_issues: Vec<ValidationFlag>,
    pub validation_metadata: ValidationMetadata,
}
