use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ModelId;

/// How firmly a decision or commitment was established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertaintyLevel {
    Confirmed,
    Tentative,
    /// Lowest-confidence member; anything unrecognised lands here
    #[default]
    Uncertain,
}

impl CertaintyLevel {
    /// Normalize free text from a model into the closed enum.
    ///
    /// Unknown values degrade to `Uncertain`, never to a stronger level.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "confirmed" | "final" => Self::Confirmed,
            "tentative" | "provisional" => Self::Tentative,
            _ => Self::Uncertain,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Tentative => "tentative",
            Self::Uncertain => "uncertain",
        }
    }

    /// confirmed > tentative > uncertain
    pub fn rank(&self) -> u8 {
        match self {
            Self::Uncertain => 0,
            Self::Tentative => 1,
            Self::Confirmed => 2,
        }
    }

    /// The stronger of two levels, preferring `self` on ties
    pub fn higher(self, other: Self) -> Self {
        if self.rank() >= other.rank() { self } else { other }
    }
}

/// How serious a raised risk is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    High,
    Medium,
    Low,
    #[default]
    Uncertain,
}

impl Severity {
    /// Unknown values degrade to `Uncertain`
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "high" => Self::High,
            "medium" => Self::Medium,
            "low" => Self::Low,
            _ => Self::Uncertain,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Uncertain => "uncertain",
        }
    }

    /// high > medium > low > uncertain
    pub fn rank(&self) -> u8 {
        match self {
            Self::Uncertain => 0,
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }

    pub fn higher(self, other: Self) -> Self {
        if self.rank() >= other.rank() { self } else { other }
    }
}

/// Verbatim excerpt cited as evidence for a fact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SupportingQuote {
    pub quote: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub speaker: Option<String>,
}

impl SupportingQuote {
    pub fn new(quote: impl Into<String>) -> Self {
        Self {
            quote: quote.into(),
            timestamp: None,
            speaker: None,
        }
    }

    pub fn spoken_by(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = Some(speaker.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub decision_id: String,
    pub description: String,
    pub certainty_level: CertaintyLevel,
    #[serde(default)]
    pub supporting_quotes: Vec<SupportingQuote>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commitment {
    pub commitment_id: String,
    pub owner: String,
    pub task: String,
    #[serde(default)]
    pub due_date: Option<String>,
    pub certainty_level: CertaintyLevel,
    #[serde(default)]
    pub supporting_quotes: Vec<SupportingQuote>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Risk {
    pub risk_id: String,
    pub description: String,
    pub severity: Severity,
    #[serde(default)]
    pub raised_by: Option<String>,
    #[serde(default)]
    pub supporting_quotes: Vec<SupportingQuote>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenQuestion {
    pub question_id: String,
    pub question: String,
    #[serde(default)]
    pub raised_by: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotableQuote {
    pub quote: String,
    #[serde(default)]
    pub speaker: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub significance: String,
}

/// The six fact collections shared by extraction and deduplication output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactSet {
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub commitments: Vec<Commitment>,
    #[serde(default)]
    pub risks: Vec<Risk>,
    #[serde(default)]
    pub open_questions: Vec<OpenQuestion>,
    #[serde(default)]
    pub notable_quotes: Vec<NotableQuote>,
}

impl FactSet {
    /// Re-number every fact group sequentially (D1.., C1.., R1.., Q1..)
    pub fn renumbered(self) -> Self {
        Self {
            participants: self.participants,
            decisions: self
                .decisions
                .into_iter()
                .enumerate()
                .map(|(i, d)| Decision {
                    decision_id: format!("D{}", i + 1),
                    ..d
                })
                .collect(),
            commitments: self
                .commitments
                .into_iter()
                .enumerate()
                .map(|(i, c)| Commitment {
                    commitment_id: format!("C{}", i + 1),
                    ..c
                })
                .collect(),
            risks: self
                .risks
                .into_iter()
                .enumerate()
                .map(|(i, r)| Risk {
                    risk_id: format!("R{}", i + 1),
                    ..r
                })
                .collect(),
            open_questions: self
                .open_questions
                .into_iter()
                .enumerate()
                .map(|(i, q)| OpenQuestion {
                    question_id: format!("Q{}", i + 1),
                    ..q
                })
                .collect(),
            notable_quotes: self.notable_quotes,
        }
    }

    /// Every supporting quote attached to decisions, commitments and risks
    pub fn supporting_quotes(&self) -> impl Iterator<Item = &SupportingQuote> {
        self.decisions
            .iter()
            .flat_map(|d| d.supporting_quotes.iter())
            .chain(self.commitments.iter().flat_map(|c| c.supporting_quotes.iter()))
            .chain(self.risks.iter().flat_map(|r| r.supporting_quotes.iter()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    /// Transcript length in characters
    pub transcript_length: usize,
    pub extraction_timestamp: DateTime<Utc>,
    pub model_used: ModelId,
}

/// Output of the extraction stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFacts {
    #[serde(flatten)]
    pub facts: FactSet,
    pub extraction_metadata: ExtractionMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeduplicationMetadata {
    pub original_decision_count: usize,
    pub merged_decision_count: usize,
    pub original_commitment_count: usize,
    pub merged_commitment_count: usize,
    pub original_risk_count: usize,
    pub merged_risk_count: usize,
    pub deduplication_timestamp: DateTime<Utc>,
    /// None when only the deterministic pass ran
    pub model_used: Option<ModelId>,
    /// Why a semantic pass was attempted but discarded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_fallback_reason: Option<String>,
}

/// Output of the deduplication stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeduplicatedFacts {
    #[serde(flatten)]
    pub facts: FactSet,
    pub deduplication_metadata: DeduplicationMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_certainty_degrades_to_uncertain() {
        assert_eq!(CertaintyLevel::from_label("definitely"), CertaintyLevel::Uncertain);
        assert_eq!(CertaintyLevel::from_label(""), CertaintyLevel::Uncertain);
        assert_eq!(CertaintyLevel::from_label("CONFIRMED"), CertaintyLevel::Confirmed);
        assert_eq!(CertaintyLevel::from_label(" final "), CertaintyLevel::Confirmed);
        assert_eq!(CertaintyLevel::from_label("Provisional"), CertaintyLevel::Tentative);
    }

    #[test]
    fn test_unknown_severity_degrades_to_uncertain() {
        assert_eq!(Severity::from_label("critical"), Severity::Uncertain);
        assert_eq!(Severity::from_label("HIGH"), Severity::High);
        assert_eq!(Severity::from_label("low"), Severity::Low);
    }

    #[test]
    fn test_normalization_is_idempotent() {
        for label in ["confirmed", "final", "tentative", "maybe", "uncertain", "??"] {
            let once = CertaintyLevel::from_label(label);
            assert_eq!(CertaintyLevel::from_label(once.as_str()), once);
        }
        for label in ["high", "medium", "low", "severe", "uncertain"] {
            let once = Severity::from_label(label);
            assert_eq!(Severity::from_label(once.as_str()), once);
        }
    }

    #[test]
    fn test_higher_keeps_stronger_level() {
        assert_eq!(
            CertaintyLevel::Tentative.higher(CertaintyLevel::Confirmed),
            CertaintyLevel::Confirmed
        );
        assert_eq!(
            CertaintyLevel::Uncertain.higher(CertaintyLevel::Tentative),
            CertaintyLevel::Tentative
        );
        assert_eq!(Severity::Low.higher(Severity::Uncertain), Severity::Low);
        assert_eq!(Severity::Medium.higher(Severity::High), Severity::High);
    }

    #[test]
    fn test_renumbered_ignores_proposed_ids() {
        let facts = FactSet {
            decisions: vec![
                Decision {
                    decision_id: "D7".to_string(),
                    description: "a".to_string(),
                    certainty_level: CertaintyLevel::Confirmed,
                    supporting_quotes: vec![],
                },
                Decision {
                    decision_id: "".to_string(),
                    description: "b".to_string(),
                    certainty_level: CertaintyLevel::Tentative,
                    supporting_quotes: vec![],
                },
            ],
            ..Default::default()
        }
        .renumbered();

        assert_eq!(facts.decisions[0].decision_id, "D1");
        assert_eq!(facts.decisions[1].decision_id, "D2");
    }

    #[test]
    fn test_serialize_certainty_as_wire_string() {
        let json = serde_json::to_string(&CertaintyLevel::Tentative).unwrap();
        assert_eq!(json, "\"tentative\"");
    }
}
