use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use super::elapsed_ms;
use crate::llm::parser::{remove_markdown_fences, strip_reasoning_tokens};
use crate::llm::{
    ModelGateway, ModelRequest, TONE_EXAMPLE, build_synthesis_user_prompt,
    synthesis_context, synthesis_prompt_with_template,
};
use crate::models::{
    CertaintyLevel, DeduplicatedFacts, MeetingMetadata, ModelId, Severity, StageResult, TokenUsage,
};

/// Writers that get a one-shot tone example appended to their prompt
pub const HIGH_VARIANCE_WRITERS: &[ModelId] = &[ModelId::KimiK2];

/// Shorter output is treated as a failed write
pub const MIN_SUMMARY_LENGTH: usize = 50;

pub const SYNTHESIS_TEMPERATURE: f64 = 0.3;

/// Writer-facing view of the facts: no ids, no metadata
#[derive(Debug, Serialize)]
pub struct SynthesisFacts<'a> {
    pub participants: &'a [String],
    pub decisions: Vec<SynthesisDecision<'a>>,
    pub commitments: Vec<SynthesisCommitment<'a>>,
    pub risks: Vec<SynthesisRisk<'a>>,
    pub open_questions: Vec<SynthesisQuestion<'a>>,
    pub notable_quotes: Vec<SynthesisQuote<'a>>,
}

#[derive(Debug, Serialize)]
pub struct SynthesisDecision<'a> {
    pub description: &'a str,
    pub certainty: CertaintyLevel,
    pub supporting_evidence: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct SynthesisCommitment<'a> {
    pub owner: &'a str,
    pub task: &'a str,
    pub due_date: Option<&'a str>,
    pub certainty: CertaintyLevel,
}

#[derive(Debug, Serialize)]
pub struct SynthesisRisk<'a> {
    pub description: &'a str,
    pub severity: Severity,
    pub raised_by: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct SynthesisQuestion<'a> {
    pub question: &'a str,
    pub raised_by: Option<&'a str>,
    pub context: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct SynthesisQuote<'a> {
    pub quote: &'a str,
    pub speaker: Option<&'a str>,
    pub significance: &'a str,
}

/// Strip bookkeeping from deduplicated facts before the writer sees them
pub fn prepare_facts_for_synthesis(facts: &DeduplicatedFacts) -> SynthesisFacts<'_> {
    let facts = &facts.facts;
    SynthesisFacts {
        participants: &facts.participants,
        decisions: facts
            .decisions
            .iter()
            .map(|d| SynthesisDecision {
                description: &d.description,
                certainty: d.certainty_level,
                supporting_evidence: d.supporting_quotes.iter().map(|q| q.quote.as_str()).collect(),
            })
            .collect(),
        commitments: facts
            .commitments
            .iter()
            .map(|c| SynthesisCommitment {
                owner: &c.owner,
                task: &c.task,
                due_date: c.due_date.as_deref(),
                certainty: c.certainty_level,
            })
            .collect(),
        risks: facts
            .risks
            .iter()
            .map(|r| SynthesisRisk {
                description: &r.description,
                severity: r.severity,
                raised_by: r.raised_by.as_deref(),
            })
            .collect(),
        open_questions: facts
            .open_questions
            .iter()
            .map(|q| SynthesisQuestion {
                question: &q.question,
                raised_by: q.raised_by.as_deref(),
                context: q.context.as_deref(),
            })
            .collect(),
        notable_quotes: facts
            .notable_quotes
            .iter()
            .map(|q| SynthesisQuote {
                quote: &q.quote,
                speaker: q.speaker.as_deref(),
                significance: &q.significance,
            })
            .collect(),
    }
}

/// Build the writer's system prompt
pub fn synthesis_system_prompt(
    model: ModelId,
    template_prompt: &str,
    metadata: Option<&MeetingMetadata>,
) -> String {
    let mut prompt = synthesis_prompt_with_template(template_prompt);
    if let Some(context) = metadata.and_then(synthesis_context) {
        prompt.push_str(&context);
    }
    if HIGH_VARIANCE_WRITERS.contains(&model) {
        prompt.push_str(TONE_EXAMPLE);
    }
    prompt
}

/// Execute the synthesis stage: deduplicated facts in, Markdown out.
///
/// The transcript is never an input here.
pub async fn execute_synthesis(
    gateway: &dyn ModelGateway,
    facts: &DeduplicatedFacts,
    model: ModelId,
    template_prompt: &str,
    metadata: Option<&MeetingMetadata>,
) -> StageResult<String> {
    let start = Instant::now();
    info!("Synthesis: calling {}", model);

    let payload = match serde_json::to_string_pretty(&prepare_facts_for_synthesis(facts)) {
        Ok(payload) => payload,
        Err(e) => {
            return StageResult::failed(
                format!("Could not serialize facts: {}", e),
                elapsed_ms(start),
                TokenUsage::default(),
            );
        }
    };

    let request = ModelRequest::new(
        model,
        synthesis_system_prompt(model, template_prompt, metadata),
        build_synthesis_user_prompt(&payload),
    )
    .temperature(SYNTHESIS_TEMPERATURE);

    let response = match gateway.complete(request).await {
        Ok(response) => response,
        Err(e) => {
            warn!("Synthesis call failed: {}", e);
            return StageResult::failed(e.to_string(), elapsed_ms(start), TokenUsage::default());
        }
    };

    let summary = remove_markdown_fences(&strip_reasoning_tokens(&response.content));
    if summary.chars().count() < MIN_SUMMARY_LENGTH {
        warn!("Synthesis output too short ({} chars)", summary.chars().count());
        return StageResult::failed(
            "Synthesis produced empty or too short output",
            elapsed_ms(start),
            response.usage,
        );
    }

    info!("Synthesis: {} chars written", summary.chars().count());
    StageResult::succeeded(summary, elapsed_ms(start), response.usage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::llm::Role;
    use crate::llm::mock::{Reply, ScriptedGateway};
    use crate::models::{Decision, DeduplicationMetadata, FactSet, SupportingQuote};

    const SUMMARY: &str = "## Decisions\n- The team decided to ship on Friday.\n\n## Action Items\n- [ ] Bob writes the release notes";

    fn facts() -> DeduplicatedFacts {
        DeduplicatedFacts {
            facts: FactSet {
                participants: vec!["Alice".to_string()],
                decisions: vec![Decision {
                    decision_id: "D1".to_string(),
                    description: "Ship on Friday".to_string(),
                    certainty_level: CertaintyLevel::Confirmed,
                    supporting_quotes: vec![SupportingQuote::new("We ship Friday").spoken_by("Alice")],
                }],
                ..Default::default()
            },
            deduplication_metadata: DeduplicationMetadata {
                original_decision_count: 1,
                merged_decision_count: 1,
                original_commitment_count: 0,
                merged_commitment_count: 0,
                original_risk_count: 0,
                merged_risk_count: 0,
                deduplication_timestamp: Utc::now(),
                model_used: None,
                semantic_fallback_reason: None,
            },
        }
    }

    #[test]
    fn test_prepared_facts_drop_ids_and_metadata() {
        let facts = facts();
        let json = serde_json::to_value(prepare_facts_for_synthesis(&facts)).unwrap();

        assert!(json.get("deduplication_metadata").is_none());
        assert!(json["decisions"][0].get("decision_id").is_none());
        assert_eq!(json["decisions"][0]["certainty"], "confirmed");
        assert_eq!(json["decisions"][0]["supporting_evidence"][0], "We ship Friday");
    }

    #[test]
    fn test_tone_example_only_for_high_variance_writers() {
        assert!(synthesis_system_prompt(ModelId::KimiK2, "", None).contains("TONE EXAMPLE"));
        assert!(!synthesis_system_prompt(ModelId::ClaudeSonnet4, "", None).contains("TONE EXAMPLE"));
    }

    #[tokio::test]
    async fn test_synthesis_cleans_output() {
        let raw = format!("<think>draft first</think>\n```markdown\n{}\n```", SUMMARY);
        let gateway = ScriptedGateway::new(vec![Reply::text(raw)]);

        let result =
            execute_synthesis(&gateway, &facts(), ModelId::ClaudeSonnet4, "Be brief", None).await;

        assert!(result.success);
        assert_eq!(result.data.as_deref(), Some(SUMMARY));

        let request = &gateway.requests()[0];
        assert_eq!(request.temperature, SYNTHESIS_TEMPERATURE);
        assert!(request.message(Role::System).unwrap().contains("Be brief"));
        let user = request.message(Role::User).unwrap();
        assert!(user.contains("Ship on Friday"));
        assert!(!user.contains("D1"));
    }

    #[tokio::test]
    async fn test_short_output_is_a_failure() {
        let gateway = ScriptedGateway::new(vec![Reply::text("<think>hmm</think> Done.")]);

        let result =
            execute_synthesis(&gateway, &facts(), ModelId::ClaudeSonnet4, "", None).await;

        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("Synthesis produced empty or too short output")
        );
    }

    #[tokio::test]
    async fn test_timeout_is_a_failure() {
        let gateway = ScriptedGateway::new(vec![Reply::timeout()]);
        let result = execute_synthesis(&gateway, &facts(), ModelId::KimiK2, "", None).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
    }
}
