use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};

use super::elapsed_ms;
use crate::error::PipelineError;
use crate::llm::parser::extraction_preview;
use crate::llm::{ModelGateway, ModelRequest, extract_json_from_response, extraction_prompt_with_metadata};
use crate::models::{
    ExtractedFacts, ExtractionMetadata, MeetingMetadata, ModelId, StageResult, TokenUsage,
};

/// Low temperature keeps extraction literal
pub const EXTRACTION_TEMPERATURE: f64 = 0.1;

/// Execute the extraction stage: transcript in, structured facts out.
///
/// Any gateway or parse failure is a hard stage failure. Ids proposed by the
/// model are discarded and every group is re-numbered.
pub async fn execute_extraction(
    gateway: &dyn ModelGateway,
    transcript: &str,
    model: ModelId,
    metadata: Option<&MeetingMetadata>,
) -> StageResult<ExtractedFacts> {
    let start = Instant::now();
    info!("Extraction: calling {} ({} chars)", model, transcript.chars().count());

    let request = ModelRequest::new(model, extraction_prompt_with_metadata(metadata), transcript)
        .temperature(EXTRACTION_TEMPERATURE);

    let response = match gateway.complete(request).await {
        Ok(response) => response,
        Err(e) => {
            warn!("Extraction call failed: {}", e);
            return StageResult::failed(e.to_string(), elapsed_ms(start), TokenUsage::default());
        }
    };

    let parsed = match extract_json_from_response(&response.content) {
        Ok(parsed) => parsed,
        Err(failure) => {
            for error in failure.field_errors() {
                warn!("Extraction field error: {}", error);
            }
            let error = PipelineError::from(failure);
            return StageResult::failed(error.to_string(), elapsed_ms(start), response.usage);
        }
    };

    info!("{}", extraction_preview(&parsed));

    let facts = ExtractedFacts {
        facts: parsed.data.renumbered(),
        extraction_metadata: ExtractionMetadata {
            transcript_length: transcript.chars().count(),
            extraction_timestamp: Utc::now(),
            model_used: model,
        },
    };

    StageResult::succeeded(facts, elapsed_ms(start), response.usage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use crate::llm::mock::{Reply, ScriptedGateway};
    use crate::models::DictionaryCorrection;

    const REPLY: &str = r#"<think>Two decisions, one commitment.</think>
<extracted_data>
{
  "participants": ["Alice", "Bob"],
  "decisions": [
    {"decision_id": "X9", "description": "Ship on Friday", "certainty_level": "confirmed",
     "supporting_quotes": [{"quote": "We ship Friday", "timestamp": null, "speaker": "Alice"}]},
    {"description": "Maybe move standup", "certainty_level": "provisional"}
  ],
  "commitments": [
    {"owner": "Bob", "task": "Write release notes", "due_date": "Thursday", "certainty_level": "confirmed"}
  ]
}
</extracted_data>"#;

    #[tokio::test]
    async fn test_extraction_renumbers_and_attaches_metadata() {
        let gateway = ScriptedGateway::new(vec![Reply::text(REPLY)]);

        let result = execute_extraction(
            &gateway,
            "Alice: We ship Friday.",
            ModelId::Gemini25Flash,
            None,
        )
        .await;

        assert!(result.success);
        let facts = result.data.unwrap();
        assert_eq!(facts.facts.decisions[0].decision_id, "D1");
        assert_eq!(facts.facts.decisions[1].decision_id, "D2");
        assert_eq!(facts.facts.commitments[0].commitment_id, "C1");
        assert_eq!(facts.extraction_metadata.model_used, ModelId::Gemini25Flash);
        assert_eq!(facts.extraction_metadata.transcript_length, 22);
        assert_eq!(result.tokens_used.input, 100);

        let request = &gateway.requests()[0];
        assert_eq!(request.temperature, EXTRACTION_TEMPERATURE);
        assert_eq!(request.message(Role::User), Some("Alice: We ship Friday."));
    }

    #[tokio::test]
    async fn test_extraction_prompt_carries_dictionary() {
        let gateway = ScriptedGateway::new(vec![Reply::text(REPLY)]);
        let metadata = MeetingMetadata {
            dictionary: vec![DictionaryCorrection {
                incorrect: "Acne".to_string(),
                correct: "Acme".to_string(),
            }],
            ..Default::default()
        };

        execute_extraction(&gateway, "transcript", ModelId::ClaudeSonnet4, Some(&metadata)).await;

        let system = gateway.requests()[0].message(Role::System).unwrap().to_string();
        assert!(system.contains("\"Acne\" → \"Acme\""));
    }

    #[tokio::test]
    async fn test_extraction_parse_failure_is_hard_failure() {
        let gateway = ScriptedGateway::new(vec![Reply::text("I'm sorry, I can't help with that.")]);

        let result = execute_extraction(&gateway, "transcript", ModelId::KimiK2, None).await;

        assert!(!result.success);
        assert!(result.data.is_none());
        assert!(result.error.unwrap().starts_with("Extraction parsing failed"));
        assert_eq!(result.tokens_used.output, 50);
    }

    #[tokio::test]
    async fn test_extraction_timeout_is_hard_failure() {
        let gateway = ScriptedGateway::new(vec![Reply::timeout()]);

        let result = execute_extraction(&gateway, "transcript", ModelId::Gemini25Flash, None).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("Try a faster model"));
    }
}
