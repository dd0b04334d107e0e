use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use super::elapsed_ms;
use crate::llm::{
    ModelGateway, ModelRequest, VALIDATION_PROMPT, build_validation_user_prompt,
    extract_json_value,
};
use crate::models::{
    CommitmentValidation, DecisionValidation, DeduplicatedFacts, FlagSeverity, FlagType, ModelId,
    StageResult, TokenUsage, ValidationFlag, ValidationMetadata, ValidationResult,
};

/// Score used whenever the validator's answer is missing or unusable
pub const FALLBACK_CONFIDENCE: u8 = 70;

const FALLBACK_FLAG_DESCRIPTION: &str =
    "Automated validation could not complete. Manual review recommended.";

/// Coerce a loosely-typed score into 0..=100.
///
/// Numbers are rounded and clamped, numeric strings are parsed, anything
/// else (including NaN) yields the fallback score.
pub fn normalize_score(value: Option<&Value>) -> u8 {
    let number = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match number {
        Some(n) if n.is_nan() => FALLBACK_CONFIDENCE,
        Some(n) => n.round().clamp(0.0, 100.0) as u8,
        None => FALLBACK_CONFIDENCE,
    }
}

/// Canned result used when validation cannot complete
pub fn fallback_validation(summary: &str, model: ModelId) -> ValidationResult {
    ValidationResult {
        overall_confidence_score: FALLBACK_CONFIDENCE,
        decision_validations: vec![],
        commitment_validations: vec![],
        flagged_issues: vec![ValidationFlag {
            flag_type: FlagType::UnsupportedClaim,
            severity: FlagSeverity::Warning,
            description: FALLBACK_FLAG_DESCRIPTION.to_string(),
            location: "entire summary".to_string(),
            suggested_fix: None,
        }],
        validation_metadata: metadata(summary, model, true),
    }
}

/// Build a `ValidationResult` from whatever JSON the validator returned.
///
/// Missing booleans default to true, missing arrays to empty.
pub fn normalize_validation_result(raw: &Value, summary: &str, model: ModelId) -> ValidationResult {
    ValidationResult {
        overall_confidence_score: normalize_score(raw.get("overall_confidence_score")),
        decision_validations: items(raw, "decision_validations")
            .map(|v| DecisionValidation {
                decision_id: id(v, "decision_id"),
                confidence: normalize_score(v.get("confidence")),
                has_supporting_evidence: flag(v, "has_supporting_evidence"),
                language_matches_certainty: flag(v, "language_matches_certainty"),
                issues: issues(v),
            })
            .collect(),
        commitment_validations: items(raw, "commitment_validations")
            .map(|v| CommitmentValidation {
                commitment_id: id(v, "commitment_id"),
                confidence: normalize_score(v.get("confidence")),
                has_owner: flag(v, "has_owner"),
                has_supporting_evidence: flag(v, "has_supporting_evidence"),
                issues: issues(v),
            })
            .collect(),
        flagged_issues: items(raw, "flagged_issues").map(normalize_flag).collect(),
        validation_metadata: metadata(summary, model, false),
    }
}

/// Execute the validation stage. Never fails: gateway or parse problems
/// produce the fallback result instead.
pub async fn execute_validation(
    gateway: &dyn ModelGateway,
    facts: &DeduplicatedFacts,
    summary: &str,
    model: ModelId,
) -> StageResult<ValidationResult> {
    let start = Instant::now();
    info!("Validation: calling {}", model);

    let payload = match serde_json::to_string_pretty(&facts.facts) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Validation skipped, facts not serializable: {}", e);
            return StageResult::succeeded(
                fallback_validation(summary, model),
                elapsed_ms(start),
                TokenUsage::default(),
            );
        }
    };

    let request = ModelRequest::new(
        model,
        VALIDATION_PROMPT,
        build_validation_user_prompt(&payload, summary),
    )
    .temperature(0.0)
    .json();

    let response = match gateway.complete(request).await {
        Ok(response) => response,
        Err(e) if e.is_timeout() => {
            warn!("Validation timed out on {}, using fallback", model);
            return StageResult::succeeded(
                fallback_validation(summary, model),
                elapsed_ms(start),
                TokenUsage::default(),
            );
        }
        Err(e) => {
            warn!("Validation call failed, using fallback: {}", e);
            return StageResult::succeeded(
                fallback_validation(summary, model),
                elapsed_ms(start),
                TokenUsage::default(),
            );
        }
    };

    let result = match extract_json_value(&response.content) {
        Ok(parsed) => normalize_validation_result(&parsed.data, summary, model),
        Err(failure) => {
            warn!("Validation output unparseable, using fallback: {}", failure);
            fallback_validation(summary, model)
        }
    };

    info!(
        "Validation: confidence {} with {} flags",
        result.overall_confidence_score,
        result.flagged_issues.len()
    );
    StageResult::succeeded(result, elapsed_ms(start), response.usage)
}

fn metadata(summary: &str, model: ModelId, is_fallback: bool) -> ValidationMetadata {
    ValidationMetadata {
        validation_timestamp: Utc::now(),
        model_used: model,
        summary_length: summary.chars().count(),
        is_fallback,
    }
}

fn items<'a>(raw: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    raw.get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|v| v.is_object())
}

fn id(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => "unknown".to_string(),
    }
}

fn flag(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(true)
}

fn issues(value: &Value) -> Vec<String> {
    value
        .get("issues")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

fn text(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn normalize_flag(value: &Value) -> ValidationFlag {
    ValidationFlag {
        flag_type: FlagType::from_label(value.get("type").and_then(Value::as_str).unwrap_or("")),
        severity: FlagSeverity::from_label(
            value.get("severity").and_then(Value::as_str).unwrap_or(""),
        ),
        description: text(value, "description").unwrap_or_else(|| "Unknown issue".to_string()),
        location: text(value, "location").unwrap_or_else(|| "unknown".to_string()),
        suggested_fix: text(value, "suggested_fix"),
    }
}
