use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::llm::parser::ExtractionMethod;
use crate::models::PipelineStage;

/// Maximum number of characters of a provider error body kept in messages
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Failure of a single model call
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("OpenRouter API key is not configured")]
    NotConfigured,

    #[error("Request timed out after {}s. Try a faster model.", .0.as_secs())]
    Timeout(Duration),

    #[error("Model API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to reach model provider: {0}")]
    Network(String),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}

impl GatewayError {
    /// Build an API error, truncating the provider's body
    pub fn api(status: u16, body: &str) -> Self {
        Self::Api {
            status,
            body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        }
    }

    /// Timeouts imply "retry with a faster model" rather than a broken request
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// A single schema problem found while coercing model output
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    /// Dotted path to the offending field, e.g. `decisions.0.description`
    pub path: String,
    pub message: String,
    /// Compact rendering of the offending value, if any
    pub received: Option<String>,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            received: None,
        }
    }

    pub fn with_received(mut self, value: &serde_json::Value) -> Self {
        let rendered = value.to_string();
        self.received = Some(rendered.chars().take(100).collect());
        self
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)?;
        if let Some(received) = &self.received {
            write!(f, " (received {})", received)?;
        }
        Ok(())
    }
}

/// Why model output could not be turned into a typed object
#[derive(Debug, Clone, Error)]
#[error("{}", self.summary())]
pub struct ParseFailure {
    pub attempts: Vec<ParseAttempt>,
}

/// One extraction strategy that found a candidate but failed to validate it
#[derive(Debug, Clone)]
pub struct ParseAttempt {
    pub method: ExtractionMethod,
    pub errors: Vec<FieldError>,
}

impl ParseFailure {
    /// All field errors across attempts, for logging
    pub fn field_errors(&self) -> impl Iterator<Item = &FieldError> {
        self.attempts.iter().flat_map(|a| a.errors.iter())
    }

    fn summary(&self) -> String {
        if self.attempts.is_empty() {
            return "No valid JSON found in response. Expected <extracted_data>{...}</extracted_data> or raw JSON object.".to_string();
        }
        self.attempts
            .iter()
            .map(|a| {
                let errors: Vec<String> = a.errors.iter().map(|e| e.to_string()).collect();
                format!(
                    "{} candidate found but validation failed: {}",
                    a.method,
                    errors.join("; ")
                )
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Top-level error taxonomy for a pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    InputValidation(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Extraction parsing failed: {0}")]
    Parse(#[from] ParseFailure),

    #[error("{stage} failed: {message}")]
    StageFailure {
        stage: PipelineStage,
        message: String,
    },
}

impl PipelineError {
    pub fn stage_failure(stage: PipelineStage, message: impl Into<String>) -> Self {
        Self::StageFailure {
            stage,
            message: message.into(),
        }
    }

    /// Errors raised before any model call is made
    pub fn is_request_error(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::InputValidation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_body_is_truncated() {
        let body = "x".repeat(2000);
        match GatewayError::api(502, &body) {
            GatewayError::Api { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body.len(), MAX_ERROR_BODY_CHARS);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_timeout_message_suggests_faster_model() {
        let error = GatewayError::Timeout(Duration::from_secs(20));
        assert!(error.is_timeout());
        assert_eq!(
            error.to_string(),
            "Request timed out after 20s. Try a faster model."
        );
    }

    #[test]
    fn test_stage_failure_names_stage() {
        let error = PipelineError::stage_failure(PipelineStage::Extraction, "boom");
        assert_eq!(error.to_string(), "Extraction failed: boom");
        assert!(!error.is_request_error());
    }

    #[test]
    fn test_parse_failure_summary_lists_field_errors() {
        let failure = ParseFailure {
            attempts: vec![ParseAttempt {
                method: ExtractionMethod::WrapperTag,
                errors: vec![
                    FieldError::new("decisions.0.description", "Decision description is required")
                        .with_received(&serde_json::Value::Null),
                ],
            }],
        };
        let text = failure.to_string();
        assert!(text.contains("wrapper_tag"));
        assert!(text.contains("decisions.0.description"));
        assert!(text.contains("received null"));
    }
}
