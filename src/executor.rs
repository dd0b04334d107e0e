//! Pipeline executor: Extraction -> Deduplication -> Synthesis -> Validation.
//!
//! One run is strictly sequential. A `Pipeline` holds only a shared gateway,
//! so clones can serve concurrent runs.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::llm::ModelGateway;
use crate::models::{
    PipelineRequest, PipelineResult, PipelineStage, PipelineStageConfig, StageResult, StreamEvent,
};
use crate::packages::{is_validation_mandatory, resolve_stage_config};
use crate::stages::{
    FALLBACK_CONFIDENCE, elapsed_ms, execute_deduplication, execute_extraction, execute_synthesis,
    execute_validation,
};

/// Confidence reported when validation was skipped on request
pub const SKIPPED_VALIDATION_CONFIDENCE: u8 = 75;

/// Meetings with fewer decisions and fewer commitments than this skip semantic dedup
pub const SIMPLE_MEETING_MAX_DECISIONS: usize = 5;
pub const SIMPLE_MEETING_MAX_COMMITMENTS: usize = 5;

const EVENT_BUFFER: usize = 16;

/// Bounds on the transcript accepted for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputLimits {
    /// Minimum trimmed length in characters
    pub min_transcript_chars: usize,
    pub max_transcript_chars: usize,
}

impl Default for InputLimits {
    fn default() -> Self {
        Self {
            min_transcript_chars: 20,
            max_transcript_chars: 1_500_000,
        }
    }
}

/// Check a request before any model is called and resolve its stage config
pub fn validate_request(
    request: &PipelineRequest,
    limits: &InputLimits,
) -> Result<PipelineStageConfig, PipelineError> {
    let trimmed = request.transcript.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::InputValidation("Missing transcript".to_string()));
    }
    if trimmed.chars().count() < limits.min_transcript_chars {
        return Err(PipelineError::InputValidation(
            "Transcript is too short or invalid".to_string(),
        ));
    }
    if request.transcript.chars().count() > limits.max_transcript_chars {
        return Err(PipelineError::InputValidation(
            "Transcript is too large. Split it into smaller chunks and try again.".to_string(),
        ));
    }

    resolve_stage_config(request.package_id, request.custom_config.as_ref())
}

#[derive(Clone)]
pub struct Pipeline {
    gateway: Arc<dyn ModelGateway>,
    limits: InputLimits,
}

impl Pipeline {
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        Self {
            gateway,
            limits: InputLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: InputLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Run to completion and return the aggregated result.
    ///
    /// Never panics and never returns an error: every failure is reported in
    /// `PipelineResult::error`.
    pub async fn run(&self, request: PipelineRequest) -> PipelineResult {
        self.guarded(&request, None).await
    }

    /// Run in the background, streaming progress and one terminal event
    pub fn stream(&self, request: PipelineRequest) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let pipeline = self.clone();
        tokio::spawn(async move { pipeline.stream_into(request, tx).await });
        rx
    }

    /// Drive a run, sending events into `events`.
    ///
    /// A closed receiver stops the run before the next stage.
    pub async fn stream_into(&self, request: PipelineRequest, events: mpsc::Sender<StreamEvent>) {
        let result = self.guarded(&request, Some(&events)).await;

        let terminal = if result.success {
            StreamEvent::Complete {
                result: Box::new(result),
            }
        } else {
            StreamEvent::Error {
                error: result
                    .error
                    .unwrap_or_else(|| "Pipeline failed".to_string()),
            }
        };

        if events.send(terminal).await.is_err() {
            debug!("Stream receiver dropped before the terminal event");
        }
    }

    async fn guarded(
        &self,
        request: &PipelineRequest,
        events: Option<&mpsc::Sender<StreamEvent>>,
    ) -> PipelineResult {
        let start = Instant::now();
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline", %run_id, package = %request.package_id);

        let outcome = AssertUnwindSafe(self.execute(request, events).instrument(span))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) if e.is_request_error() => {
                warn!(%run_id, "Rejected request: {}", e);
                PipelineResult::failed(e.to_string(), elapsed_ms(start))
            }
            Ok(Err(e)) => {
                error!(%run_id, "Pipeline error: {}", e);
                PipelineResult::failed(e.to_string(), elapsed_ms(start))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(%run_id, "Pipeline panicked: {}", message);
                PipelineResult::failed(
                    format!("Unexpected pipeline error: {}", message),
                    elapsed_ms(start),
                )
            }
        }
    }

    async fn execute(
        &self,
        request: &PipelineRequest,
        events: Option<&mpsc::Sender<StreamEvent>>,
    ) -> Result<PipelineResult, PipelineError> {
        let start = Instant::now();
        let stages = validate_request(request, &self.limits)?;
        let gateway = self.gateway.as_ref();
        let metadata = request.metadata.as_ref();
        let mut result = PipelineResult::default();

        info!(
            "Starting run: extraction={}, synthesis={}, validation={}",
            stages.extraction, stages.synthesis, stages.validation
        );

        // Extraction
        if !notify(events, PipelineStage::Extraction).await {
            return Ok(disconnected(result, start));
        }
        let extraction =
            execute_extraction(gateway, &request.transcript, stages.extraction, metadata).await;
        let extracted = extraction.data.clone();
        result.stage_results.extraction = Some(extraction);
        let Some(extracted) = extracted else {
            return Ok(stage_failed(result, PipelineStage::Extraction, start));
        };

        // Deduplication
        if !notify(events, PipelineStage::Deduplication).await {
            return Ok(disconnected(result, start));
        }
        let simple = extracted.facts.decisions.len() < SIMPLE_MEETING_MAX_DECISIONS
            && extracted.facts.commitments.len() < SIMPLE_MEETING_MAX_COMMITMENTS;
        let semantic_model = (!simple).then_some(stages.extraction);
        let deduplication = execute_deduplication(gateway, &extracted, semantic_model).await;
        let deduplicated = deduplication.data.clone();
        result.stage_results.deduplication = Some(deduplication);
        let Some(deduplicated) = deduplicated else {
            return Ok(stage_failed(result, PipelineStage::Deduplication, start));
        };

        // Synthesis
        if !notify(events, PipelineStage::Synthesis).await {
            return Ok(disconnected(result, start));
        }
        let synthesis = execute_synthesis(
            gateway,
            &deduplicated,
            stages.synthesis,
            &request.template_prompt,
            metadata,
        )
        .await;
        let summary = synthesis.data.clone();
        result.stage_results.synthesis = Some(synthesis);
        let Some(summary) = summary else {
            return Ok(stage_failed(result, PipelineStage::Synthesis, start));
        };

        result.success = true;
        result.summary = Some(summary.clone());

        // Validation
        let mandatory = is_validation_mandatory(&stages);
        if request.options.skip_validation && !mandatory {
            info!("Skipping validation on request");
            result.confidence = Some(SKIPPED_VALIDATION_CONFIDENCE);
            result.finish(elapsed_ms(start));
            return Ok(result);
        }
        if request.options.skip_validation {
            info!("Validation is mandatory for {}, ignoring skip request", stages.synthesis);
        }

        if !notify(events, PipelineStage::Validation).await {
            return Ok(disconnected(result, start));
        }
        let validation =
            execute_validation(gateway, &deduplicated, &summary, stages.validation).await;
        match validation.data.as_ref() {
            Some(data) if validation.success => {
                result.confidence = Some(data.overall_confidence_score);
                result.validation_flags = data.flagged_issues.clone();
            }
            _ => {
                warn!("Validation failed: {}", validation.error.as_deref().unwrap_or("unknown"));
                result.confidence = Some(FALLBACK_CONFIDENCE);
            }
        }
        result.stage_results.validation = Some(validation);

        result.finish(elapsed_ms(start));
        info!(
            "Run complete in {}ms ({} tokens)",
            result.total_duration_ms, result.tokens_used.total
        );
        Ok(result)
    }
}

/// Send a progress event; false when the consumer has gone away
async fn notify(events: Option<&mpsc::Sender<StreamEvent>>, stage: PipelineStage) -> bool {
    match events {
        None => true,
        Some(tx) => tx.send(StreamEvent::progress(stage)).await.is_ok(),
    }
}

fn stage_failed(mut result: PipelineResult, stage: PipelineStage, start: Instant) -> PipelineResult {
    let reason = stage_error(&result, stage).unwrap_or_else(|| "unknown error".to_string());
    let error = PipelineError::stage_failure(stage, reason);
    warn!("{}", error);
    result.error = Some(error.to_string());
    result.finish(elapsed_ms(start));
    result
}

fn stage_error(result: &PipelineResult, stage: PipelineStage) -> Option<String> {
    let stages = &result.stage_results;
    match stage {
        PipelineStage::Extraction => stages.extraction.as_ref().and_then(error_of),
        PipelineStage::Deduplication => stages.deduplication.as_ref().and_then(error_of),
        PipelineStage::Synthesis => stages.synthesis.as_ref().and_then(error_of),
        PipelineStage::Validation => stages.validation.as_ref().and_then(error_of),
    }
}

fn error_of<T>(stage: &StageResult<T>) -> Option<String> {
    stage.error.clone()
}

/// A run that already has a summary stays successful without an error
fn disconnected(mut result: PipelineResult, start: Instant) -> PipelineResult {
    info!("Stream consumer disconnected, stopping run");
    if !result.success {
        result.error = Some("Client disconnected".to_string());
    }
    result.finish(elapsed_ms(start));
    result
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::llm::mock::{Reply, ScriptedGateway};
    use crate::models::{
        CertaintyLevel, ModelId, PackageId, PipelineOptions, ValidationFlag,
    };

    const TRANSCRIPT: &str = "Bob: We decided to ship on Friday.\nAlice: I will update the docs by Friday.";

    const EXTRACTION_REPLY: &str = r#"<extracted_data>
{
  "participants": ["Alice", "Bob"],
  "decisions": [{"description": "Ship on Friday", "certainty_level": "confirmed",
    "supporting_quotes": [{"quote": "We decided to ship on Friday", "speaker": "Bob"}]}],
  "commitments": [{"owner": "Alice", "task": "Update the docs", "due_date": "Friday",
    "certainty_level": "confirmed",
    "supporting_quotes": [{"quote": "I will update the docs by Friday", "speaker": "Alice"}]}]
}
</extracted_data>"#;

    const SUMMARY_REPLY: &str = "## Decisions\n- The team decided to ship on Friday.\n\n## Action Items\n- [ ] Alice: update the docs (due Friday)";

    const VALIDATION_REPLY: &str = r#"{"overall_confidence_score": 92, "flagged_issues": [
        {"type": "overgeneralization", "severity": "warning", "description": "Minor", "location": "Decisions"}
    ]}"#;

    fn request(package_id: PackageId) -> PipelineRequest {
        PipelineRequest {
            transcript: TRANSCRIPT.to_string(),
            package_id,
            template_prompt: "Be concise".to_string(),
            ..Default::default()
        }
    }

    fn pipeline(replies: Vec<Reply>) -> (Pipeline, Arc<ScriptedGateway>) {
        let gateway = Arc::new(ScriptedGateway::new(replies));
        (Pipeline::new(gateway.clone()), gateway)
    }

    fn happy_replies() -> Vec<Reply> {
        vec![
            Reply::text(EXTRACTION_REPLY),
            Reply::text(SUMMARY_REPLY),
            Reply::text(VALIDATION_REPLY),
        ]
    }

    #[tokio::test]
    async fn test_full_run_with_one_decision_and_commitment() {
        let (pipeline, gateway) = pipeline(happy_replies());

        let result = pipeline.run(request(PackageId::BalancedPro)).await;

        assert!(result.success, "{:?}", result.error);
        let facts = &result.stage_results.deduplication.as_ref().unwrap().data.as_ref().unwrap().facts;
        assert_eq!(facts.decisions.len(), 1);
        assert_eq!(facts.decisions[0].certainty_level, CertaintyLevel::Confirmed);
        assert_eq!(facts.commitments[0].owner, "Alice");
        assert!(facts.commitments[0].due_date.as_deref().unwrap().contains("Friday"));
        assert!(result.summary.as_deref().unwrap().contains("decided to ship"));
        assert_eq!(result.confidence, Some(92));
        assert_eq!(result.validation_flags.len(), 1);

        let models: Vec<ModelId> = gateway.requests().iter().map(|r| r.model).collect();
        assert_eq!(
            models,
            vec![ModelId::Gemini25Flash, ModelId::ClaudeSonnet4, ModelId::ClaudeHaiku4]
        );
        assert_eq!(result.tokens_used.total, 450);
        assert_eq!(result.processing_time.total, result.total_duration_ms);
    }

    #[tokio::test]
    async fn test_extraction_failure_stops_run() {
        let (pipeline, gateway) = pipeline(vec![Reply::Fail(GatewayError::api(500, "upstream down"))]);

        let result = pipeline.run(request(PackageId::BalancedPro)).await;

        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().starts_with("Extraction failed"));
        assert!(result.stage_results.synthesis.is_none());
        assert!(result.stage_results.validation.is_none());
        assert!(result.summary.is_none());
        assert_eq!(gateway.call_count(), 1);
    }

    #[tokio::test]
    async fn test_synthesis_failure_reports_stage() {
        let (pipeline, _) = pipeline(vec![Reply::text(EXTRACTION_REPLY), Reply::text("ok")]);

        let result = pipeline.run(request(PackageId::BalancedPro)).await;

        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().starts_with("Synthesis failed"));
        assert!(result.stage_results.validation.is_none());
    }

    #[tokio::test]
    async fn test_validation_timeout_keeps_success() {
        let (pipeline, _) = pipeline(vec![
            Reply::text(EXTRACTION_REPLY),
            Reply::text(SUMMARY_REPLY),
            Reply::timeout(),
        ]);

        let result = pipeline.run(request(PackageId::BalancedPro)).await;

        assert!(result.success);
        assert_eq!(result.confidence, Some(FALLBACK_CONFIDENCE));
        assert_eq!(result.validation_flags.len(), 1);
        let flag: &ValidationFlag = &result.validation_flags[0];
        assert_eq!(flag.location, "entire summary");
    }

    #[tokio::test]
    async fn test_skip_validation_honored_for_trusted_writer() {
        let (pipeline, gateway) = pipeline(happy_replies());
        let mut req = request(PackageId::BalancedPro);
        req.options = PipelineOptions {
            skip_validation: true,
        };

        let result = pipeline.run(req).await;

        assert!(result.success);
        assert_eq!(result.confidence, Some(SKIPPED_VALIDATION_CONFIDENCE));
        assert!(result.stage_results.validation.is_none());
        assert_eq!(gateway.call_count(), 2);
    }

    #[tokio::test]
    async fn test_skip_validation_ignored_when_mandatory() {
        let (pipeline, gateway) = pipeline(happy_replies());
        let mut req = request(PackageId::FastElegant);
        req.options.skip_validation = true;

        let result = pipeline.run(req).await;

        assert!(result.success);
        assert!(result.stage_results.validation.is_some());
        assert_eq!(result.confidence, Some(92));
        assert_eq!(gateway.call_count(), 3);
    }

    #[tokio::test]
    async fn test_custom_untrusted_writer_still_validates_when_skip_requested() {
        let (pipeline, gateway) = pipeline(happy_replies());
        let mut req = request(PackageId::Custom);
        req.custom_config = Some(PipelineStageConfig {
            extraction: ModelId::Gemini25Flash,
            synthesis: ModelId::DeepseekR1,
            validation: ModelId::ClaudeHaiku4,
        });
        req.options.skip_validation = true;

        let result = pipeline.run(req).await;

        assert!(result.success, "{:?}", result.error);
        assert!(result.stage_results.validation.is_some());
        assert_eq!(result.confidence, Some(92));
        assert_eq!(gateway.call_count(), 3);
        assert_eq!(gateway.requests()[1].model, ModelId::DeepseekR1);
    }

    #[test]
    fn test_disconnect_after_summary_keeps_clean_success() {
        let summarized = PipelineResult {
            success: true,
            summary: Some("## Decisions".to_string()),
            ..Default::default()
        };

        let result = disconnected(summarized, Instant::now());
        assert!(result.success);
        assert!(result.error.is_none());

        let result = disconnected(PipelineResult::default(), Instant::now());
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Client disconnected"));
    }

    #[tokio::test]
    async fn test_input_errors_make_no_model_calls() {
        let (pipeline, gateway) = pipeline(happy_replies());

        let mut short = request(PackageId::BalancedPro);
        short.transcript = "   too short   ".to_string();
        let result = pipeline.run(short).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Transcript is too short or invalid"));

        let custom = request(PackageId::Custom);
        let result = pipeline.run(custom).await;
        assert!(result.error.as_deref().unwrap().contains("Custom package"));

        let limited = pipeline.clone().with_limits(InputLimits {
            min_transcript_chars: 20,
            max_transcript_chars: 30,
        });
        let result = limited.run(request(PackageId::BalancedPro)).await;
        assert!(result.error.as_deref().unwrap().contains("too large"));

        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn test_stream_emits_ordered_events() {
        let (pipeline, _) = pipeline(happy_replies());

        let mut rx = pipeline.stream(request(PackageId::BalancedPro));
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        let stages: Vec<PipelineStage> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Progress { stage, .. } => Some(*stage),
                _ => None,
            })
            .collect();
        assert_eq!(
            stages,
            vec![
                PipelineStage::Extraction,
                PipelineStage::Deduplication,
                PipelineStage::Synthesis,
                PipelineStage::Validation
            ]
        );
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(matches!(events.last(), Some(StreamEvent::Complete { result }) if result.success));
    }

    #[tokio::test]
    async fn test_stream_input_error_is_single_error_event() {
        let (pipeline, _) = pipeline(vec![]);
        let mut req = request(PackageId::BalancedPro);
        req.transcript = String::new();

        let mut rx = pipeline.stream(req);
        let first = rx.recv().await.unwrap();

        assert_eq!(
            first,
            StreamEvent::Error {
                error: "Missing transcript".to_string()
            }
        );
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_stage_failure_ends_with_error_event() {
        let (pipeline, _) = pipeline(vec![Reply::timeout()]);

        let mut rx = pipeline.stream(request(PackageId::BalancedPro));
        let mut last = None;
        while let Some(event) = rx.recv().await {
            last = Some(event);
        }

        match last {
            Some(StreamEvent::Error { error }) => assert!(error.starts_with("Extraction failed")),
            other => panic!("unexpected terminal event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_disconnected_consumer_stops_before_first_call() {
        let (pipeline, gateway) = pipeline(happy_replies());
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        pipeline.stream_into(request(PackageId::BalancedPro), tx).await;

        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn test_panic_becomes_pipeline_error() {
        let (pipeline, _) = pipeline(vec![Reply::Panic("gateway exploded")]);

        let result = pipeline.run(request(PackageId::BalancedPro)).await;

        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("gateway exploded"));
    }
}
