use std::fmt;

use serde::{Deserialize, Serialize};

use super::{DeduplicatedFacts, ExtractedFacts, ValidationFlag, ValidationResult};

/// One of the four sequential pipeline steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Extraction,
    Deduplication,
    Synthesis,
    Validation,
}

impl PipelineStage {
    /// Human-readable progress message
    pub fn message(&self) -> &'static str {
        match self {
            Self::Extraction => "Extracting facts from transcript...",
            Self::Deduplication => "Consolidating duplicates...",
            Self::Synthesis => "Writing summary...",
            Self::Validation => "Validating claims...",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Extraction => "Extraction",
            Self::Deduplication => "Deduplication",
            Self::Synthesis => "Synthesis",
            Self::Validation => "Validation",
        })
    }
}

/// Token usage reported by the provider for one call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

/// Outcome of one stage.
///
/// Exactly one of `data` / `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub tokens_used: TokenUsage,
}

impl<T> StageResult<T> {
    pub fn succeeded(data: T, duration_ms: u64, tokens_used: TokenUsage) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            duration_ms,
            tokens_used,
        }
    }

    pub fn failed(error: impl Into<String>, duration_ms: u64, tokens_used: TokenUsage) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            duration_ms,
            tokens_used,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageResults {
    pub extraction: Option<StageResult<ExtractedFacts>>,
    pub deduplication: Option<StageResult<DeduplicatedFacts>>,
    pub synthesis: Option<StageResult<String>>,
    pub validation: Option<StageResult<ValidationResult>>,
}

/// Per-stage wall-clock timings in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingBreakdown {
    pub extraction: u64,
    pub deduplication: u64,
    pub synthesis: u64,
    pub validation: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTotals {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

/// Aggregated outcome of a pipeline run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub success: bool,
    pub summary: Option<String>,
    pub confidence: Option<u8>,
    pub validation_flags: Vec<ValidationFlag>,
    pub stage_results: StageResults,
    pub total_duration_ms: u64,
    pub error: Option<String>,
    #[serde(default)]
    pub processing_time: TimingBreakdown,
    #[serde(default)]
    pub tokens_used: TokenTotals,
}

impl PipelineResult {
    /// A run that ended before or outside any stage
    pub fn failed(error: impl Into<String>, total_duration_ms: u64) -> Self {
        let mut result = Self {
            error: Some(error.into()),
            ..Default::default()
        };
        result.finish(total_duration_ms);
        result
    }

    /// Stamp the total duration and derive timing and token aggregates
    pub fn finish(&mut self, total_duration_ms: u64) {
        self.total_duration_ms = total_duration_ms;
        self.processing_time = timing_breakdown(self);
        self.tokens_used = calculate_total_tokens(self);
    }
}

/// Sum token usage across every stage that ran
pub fn calculate_total_tokens(result: &PipelineResult) -> TokenTotals {
    let stages = &result.stage_results;
    let usages = [
        stages.extraction.as_ref().map(|s| s.tokens_used),
        stages.deduplication.as_ref().map(|s| s.tokens_used),
        stages.synthesis.as_ref().map(|s| s.tokens_used),
        stages.validation.as_ref().map(|s| s.tokens_used),
    ];

    let (input, output) = usages
        .into_iter()
        .flatten()
        .fold((0, 0), |(i, o), u| (i + u.input, o + u.output));

    TokenTotals {
        input,
        output,
        total: input + output,
    }
}

pub fn timing_breakdown(result: &PipelineResult) -> TimingBreakdown {
    let stages = &result.stage_results;
    TimingBreakdown {
        extraction: stages.extraction.as_ref().map_or(0, |s| s.duration_ms),
        deduplication: stages.deduplication.as_ref().map_or(0, |s| s.duration_ms),
        synthesis: stages.synthesis.as_ref().map_or(0, |s| s.duration_ms),
        validation: stages.validation.as_ref().map_or(0, |s| s.duration_ms),
        total: result.total_duration_ms,
    }
}

/// Event emitted by a streaming run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Progress {
        stage: PipelineStage,
        message: String,
    },
    Complete {
        result: Box<PipelineResult>,
    },
    Error {
        error: String,
    },
}

impl StreamEvent {
    pub fn progress(stage: PipelineStage) -> Self {
        Self::Progress {
            stage,
            message: stage.message().to_string(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}
