//! Package presets and the policy functions that resolve, price and grade a
//! three-stage model configuration.

use serde::Serialize;

use crate::error::PipelineError;
use crate::models::{ModelId, ModelInfo, ModelPackage, PackageId, PipelineStageConfig, RiskLevel};

/// Writers trusted enough that validation may be skipped
pub const TRUSTED_WRITERS: &[ModelId] = &[
    ModelId::ClaudeSonnet4,
    ModelId::ClaudeHaiku4,
    ModelId::Gpt4o,
];

/// Typical (input, output) token volume per stage, used for cost estimates
pub const EXTRACTION_TOKEN_ESTIMATE: (u64, u64) = (12_000, 3_000);
pub const SYNTHESIS_TOKEN_ESTIMATE: (u64, u64) = (4_000, 1_500);
pub const VALIDATION_TOKEN_ESTIMATE: (u64, u64) = (6_000, 1_000);

/// Stages of `BALANCED_PRO`, also the lenient fallback
const BALANCED_PRO_STAGES: PipelineStageConfig = PipelineStageConfig {
    extraction: ModelId::Gemini25Flash,
    synthesis: ModelId::ClaudeSonnet4,
    validation: ModelId::ClaudeHaiku4,
};

pub static MODEL_PACKAGES: [ModelPackage; 3] = [
    ModelPackage {
        id: PackageId::TrustMax,
        name: "Trust Max",
        description: "Maximum reliability for sensitive meetings. Claude extracts and writes.",
        stages: PipelineStageConfig {
            extraction: ModelId::ClaudeSonnet4,
            synthesis: ModelId::ClaudeSonnet4,
            validation: ModelId::ClaudeHaiku4,
        },
        risk_level: RiskLevel::Low,
        use_cases: &["HR discussions", "Legal meetings", "Board meetings", "Sensitive topics"],
    },
    ModelPackage {
        id: PackageId::BalancedPro,
        name: "Balanced Pro",
        description: "Fast and accurate. Gemini extracts, Claude writes, Haiku validates.",
        stages: BALANCED_PRO_STAGES,
        risk_level: RiskLevel::Low,
        use_cases: &["Team syncs", "Project updates", "Planning sessions", "General meetings"],
    },
    ModelPackage {
        id: PackageId::FastElegant,
        name: "Fast & Elegant",
        description: "Speed-optimized for internal use. Gemini extracts and validates.",
        stages: PipelineStageConfig {
            extraction: ModelId::Gemini25Flash,
            synthesis: ModelId::KimiK2,
            validation: ModelId::Gemini25Flash,
        },
        risk_level: RiskLevel::Medium,
        use_cases: &["Brainstorms", "Internal syncs", "Creative sessions", "Low-stakes meetings"],
    },
];

/// Estimated USD cost of one run
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PipelineCost {
    pub extraction: f64,
    pub synthesis: f64,
    pub validation: f64,
    pub total: f64,
}

/// Preset by id; `None` for `CUSTOM`
pub fn get_package(id: PackageId) -> Option<&'static ModelPackage> {
    MODEL_PACKAGES.iter().find(|p| p.id == id)
}

/// Lenient resolution: anything unresolvable falls back to `BALANCED_PRO`
pub fn get_stage_config(id: PackageId, custom: Option<&PipelineStageConfig>) -> PipelineStageConfig {
    match (id, custom) {
        (PackageId::Custom, Some(config)) => *config,
        _ => get_package(id).map(|p| p.stages).unwrap_or(BALANCED_PRO_STAGES),
    }
}

/// Strict resolution used before a run: `CUSTOM` must carry a config
pub fn resolve_stage_config(
    id: PackageId,
    custom: Option<&PipelineStageConfig>,
) -> Result<PipelineStageConfig, PipelineError> {
    match (id, custom) {
        (PackageId::Custom, None) => Err(PipelineError::Configuration(
            "Custom package requires a custom configuration with extraction, synthesis and validation models".to_string(),
        )),
        _ => Ok(get_stage_config(id, custom)),
    }
}

/// Validation cannot be skipped unless the writer is trusted
pub fn is_validation_mandatory(config: &PipelineStageConfig) -> bool {
    !TRUSTED_WRITERS.contains(&config.synthesis)
}

/// Risk grade for an arbitrary configuration
pub fn get_custom_config_risk_level(config: &PipelineStageConfig) -> RiskLevel {
    if config.synthesis.is_anthropic() {
        RiskLevel::Low
    } else if config.synthesis == ModelId::Gpt4o || config.validation.is_anthropic() {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    }
}

pub fn calculate_pipeline_cost(config: &PipelineStageConfig) -> PipelineCost {
    let extraction = stage_cost(config.extraction, EXTRACTION_TOKEN_ESTIMATE);
    let synthesis = stage_cost(config.synthesis, SYNTHESIS_TOKEN_ESTIMATE);
    let validation = stage_cost(config.validation, VALIDATION_TOKEN_ESTIMATE);
    PipelineCost {
        extraction,
        synthesis,
        validation,
        total: extraction + synthesis + validation,
    }
}

fn stage_cost(model: ModelId, (input, output): (u64, u64)) -> f64 {
    let info = model.info();
    (input as f64 / 1_000_000.0) * info.input_cost_per_1m
        + (output as f64 / 1_000_000.0) * info.output_cost_per_1m
}

/// Every model in the catalog
pub fn available_models() -> Vec<ModelInfo> {
    ModelId::ALL.iter().map(ModelId::info).collect()
}

/// Catalog entry for a wire id such as `anthropic/claude-haiku-4`
pub fn model_info(id: &str) -> Option<ModelInfo> {
    id.parse::<ModelId>().ok().map(|m| m.info())
}
