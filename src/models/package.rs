use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Text-generation models the pipeline is allowed to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelId {
    #[serde(rename = "anthropic/claude-sonnet-4")]
    ClaudeSonnet4,
    #[serde(rename = "anthropic/claude-haiku-4")]
    ClaudeHaiku4,
    #[serde(rename = "deepseek/deepseek-r1")]
    DeepseekR1,
    #[serde(rename = "moonshotai/kimi-k2")]
    KimiK2,
    #[serde(rename = "google/gemini-2.5-flash")]
    Gemini25Flash,
    #[serde(rename = "openai/gpt-4o")]
    Gpt4o,
}

impl ModelId {
    pub const ALL: [ModelId; 6] = [
        ModelId::ClaudeSonnet4,
        ModelId::ClaudeHaiku4,
        ModelId::DeepseekR1,
        ModelId::KimiK2,
        ModelId::Gemini25Flash,
        ModelId::Gpt4o,
    ];

    /// Provider-qualified id sent on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClaudeSonnet4 => "anthropic/claude-sonnet-4",
            Self::ClaudeHaiku4 => "anthropic/claude-haiku-4",
            Self::DeepseekR1 => "deepseek/deepseek-r1",
            Self::KimiK2 => "moonshotai/kimi-k2",
            Self::Gemini25Flash => "google/gemini-2.5-flash",
            Self::Gpt4o => "openai/gpt-4o",
        }
    }

    pub fn is_anthropic(&self) -> bool {
        matches!(self, Self::ClaudeSonnet4 | Self::ClaudeHaiku4)
    }

    /// Per-call deadline. Fast models get short timeouts, reasoning models longer ones.
    pub fn timeout(&self) -> Duration {
        let secs = match self {
            Self::DeepseekR1 => 45,
            Self::ClaudeSonnet4 | Self::Gpt4o | Self::KimiK2 => 30,
            Self::ClaudeHaiku4 | Self::Gemini25Flash => 20,
        };
        Duration::from_secs(secs)
    }

    /// Whether the provider honours `response_format: json_object`
    pub fn supports_json_mode(&self) -> bool {
        !matches!(self, Self::KimiK2)
    }

    pub fn info(&self) -> ModelInfo {
        match self {
            Self::ClaudeSonnet4 => ModelInfo {
                id: *self,
                name: "Claude Sonnet 4.5",
                provider: "Anthropic",
                input_cost_per_1m: 3.0,
                output_cost_per_1m: 15.0,
                description: "Nuanced writing, strong structure, excellent judgment",
                strengths: &["writing", "reasoning", "instruction-following"],
                context_tokens: 200_000,
            },
            Self::ClaudeHaiku4 => ModelInfo {
                id: *self,
                name: "Claude Haiku 4.5",
                provider: "Anthropic",
                input_cost_per_1m: 0.80,
                output_cost_per_1m: 4.0,
                description: "Fast and affordable with strong instruction-following",
                strengths: &["speed", "cost-efficiency", "instruction-following"],
                context_tokens: 200_000,
            },
            Self::DeepseekR1 => ModelInfo {
                id: *self,
                name: "DeepSeek R1",
                provider: "DeepSeek",
                input_cost_per_1m: 0.55,
                output_cost_per_1m: 2.19,
                description: "Strong reasoning model, excellent for extraction and validation",
                strengths: &["reasoning", "analysis", "structured-output"],
                context_tokens: 64_000,
            },
            Self::KimiK2 => ModelInfo {
                id: *self,
                name: "Kimi K2",
                provider: "MoonshotAI",
                input_cost_per_1m: 0.6,
                output_cost_per_1m: 2.5,
                description: "Fast, capable, good value for synthesis",
                strengths: &["speed", "long-context", "formatting"],
                context_tokens: 131_072,
            },
            Self::Gemini25Flash => ModelInfo {
                id: *self,
                name: "Gemini 2.5 Flash",
                provider: "Google",
                input_cost_per_1m: 0.15,
                output_cost_per_1m: 0.60,
                description: "Very fast with massive context window, great for long meetings",
                strengths: &["speed", "long-context", "cost-efficiency"],
                context_tokens: 1_048_576,
            },
            Self::Gpt4o => ModelInfo {
                id: *self,
                name: "GPT-4o",
                provider: "OpenAI",
                input_cost_per_1m: 2.5,
                output_cost_per_1m: 10.0,
                description: "Top-tier generalist with reliable formatting and clarity",
                strengths: &["writing", "reasoning", "reliability"],
                context_tokens: 128_000,
            },
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        ModelId::ALL
            .into_iter()
            .find(|m| m.as_str() == trimmed)
            .ok_or_else(|| {
                format!(
                    "Unknown model '{}'. Must be one of: {}",
                    trimmed,
                    ModelId::ALL.map(|m| m.as_str()).join(", ")
                )
            })
    }
}

/// Static catalog entry used for cost estimation and selection
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: ModelId,
    pub name: &'static str,
    pub provider: &'static str,
    pub input_cost_per_1m: f64,
    pub output_cost_per_1m: f64,
    pub description: &'static str,
    pub strengths: &'static [&'static str],
    pub context_tokens: u32,
}

/// One model per stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStageConfig {
    pub extraction: ModelId,
    pub synthesis: ModelId,
    pub validation: ModelId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PackageId {
    TrustMax,
    #[default]
    BalancedPro,
    FastElegant,
    Custom,
}

impl PackageId {
    pub const ALL: [PackageId; 4] = [
        PackageId::TrustMax,
        PackageId::BalancedPro,
        PackageId::FastElegant,
        PackageId::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TrustMax => "TRUST_MAX",
            Self::BalancedPro => "BALANCED_PRO",
            Self::FastElegant => "FAST_ELEGANT",
            Self::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace('-', "_");
        PackageId::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "Invalid package ID. Must be one of: {}",
                    PackageId::ALL.map(|p| p.as_str()).join(", ")
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

/// Named preset wrapping a stage configuration
#[derive(Debug, Clone, Serialize)]
pub struct ModelPackage {
    pub id: PackageId,
    pub name: &'static str,
    pub description: &'static str,
    pub stages: PipelineStageConfig,
    pub risk_level: RiskLevel,
    pub use_cases: &'static [&'static str],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_id_round_trips_wire_string() {
        for model in ModelId::ALL {
            assert_eq!(model.as_str().parse::<ModelId>().unwrap(), model);
            let json = serde_json::to_string(&model).unwrap();
            assert_eq!(json, format!("\"{}\"", model.as_str()));
        }
    }

    #[test]
    fn test_unknown_model_is_rejected() {
        let err = "openai/gpt-5".parse::<ModelId>().unwrap_err();
        assert!(err.contains("Unknown model"));
    }

    #[test]
    fn test_package_id_parsing_is_lenient_on_case() {
        assert_eq!("balanced-pro".parse::<PackageId>().unwrap(), PackageId::BalancedPro);
        assert_eq!("TRUST_MAX".parse::<PackageId>().unwrap(), PackageId::TrustMax);
        assert!("TURBO".parse::<PackageId>().unwrap_err().contains("Invalid package ID"));
    }

    #[test]
    fn test_reasoning_model_gets_longest_timeout() {
        let longest = ModelId::ALL.iter().map(|m| m.timeout()).max().unwrap();
        assert_eq!(ModelId::DeepseekR1.timeout(), longest);
        assert!(ModelId::Gemini25Flash.timeout() < ModelId::ClaudeSonnet4.timeout());
    }

    #[test]
    fn test_json_mode_support() {
        assert!(ModelId::ClaudeHaiku4.supports_json_mode());
        assert!(!ModelId::KimiK2.supports_json_mode());
    }
}
