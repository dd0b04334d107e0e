use serde::{Deserialize, Serialize};

use super::{PackageId, PipelineStageConfig};

/// Known mistranscription and its correct spelling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryCorrection {
    pub incorrect: String,
    pub correct: String,
}

/// Optional context about the meeting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeetingMetadata {
    #[serde(default, alias = "clientName")]
    pub client_name: Option<String>,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default, alias = "meetingName")]
    pub meeting_name: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub dictionary: Vec<DictionaryCorrection>,
}

impl MeetingMetadata {
    /// True when there is any meeting context worth telling a model about
    pub fn has_context(&self) -> bool {
        non_blank(&self.client_name).is_some()
            || non_blank(&self.meeting_name).is_some()
            || non_blank(&self.date).is_some()
            || !self.participants.is_empty()
    }
}

/// Trimmed, non-empty view of an optional string field
pub(crate) fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Honoured only when validation is not mandatory for the resolved config
    #[serde(default, alias = "skipValidation")]
    pub skip_validation: bool,
}

/// Everything a caller supplies for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineRequest {
    #[serde(default)]
    pub transcript: String,
    #[serde(default, alias = "packageId")]
    pub package_id: PackageId,
    #[serde(default, alias = "customConfig")]
    pub custom_config: Option<PipelineStageConfig>,
    #[serde(default, alias = "templatePrompt")]
    pub template_prompt: String,
    #[serde(default)]
    pub metadata: Option<MeetingMetadata>,
    #[serde(default)]
    pub options: PipelineOptions,
}
