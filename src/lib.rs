pub mod error;
pub mod executor;
pub mod io;
pub mod llm;
pub mod models;
pub mod packages;
pub mod stages;

pub use error::{FieldError, GatewayError, ParseFailure, PipelineError};
pub use executor::{InputLimits, Pipeline, validate_request};
pub use io::{
    format_run_report, format_sse_event, parse_dictionary_file, parse_participants,
    parse_request_file, read_transcript_file, write_json, write_summary,
};
pub use llm::{GatewayConfig, ModelGateway, OpenRouterClient};
pub use models::{
    MeetingMetadata, ModelId, PackageId, PipelineOptions, PipelineRequest, PipelineResult,
    PipelineStageConfig, StreamEvent,
};
pub use packages::{
    PipelineCost, available_models, calculate_pipeline_cost, get_custom_config_risk_level,
    get_package, get_stage_config, is_validation_mandatory, resolve_stage_config,
};
