use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::models::{PipelineResult, StreamEvent};

/// Write any serializable value as pretty JSON
pub fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create file: {:?}", path))?;
    serde_json::to_writer_pretty(file, value).context("Failed to write JSON")?;
    Ok(())
}

/// Write the Markdown summary of a successful run
pub fn write_summary(summary: &str, path: &Path) -> Result<()> {
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create file: {:?}", path))?;
    writeln!(file, "{}", summary.trim_end())?;
    Ok(())
}

/// Server-sent-events framing: `data: {json}` followed by a blank line
pub fn format_sse_event(event: &StreamEvent) -> Result<String> {
    let json = serde_json::to_string(event).context("Failed to serialize stream event")?;
    Ok(format!("data: {}\n\n", json))
}

/// Short human-readable report of a run, for the terminal
pub fn format_run_report(result: &PipelineResult) -> String {
    let mut output = String::new();

    if result.success {
        output.push_str("Pipeline succeeded");
    } else {
        output.push_str("Pipeline failed");
    }
    output.push_str(&format!(" in {}\n", format_duration(result.total_duration_ms)));

    if let Some(error) = &result.error {
        output.push_str(&format!("  error: {}\n", error));
    }
    if let Some(confidence) = result.confidence {
        output.push_str(&format!("  confidence: {}/100\n", confidence));
    }

    let timing = &result.processing_time;
    output.push_str(&format!(
        "  stages: extraction {}, deduplication {}, synthesis {}, validation {}\n",
        format_duration(timing.extraction),
        format_duration(timing.deduplication),
        format_duration(timing.synthesis),
        format_duration(timing.validation)
    ));
    output.push_str(&format!(
        "  tokens: {} in / {} out ({} total)\n",
        result.tokens_used.input, result.tokens_used.output, result.tokens_used.total
    ));

    for flag in &result.validation_flags {
        output.push_str(&format!(
            "  [{:?}] {:?}: {} ({})\n",
            flag.severity, flag.flag_type, flag.description, flag.location
        ));
    }

    output
}

/// Format milliseconds as seconds with one decimal, e.g. `12.3s`
fn format_duration(ms: u64) -> String {
    format!("{}.{}s", ms / 1000, (ms % 1000) / 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    use crate::models::{FlagSeverity, FlagType, PipelineStage, ValidationFlag};

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0.0s");
        assert_eq!(format_duration(1_250), "1.2s");
        assert_eq!(format_duration(61_900), "61.9s");
    }

    #[test]
    fn test_sse_framing() {
        let line = format_sse_event(&StreamEvent::progress(PipelineStage::Extraction)).unwrap();
        assert!(line.starts_with("data: {"));
        assert!(line.ends_with("}\n\n"));
        assert!(line.contains(r#""type":"progress""#));
    }

    #[test]
    fn test_report_lists_flags_and_error() {
        let mut result = PipelineResult::failed("Synthesis failed: too short", 2_000);
        result.validation_flags.push(ValidationFlag {
            flag_type: FlagType::ToneSoftening,
            severity: FlagSeverity::Error,
            description: "Softened criticism".to_string(),
            location: "Risks".to_string(),
            suggested_fix: None,
        });

        let report = format_run_report(&result);

        assert!(report.starts_with("Pipeline failed in 2.0s"));
        assert!(report.contains("error: Synthesis failed: too short"));
        assert!(report.contains("Softened criticism"));
    }

    #[test]
    fn test_write_result_and_summary() {
        let dir = tempdir().unwrap();
        let json_path = dir.path().join("result.json");
        let md_path = dir.path().join("summary.md");

        write_json(&PipelineResult::failed("nope", 5), &json_path).unwrap();
        write_summary("# Summary\n\nBody\n\n", &md_path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(json["error"], "nope");
        assert_eq!(std::fs::read_to_string(&md_path).unwrap(), "# Summary\n\nBody\n");
    }
}
