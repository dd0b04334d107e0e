use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::models::{DictionaryCorrection, PipelineRequest};

/// Read a plain-text transcript
pub fn read_transcript_file(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read transcript: {:?}", path))?;
    if content.trim().is_empty() {
        bail!("Transcript file is empty: {:?}", path);
    }
    Ok(content)
}

/// Read a full pipeline request from a JSON file
pub fn parse_request_file(path: &Path) -> Result<PipelineRequest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file: {:?}", path))?;
    parse_request_json(&content)
}

pub fn parse_request_json(json: &str) -> Result<PipelineRequest> {
    serde_json::from_str(json).context("Failed to parse pipeline request JSON")
}

/// Dictionary files are either a list of `{incorrect, correct}` objects or
/// a flat `{"incorrect": "correct"}` map
#[derive(Deserialize)]
#[serde(untagged)]
enum DictionaryFile {
    List(Vec<DictionaryCorrection>),
    Map(BTreeMap<String, String>),
}

pub fn parse_dictionary_file(path: &Path) -> Result<Vec<DictionaryCorrection>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read dictionary: {:?}", path))?;
    parse_dictionary_json(&content)
}

pub fn parse_dictionary_json(json: &str) -> Result<Vec<DictionaryCorrection>> {
    let file: DictionaryFile =
        serde_json::from_str(json).context("Failed to parse dictionary JSON")?;

    let entries = match file {
        DictionaryFile::List(entries) => entries,
        DictionaryFile::Map(map) => map
            .into_iter()
            .map(|(incorrect, correct)| DictionaryCorrection { incorrect, correct })
            .collect(),
    };

    Ok(entries
        .into_iter()
        .filter(|d| !d.incorrect.trim().is_empty() && !d.correct.trim().is_empty())
        .collect())
}

/// Split "Alice, Bob ,, Carol" into trimmed, non-empty names
pub fn parse_participants(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    use crate::models::PackageId;

    #[test]
    fn test_parse_participants() {
        assert_eq!(parse_participants("Alice, Bob ,, Carol "), vec!["Alice", "Bob", "Carol"]);
        assert!(parse_participants("  ").is_empty());
    }

    #[test]
    fn test_dictionary_accepts_list_and_map() {
        let list = parse_dictionary_json(
            r#"[{"incorrect": "Acne", "correct": "Acme"}, {"incorrect": "", "correct": "x"}]"#,
        )
        .unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].correct, "Acme");

        let map = parse_dictionary_json(r#"{"jason": "JSON", "Kubernetty": "Kubernetes"}"#).unwrap();
        assert_eq!(map.len(), 2);
        assert!(map.iter().any(|d| d.incorrect == "jason" && d.correct == "JSON"));
    }

    #[test]
    fn test_request_file_round_trip() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"transcript": "Alice: hello there everyone", "packageId": "TRUST_MAX"}}"#
        )
        .unwrap();

        let request = parse_request_file(file.path()).unwrap();

        assert_eq!(request.package_id, PackageId::TrustMax);
        assert!(request.transcript.starts_with("Alice"));
    }

    #[test]
    fn test_empty_transcript_file_is_rejected() {
        let file = NamedTempFile::new().unwrap();
        assert!(read_transcript_file(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = read_transcript_file(Path::new("/nonexistent/transcript.txt")).unwrap_err();
        assert!(err.to_string().contains("Failed to read transcript"));
    }
}
