//! Recovery of typed objects from noisy model output.
//!
//! Output is first stripped of known noise (reasoning blocks, code fences,
//! conversational preambles), then each [`ExtractionMethod`] in
//! [`ExtractionMethod::CHAIN`] is tried in order. The first candidate that
//! parses as JSON and survives schema coercion wins.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::schema::coerce_fact_set;
use crate::error::{FieldError, ParseAttempt, ParseFailure};
use crate::models::FactSet;

/// Wrapper tags a model may put around its JSON payload
const WRAPPER_TAGS: &[&str] = &["extracted_data", "extraction", "data", "result", "json"];

/// Lines starting with these are model self-talk, not summary content
const REASONING_LINE_PREFIXES: &[&str] = &[
    "let me think",
    "i need to",
    "first, i",
    "okay, so",
    "alright,",
];

static REASONING_BLOCKS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?is)<think>.*?</think>",
        r"(?is)<reasoning>.*?</reasoning>",
        r"(?is)\[thinking\].*?\[/thinking\]",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("reasoning pattern is valid"))
    .collect()
});

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```(?:json)?\s*").expect("fence pattern is valid"));

static PREAMBLES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)^Here(?:'s| is) the (?:extracted |structured )?(?:data|JSON|output|summary)[:\s]*",
        r"(?i)^I(?:'ve| have) extracted the following[:\s]*",
        r"(?i)^Based on the (?:transcript|meeting)[,\s]*",
        r"(?i)^The following (?:is|represents)[:\s]*",
        r"(?i)^Let me (?:extract|analyze|process)[^{]*",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("preamble pattern is valid"))
    .collect()
});

static TAG_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    WRAPPER_TAGS
        .iter()
        .map(|tag| {
            Regex::new(&format!(r"(?is)<{tag}>\s*(.*?)\s*</{tag}>")).expect("tag pattern is valid")
        })
        .collect()
});

/// Strategy that isolated the JSON payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    /// Payload found inside a wrapper tag such as `<extracted_data>`
    WrapperTag,
    /// Payload found by depth-matching braces from the first `{`
    BraceScan,
}

impl ExtractionMethod {
    /// Strategies in priority order
    pub const CHAIN: [ExtractionMethod; 2] = [ExtractionMethod::WrapperTag, ExtractionMethod::BraceScan];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WrapperTag => "wrapper_tag",
            Self::BraceScan => "brace_scan",
        }
    }

    /// Isolate a JSON candidate from already-cleaned text
    pub fn candidate(&self, text: &str) -> Option<String> {
        match self {
            Self::WrapperTag => extract_from_wrapper_tags(text),
            Self::BraceScan => extract_from_braces(text),
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A successfully recovered and coerced payload
#[derive(Debug, Clone)]
pub struct Parsed<T> {
    pub data: T,
    pub raw_json: String,
    pub method: ExtractionMethod,
}

/// Recover extraction facts from raw model output
pub fn extract_json_from_response(raw_text: &str) -> Result<Parsed<FactSet>, ParseFailure> {
    parse_with(raw_text, coerce_fact_set)
}

/// Recover any JSON value, leaving interpretation to the caller
pub fn extract_json_value(raw_text: &str) -> Result<Parsed<Value>, ParseFailure> {
    parse_with(raw_text, |value| Ok(value.clone()))
}

/// Run the strategy chain, coercing each candidate with `coerce`.
///
/// Never panics; every failed candidate is reported in the returned `ParseFailure`.
pub fn parse_with<T, F>(raw_text: &str, coerce: F) -> Result<Parsed<T>, ParseFailure>
where
    F: Fn(&Value) -> Result<T, Vec<FieldError>>,
{
    let cleaned = clean_raw_text(raw_text);
    let mut attempts = Vec::new();

    for method in ExtractionMethod::CHAIN {
        let Some(candidate) = method.candidate(&cleaned) else {
            continue;
        };

        let outcome = serde_json::from_str::<Value>(&candidate)
            .map_err(|e| {
                let snippet: String = candidate.chars().take(100).collect();
                vec![FieldError {
                    path: "json".to_string(),
                    message: format!("Invalid JSON: {}", e),
                    received: Some(snippet),
                }]
            })
            .and_then(|value| coerce(&value));

        match outcome {
            Ok(data) => {
                return Ok(Parsed {
                    data,
                    raw_json: candidate,
                    method,
                });
            }
            Err(errors) => attempts.push(ParseAttempt { method, errors }),
        }
    }

    Err(ParseFailure { attempts })
}

/// Remove reasoning blocks, code-fence markers and conversational preambles
pub fn clean_raw_text(text: &str) -> String {
    let mut cleaned = remove_reasoning_blocks(text);
    cleaned = CODE_FENCE.replace_all(&cleaned, "").into_owned();

    let mut trimmed = cleaned.trim().to_string();
    for preamble in PREAMBLES.iter() {
        trimmed = preamble.replace(&trimmed, "").into_owned();
    }
    trimmed.trim().to_string()
}

/// Strip chain-of-thought from free-text output such as a written summary
pub fn strip_reasoning_tokens(content: &str) -> String {
    let without_blocks = remove_reasoning_blocks(content);
    without_blocks
        .lines()
        .filter(|line| {
            let lower = line.trim().to_lowercase();
            !REASONING_LINE_PREFIXES.iter().any(|p| lower.starts_with(p))
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Remove a ```markdown ... ``` wrapper some models put around prose
pub fn remove_markdown_fences(content: &str) -> String {
    let mut text = content.trim();

    if let Some(rest) = text.strip_prefix("```") {
        let (first_line, remainder) = rest.split_once('\n').unwrap_or((rest, ""));
        if matches!(first_line.trim().to_lowercase().as_str(), "" | "markdown" | "md") {
            text = remainder;
        }
    }

    let trimmed_end = text.trim_end();
    if let Some(rest) = trimmed_end.strip_suffix("```") {
        text = rest;
    }

    text.trim().to_string()
}

fn remove_reasoning_blocks(text: &str) -> String {
    REASONING_BLOCKS
        .iter()
        .fold(text.to_string(), |acc, re| re.replace_all(&acc, "").into_owned())
}

fn extract_from_wrapper_tags(text: &str) -> Option<String> {
    TAG_PATTERNS.iter().find_map(|re| {
        let content = re.captures(text)?.get(1)?.as_str().trim();
        (content.starts_with('{') || content.starts_with('[')).then(|| content.to_string())
    })
}

/// Depth-match braces from the first `{`, ignoring braces inside strings.
///
/// When the object never closes, fall back to slicing up to the last `}`
/// and keep it only if it parses.
fn extract_from_braces(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let end = start + offset + c.len_utf8();
                    return Some(text[start..end].to_string());
                }
            }
            _ => {}
        }
    }

    let last = text.rfind('}')?;
    if last <= start {
        return None;
    }
    let candidate = &text[start..=last];
    serde_json::from_str::<Value>(candidate)
        .ok()
        .map(|_| candidate.to_string())
}

/// One-line description of what was recovered, for logs
pub fn extraction_preview(parsed: &Parsed<FactSet>) -> String {
    format!(
        "Extracted via {}: {} decisions, {} commitments, {} risks",
        parsed.method,
        parsed.data.decisions.len(),
        parsed.data.commitments.len(),
        parsed.data.risks.len()
    )
}
