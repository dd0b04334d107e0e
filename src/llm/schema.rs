//! Coercion of loosely-shaped model JSON into the fact schema.
//!
//! Accepts snake_case or camelCase keys, turns `null` and single values into
//! lists, fills optional fields, and degrades unknown certainty/severity
//! labels instead of rejecting them. Only missing required text is an error.

use serde_json::{Map, Value};

use crate::error::FieldError;
use crate::models::{
    CertaintyLevel, Commitment, Decision, FactSet, NotableQuote, OpenQuestion, Risk, Severity,
    SupportingQuote,
};

type Object = Map<String, Value>;

/// Coerce a parsed JSON value into a `FactSet`, collecting every field error
pub fn coerce_fact_set(value: &Value) -> Result<FactSet, Vec<FieldError>> {
    let Some(root) = value.as_object() else {
        return Err(vec![
            FieldError::new("(root)", "Expected a JSON object").with_received(value),
        ]);
    };

    let mut errors = Vec::new();

    let participants = list(field(root, &["participants"]))
        .into_iter()
        .filter_map(|v| v.as_str().map(str::trim))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let decisions = list(field(root, &["decisions"]))
        .into_iter()
        .enumerate()
        .filter_map(|(i, v)| coerce_decision(v, &format!("decisions.{i}"), &mut errors))
        .collect();

    let commitments = list(field(root, &["commitments"]))
        .into_iter()
        .enumerate()
        .filter_map(|(i, v)| coerce_commitment(v, &format!("commitments.{i}"), &mut errors))
        .collect();

    let risks = list(field(root, &["risks"]))
        .into_iter()
        .enumerate()
        .filter_map(|(i, v)| coerce_risk(v, &format!("risks.{i}"), &mut errors))
        .collect();

    let open_questions = list(field(root, &["open_questions", "openQuestions"]))
        .into_iter()
        .enumerate()
        .filter_map(|(i, v)| coerce_question(v, &format!("open_questions.{i}"), &mut errors))
        .collect();

    let notable_quotes = list(field(root, &["notable_quotes", "notableQuotes"]))
        .into_iter()
        .enumerate()
        .filter_map(|(i, v)| coerce_notable_quote(v, &format!("notable_quotes.{i}"), &mut errors))
        .collect();

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(FactSet {
        participants,
        decisions,
        commitments,
        risks,
        open_questions,
        notable_quotes,
    })
}

/// First present, non-null value among the accepted key spellings
fn field<'a>(obj: &'a Object, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

/// `null`/missing → empty, array → items, anything else → singleton
fn list(value: Option<&Value>) -> Vec<&Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(other) => vec![other],
    }
}

fn optional_text(obj: &Object, keys: &[&str]) -> Option<String> {
    match field(obj, keys)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn required_text(
    obj: &Object,
    keys: &[&str],
    path: &str,
    label: &str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    let text = optional_text(obj, keys);
    if text.is_none() {
        let received = obj.get(keys[0]).cloned().unwrap_or(Value::Null);
        errors.push(
            FieldError::new(format!("{path}.{}", keys[0]), format!("{label} is required"))
                .with_received(&received),
        );
    }
    text
}

fn as_object<'a>(value: &'a Value, path: &str, errors: &mut Vec<FieldError>) -> Option<&'a Object> {
    let obj = value.as_object();
    if obj.is_none() {
        errors.push(FieldError::new(path, "Expected an object").with_received(value));
    }
    obj
}

fn certainty(obj: &Object) -> CertaintyLevel {
    field(obj, &["certainty_level", "certaintyLevel", "certainty"])
        .and_then(Value::as_str)
        .map(CertaintyLevel::from_label)
        .unwrap_or_default()
}

fn supporting_quotes(obj: &Object, path: &str, errors: &mut Vec<FieldError>) -> Vec<SupportingQuote> {
    list(field(obj, &["supporting_quotes", "supportingQuotes"]))
        .into_iter()
        .enumerate()
        .filter_map(|(i, v)| {
            let path = format!("{path}.supporting_quotes.{i}");
            match v {
                Value::String(s) if !s.trim().is_empty() => Some(SupportingQuote::new(s.trim())),
                Value::Object(q) => {
                    let quote = required_text(q, &["quote"], &path, "Quote text", errors)?;
                    Some(SupportingQuote {
                        quote,
                        timestamp: optional_text(q, &["timestamp"]),
                        speaker: optional_text(q, &["speaker"]),
                    })
                }
                other => {
                    errors.push(
                        FieldError::new(format!("{path}.quote"), "Quote text is required")
                            .with_received(other),
                    );
                    None
                }
            }
        })
        .collect()
}

fn coerce_decision(value: &Value, path: &str, errors: &mut Vec<FieldError>) -> Option<Decision> {
    let obj = as_object(value, path, errors)?;
    let description = required_text(obj, &["description"], path, "Decision description", errors);
    let supporting_quotes = supporting_quotes(obj, path, errors);
    Some(Decision {
        decision_id: optional_text(obj, &["decision_id", "decisionId", "id"]).unwrap_or_default(),
        description: description?,
        certainty_level: certainty(obj),
        supporting_quotes,
    })
}

fn coerce_commitment(value: &Value, path: &str, errors: &mut Vec<FieldError>) -> Option<Commitment> {
    let obj = as_object(value, path, errors)?;
    let owner = required_text(obj, &["owner"], path, "Commitment owner", errors);
    let task = required_text(obj, &["task"], path, "Commitment task", errors);
    let supporting_quotes = supporting_quotes(obj, path, errors);
    Some(Commitment {
        commitment_id: optional_text(obj, &["commitment_id", "commitmentId", "id"])
            .unwrap_or_default(),
        owner: owner?,
        task: task?,
        due_date: optional_text(obj, &["due_date", "dueDate"]),
        certainty_level: certainty(obj),
        supporting_quotes,
    })
}

fn coerce_risk(value: &Value, path: &str, errors: &mut Vec<FieldError>) -> Option<Risk> {
    let obj = as_object(value, path, errors)?;
    let description = required_text(obj, &["description"], path, "Risk description", errors);
    let supporting_quotes = supporting_quotes(obj, path, errors);
    Some(Risk {
        risk_id: optional_text(obj, &["risk_id", "riskId", "id"]).unwrap_or_default(),
        description: description?,
        severity: field(obj, &["severity"])
            .and_then(Value::as_str)
            .map(Severity::from_label)
            .unwrap_or_default(),
        raised_by: optional_text(obj, &["raised_by", "raisedBy"]),
        supporting_quotes,
    })
}

fn coerce_question(value: &Value, path: &str, errors: &mut Vec<FieldError>) -> Option<OpenQuestion> {
    if let Value::String(s) = value {
        if !s.trim().is_empty() {
            return Some(OpenQuestion {
                question_id: String::new(),
                question: s.trim().to_string(),
                raised_by: None,
                context: None,
            });
        }
    }
    let obj = as_object(value, path, errors)?;
    let question = required_text(obj, &["question"], path, "Question text", errors)?;
    Some(OpenQuestion {
        question_id: optional_text(obj, &["question_id", "questionId", "id"]).unwrap_or_default(),
        question,
        raised_by: optional_text(obj, &["raised_by", "raisedBy"]),
        context: optional_text(obj, &["context"]),
    })
}

fn coerce_notable_quote(
    value: &Value,
    path: &str,
    errors: &mut Vec<FieldError>,
) -> Option<NotableQuote> {
    if let Value::String(s) = value {
        if !s.trim().is_empty() {
            return Some(NotableQuote {
                quote: s.trim().to_string(),
                speaker: None,
                timestamp: None,
                significance: String::new(),
            });
        }
    }
    let obj = as_object(value, path, errors)?;
    let quote = required_text(obj, &["quote"], path, "Quote text", errors)?;
    Some(NotableQuote {
        quote,
        speaker: optional_text(obj, &["speaker"]),
        timestamp: optional_text(obj, &["timestamp"]),
        significance: optional_text(obj, &["significance"]).unwrap_or_default(),
    })
}
