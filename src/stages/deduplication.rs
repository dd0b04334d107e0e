//! Deduplication stage.
//!
//! A deterministic pass always runs and merges items whose normalized keys
//! collide. For complex meetings an optional semantic pass asks a model to
//! merge near-duplicates; its output is accepted only when it is a pure merge
//! of the deterministic result (no added or dropped evidence, no lost groups),
//! otherwise the deterministic result stands. This stage never fails the run.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::elapsed_ms;
use crate::llm::parser::parse_with;
use crate::llm::schema::coerce_fact_set;
use crate::llm::{DEDUPLICATION_PROMPT, ModelGateway, ModelRequest};
use crate::models::{
    Commitment, Decision, DeduplicatedFacts, DeduplicationMetadata, ExtractedFacts, FactSet,
    ModelId, NotableQuote, OpenQuestion, Risk, StageResult, SupportingQuote, TokenUsage,
};

/// Semantic dedup is skipped at or below these counts
pub const SEMANTIC_DEDUP_MAX_DECISIONS: usize = 3;
pub const SEMANTIC_DEDUP_MAX_COMMITMENTS: usize = 3;
pub const SEMANTIC_DEDUP_MAX_RISKS: usize = 2;

/// Lowercase, strip punctuation, collapse whitespace
pub fn normalize_text(text: &str) -> String {
    let kept: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Too few items for a semantic pass to be worth a model call
pub fn is_low_complexity(facts: &FactSet) -> bool {
    facts.decisions.len() <= SEMANTIC_DEDUP_MAX_DECISIONS
        && facts.commitments.len() <= SEMANTIC_DEDUP_MAX_COMMITMENTS
        && facts.risks.len() <= SEMANTIC_DEDUP_MAX_RISKS
}

/// Merge exact (normalized) duplicates, preserving first-seen order.
///
/// Idempotent: running it on its own output changes nothing.
pub fn deterministic_dedup(facts: &FactSet) -> FactSet {
    let mut participants: Vec<String> = Vec::new();
    for name in &facts.participants {
        let name = name.trim();
        if !name.is_empty() && !participants.iter().any(|p| p == name) {
            participants.push(name.to_string());
        }
    }

    FactSet {
        participants,
        decisions: merge_by_key(
            &facts.decisions,
            decision_key,
            |existing, d| {
                union_quotes(&mut existing.supporting_quotes, &d.supporting_quotes);
                existing.certainty_level = existing.certainty_level.higher(d.certainty_level);
            },
        ),
        commitments: merge_by_key(
            &facts.commitments,
            commitment_key,
            |existing, c| {
                union_quotes(&mut existing.supporting_quotes, &c.supporting_quotes);
                existing.certainty_level = existing.certainty_level.higher(c.certainty_level);
                if existing.due_date.is_none() {
                    existing.due_date = c.due_date.clone();
                }
            },
        ),
        risks: merge_by_key(
            &facts.risks,
            risk_key,
            |existing, r| {
                union_quotes(&mut existing.supporting_quotes, &r.supporting_quotes);
                existing.severity = existing.severity.higher(r.severity);
                if existing.raised_by.is_none() {
                    existing.raised_by = r.raised_by.clone();
                }
            },
        ),
        open_questions: merge_by_key(
            &facts.open_questions,
            question_key,
            |existing, q| {
                if existing.raised_by.is_none() {
                    existing.raised_by = q.raised_by.clone();
                }
                if existing.context.is_none() {
                    existing.context = q.context.clone();
                }
            },
        ),
        notable_quotes: merge_by_key(
            &facts.notable_quotes,
            notable_quote_key,
            |_, _| {},
        ),
    }
    .renumbered()
}

/// Execute the deduplication stage.
///
/// `semantic_model` of `None` means deterministic only.
pub async fn execute_deduplication(
    gateway: &dyn ModelGateway,
    extracted: &ExtractedFacts,
    semantic_model: Option<ModelId>,
) -> StageResult<DeduplicatedFacts> {
    let start = Instant::now();
    let deterministic = deterministic_dedup(&extracted.facts);

    let model = match semantic_model {
        Some(model) if !is_low_complexity(&deterministic) => model,
        _ => {
            info!(
                "Deduplication: deterministic only ({} -> {} decisions, {} -> {} commitments)",
                extracted.facts.decisions.len(),
                deterministic.decisions.len(),
                extracted.facts.commitments.len(),
                deterministic.commitments.len()
            );
            let data = package(&extracted.facts, deterministic, None, None);
            return StageResult::succeeded(data, elapsed_ms(start), TokenUsage::default());
        }
    };

    info!("Deduplication: semantic pass with {}", model);
    let (outcome, usage) = semantic_pass(gateway, &deterministic, model).await;

    let data = match outcome {
        Ok(merged) => {
            info!(
                "Deduplication: semantic pass merged {} -> {} decisions",
                deterministic.decisions.len(),
                merged.decisions.len()
            );
            package(&extracted.facts, merged, Some(model), None)
        }
        Err(reason) => {
            warn!("Semantic deduplication discarded: {}", reason);
            package(&extracted.facts, deterministic, None, Some(reason))
        }
    };

    StageResult::succeeded(data, elapsed_ms(start), usage)
}

async fn semantic_pass(
    gateway: &dyn ModelGateway,
    input: &FactSet,
    model: ModelId,
) -> (Result<FactSet, String>, TokenUsage) {
    let payload = match serde_json::to_string_pretty(input) {
        Ok(payload) => payload,
        Err(e) => return (Err(format!("could not serialize facts: {}", e)), TokenUsage::default()),
    };

    let request = ModelRequest::new(model, DEDUPLICATION_PROMPT, payload)
        .temperature(0.0)
        .json();

    let response = match gateway.complete(request).await {
        Ok(response) => response,
        Err(e) => return (Err(e.to_string()), TokenUsage::default()),
    };

    let outcome = parse_with(&response.content, coerce_fact_set)
        .map_err(|failure| failure.to_string())
        .and_then(|parsed| {
            debug!("Semantic dedup output parsed via {}", parsed.method);
            reconcile_semantic(input, parsed.data)
        });

    (outcome, response.usage)
}

/// Accept a semantic merge only if it is a pure merge of `input`.
///
/// Groups the model left out (or emptied) are taken from `input`. No group
/// may grow, evidence must be the same set of quotes, participants and
/// notable quotes are kept whole, and items without quotes must survive.
fn reconcile_semantic(input: &FactSet, mut output: FactSet) -> Result<FactSet, String> {
    keep_if_missing(&mut output.participants, &input.participants);
    keep_if_missing(&mut output.decisions, &input.decisions);
    keep_if_missing(&mut output.commitments, &input.commitments);
    keep_if_missing(&mut output.risks, &input.risks);
    keep_if_missing(&mut output.open_questions, &input.open_questions);
    keep_if_missing(&mut output.notable_quotes, &input.notable_quotes);

    ensure_no_growth("decisions", input.decisions.len(), output.decisions.len())?;
    ensure_no_growth("commitments", input.commitments.len(), output.commitments.len())?;
    ensure_no_growth("risks", input.risks.len(), output.risks.len())?;
    ensure_no_growth("open questions", input.open_questions.len(), output.open_questions.len())?;
    ensure_no_growth("notable quotes", input.notable_quotes.len(), output.notable_quotes.len())?;

    let before: HashSet<&str> = input.supporting_quotes().map(|q| q.quote.as_str()).collect();
    let after: HashSet<&str> = output.supporting_quotes().map(|q| q.quote.as_str()).collect();
    if let Some(invented) = after.difference(&before).next() {
        return Err(format!("introduced a quote not in the input: \"{}\"", invented));
    }
    if let Some(dropped) = before.difference(&after).next() {
        return Err(format!("dropped a supporting quote: \"{}\"", dropped));
    }

    let known: HashSet<&str> = input.participants.iter().map(|p| p.trim()).collect();
    let kept: HashSet<&str> = output.participants.iter().map(|p| p.trim()).collect();
    if let Some(stranger) = kept.difference(&known).next() {
        return Err(format!("introduced an unknown participant: {}", stranger));
    }
    if let Some(missing) = known.difference(&kept).next() {
        return Err(format!("dropped a participant: {}", missing));
    }

    ensure_keys_kept("notable quote", &input.notable_quotes, &output.notable_quotes, notable_quote_key)?;
    ensure_keys_kept(
        "decision",
        input.decisions.iter().filter(|d| d.supporting_quotes.is_empty()),
        &output.decisions,
        decision_key,
    )?;
    ensure_keys_kept(
        "commitment",
        input.commitments.iter().filter(|c| c.supporting_quotes.is_empty()),
        &output.commitments,
        commitment_key,
    )?;
    ensure_keys_kept(
        "risk",
        input.risks.iter().filter(|r| r.supporting_quotes.is_empty()),
        &output.risks,
        risk_key,
    )?;

    Ok(output.renumbered())
}

fn keep_if_missing<T: Clone>(group: &mut Vec<T>, fallback: &[T]) {
    if group.is_empty() {
        *group = fallback.to_vec();
    }
}

fn ensure_no_growth(group: &str, before: usize, after: usize) -> Result<(), String> {
    if after > before {
        return Err(format!("{} grew from {} to {}", group, before, after));
    }
    Ok(())
}

fn ensure_keys_kept<'a, T: 'a>(
    kind: &str,
    required: impl IntoIterator<Item = &'a T>,
    output: &[T],
    key: fn(&T) -> String,
) -> Result<(), String> {
    let present: HashSet<String> = output.iter().map(key).collect();
    match required.into_iter().map(key).find(|k| !present.contains(k)) {
        Some(missing) => Err(format!("dropped {} \"{}\"", kind, missing)),
        None => Ok(()),
    }
}

fn decision_key(d: &Decision) -> String {
    normalize_text(&d.description)
}

fn commitment_key(c: &Commitment) -> String {
    format!("{}::{}", normalize_text(&c.owner), normalize_text(&c.task))
}

fn risk_key(r: &Risk) -> String {
    normalize_text(&r.description)
}

fn question_key(q: &OpenQuestion) -> String {
    normalize_text(&q.question)
}

fn notable_quote_key(q: &NotableQuote) -> String {
    normalize_text(&q.quote)
}

fn package(
    original: &FactSet,
    facts: FactSet,
    model_used: Option<ModelId>,
    semantic_fallback_reason: Option<String>,
) -> DeduplicatedFacts {
    DeduplicatedFacts {
        deduplication_metadata: DeduplicationMetadata {
            original_decision_count: original.decisions.len(),
            merged_decision_count: facts.decisions.len(),
            original_commitment_count: original.commitments.len(),
            merged_commitment_count: facts.commitments.len(),
            original_risk_count: original.risks.len(),
            merged_risk_count: facts.risks.len(),
            deduplication_timestamp: Utc::now(),
            model_used,
            semantic_fallback_reason,
        },
        facts,
    }
}

/// Order-preserving group-by with an in-place merge for later duplicates
fn merge_by_key<T, K, M>(items: &[T], key: K, mut merge: M) -> Vec<T>
where
    T: Clone,
    K: Fn(&T) -> String,
    M: FnMut(&mut T, &T),
{
    let mut merged: Vec<T> = Vec::with_capacity(items.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for item in items {
        match index.get(&key(item)) {
            Some(&i) => merge(&mut merged[i], item),
            None => {
                index.insert(key(item), merged.len());
                merged.push(item.clone());
            }
        }
    }

    merged
}

fn union_quotes(into: &mut Vec<SupportingQuote>, from: &[SupportingQuote]) {
    for quote in from {
        if !into.contains(quote) {
            into.push(quote.clone());
        }
    }
}
