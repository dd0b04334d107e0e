use crate::models::MeetingMetadata;
use crate::models::request::non_blank;

/// Extraction system prompt (model-agnostic fact contract)
pub const EXTRACTION_PROMPT: &str = r#"You are a precise fact extraction system. Extract structured data from a meeting transcript.

## TASK
Read the whole transcript. Extract every fact into the JSON schema below.

## OUTPUT
Wrap the final JSON in XML tags exactly like this:

<extracted_data>
{ ... }
</extracted_data>

The tags are required. Output the complete JSON inside them.

## SCHEMA

<extracted_data>
{
  "participants": ["Name 1", "Name 2"],
  "decisions": [
    {
      "decision_id": "D1",
      "description": "What was decided, with its exact meaning",
      "certainty_level": "confirmed | tentative | uncertain",
      "supporting_quotes": [
        { "quote": "Exact words spoken", "timestamp": "00:15:30", "speaker": "Name" }
      ]
    }
  ],
  "commitments": [
    {
      "commitment_id": "C1",
      "owner": "Person who committed",
      "task": "What they will do",
      "due_date": "Friday | next week | null",
      "certainty_level": "confirmed | tentative | uncertain",
      "supporting_quotes": [
        { "quote": "Exact words", "timestamp": null, "speaker": "Name" }
      ]
    }
  ],
  "risks": [
    {
      "risk_id": "R1",
      "description": "The concern that was raised",
      "severity": "high | medium | low | uncertain",
      "raised_by": "Name or null",
      "supporting_quotes": [
        { "quote": "Exact words", "timestamp": null, "speaker": "Name" }
      ]
    }
  ],
  "open_questions": [
    {
      "question_id": "Q1",
      "question": "The unresolved question",
      "raised_by": "Name or null",
      "context": "Why it matters, or null"
    }
  ],
  "notable_quotes": [
    {
      "quote": "A significant statement",
      "speaker": "Name or null",
      "timestamp": "00:45:00 or null",
      "significance": "Why it matters"
    }
  ]
}
</extracted_data>

## RULES
1. NO summarization. Keep the exact meaning of what was said.
2. NO tone smoothing. Blunt or critical remarks stay blunt.
3. NO inferred intent. Extract only what was explicitly stated.
4. When something is unclear, use certainty_level "uncertain".
5. Include every decision, even minor ones.
6. Every commitment needs an owner.
7. Use null for missing timestamps and speakers.

## CERTAINTY LEVELS
- confirmed: explicitly agreed ("We've decided...", "Agreed", "Let's do it")
- tentative: leaning toward it but not final ("I think we should...", "Let's plan to...")
- uncertain: unclear or contradictory signals

## SEVERITY LEVELS
- high: could block progress or cause serious problems
- medium: a notable concern that needs attention
- low: minor, mentioned but not urgent
- uncertain: unclear how serious

Your response MUST contain the <extracted_data> tags."#;

/// Semantic deduplication system prompt
pub const DEDUPLICATION_PROMPT: &str = r#"You are a deduplication system. Merge duplicate or near-duplicate items in structured meeting data.

## INPUT
A JSON object with participants, decisions, commitments, risks, open_questions and notable_quotes.

## OUTPUT
The same JSON structure with duplicates merged. Respond with ONLY valid JSON.

## MERGING RULES
Decisions: merge when the same core decision appears more than once. Keep the most complete description, combine all supporting_quotes, and keep the HIGHER certainty (confirmed > tentative > uncertain).
Commitments: merge when the owner and intent are the same. Keep the clearer task, combine all supporting_quotes, keep the most specific due_date and the HIGHER certainty.
Risks: merge when they describe the same concern. Keep the more detailed description, combine all supporting_quotes, keep the HIGHER severity.
Open questions: merge when they ask the same thing. Keep the clearer phrasing.
Notable quotes: remove exact duplicates only.

## CONSTRAINTS
1. Do NOT introduce new facts, participants or quotes.
2. Do NOT change the meaning of any item.
3. Do NOT remove items unless they are true duplicates.
4. Preserve ALL supporting quotes word for word.
5. Output ONLY the merged JSON object."#;

/// Synthesis system prompt; the writer never sees the transcript
pub const SYNTHESIS_PROMPT: &str = r#"You are a professional technical writer. Turn structured meeting data into a clear, executive-ready summary.

## INPUT
1. Structured JSON with participants, decisions, commitments, risks, open_questions and notable_quotes
2. Template instructions with formatting preferences

## OUTPUT
A Markdown document.

## LANGUAGE MUST MATCH CERTAINTY
- confirmed: definitive language ("The team decided...", "It was agreed...")
- tentative: cautious language ("The team is considering...", "A preliminary decision...")
- uncertain: state the ambiguity ("It is unclear whether...", "This needs confirmation...")

## TONE
Professional, calm and direct. No "AI voice" ("In conclusion", "It's worth noting", "Importantly"). No filler. No hedging beyond what certainty requires.

## STRUCTURE
- ## headers for sections
- Bullet points for lists
- Checkboxes (- [ ]) for action items
- Blockquotes (>) for significant quotes
- Short paragraphs

## INTEGRITY
- Do NOT invent anything that is not in the structured data.
- Do NOT infer intent beyond what is stated.
- When information is missing, say so ("No deadline was specified").
- Keep strong statements strong. Do NOT soften criticism or concerns.

## ORDER
Open with a one-line context, group related decisions, list commitments with owners, highlight risks, and end with open questions if any exist."#;

/// Adversarial validation system prompt
pub const VALIDATION_PROMPT: &str = r#"You are an adversarial validation system. Verify that a meeting summary is fully supported by the extracted facts.

## INPUTS
1. Extracted facts (JSON)
2. The written summary (Markdown)

## OUTPUT
Respond with ONLY valid JSON in this schema:
{
  "overall_confidence_score": 0-100,
  "decision_validations": [
    {
      "decision_id": "D1",
      "confidence": 0-100,
      "has_supporting_evidence": true,
      "language_matches_certainty": true,
      "issues": ["specific issue"]
    }
  ],
  "commitment_validations": [
    {
      "commitment_id": "C1",
      "confidence": 0-100,
      "has_owner": true,
      "has_supporting_evidence": true,
      "issues": ["specific issue"]
    }
  ],
  "flagged_issues": [
    {
      "type": "missing_evidence | tone_softening | overgeneralization | missing_owner | certainty_mismatch | unsupported_claim",
      "severity": "warning | error",
      "description": "What is wrong",
      "location": "Quote or reference from the summary",
      "suggested_fix": "How to fix it, or null"
    }
  ]
}

## CHECKS
For each decision: does it map to an extracted decision, is it accurate, and does the language strength match its certainty_level?
For each commitment: does it have a clear owner that matches the extracted data, and is the task accurate?
In general: claims not in the facts are unsupported_claim, softened statements are tone_softening, generalized details are overgeneralization.

## SCORING
- 90-100: fully supported, language appropriate
- 70-89: minor issues
- 50-69: several issues need attention
- below 50: significant problems

Be strict but fair, flag every issue, and output ONLY the JSON object."#;

/// One-shot tone guidance appended for high-variance writers
pub const TONE_EXAMPLE: &str = r#"

## TONE EXAMPLE

Input facts (abbreviated):
{
  "decisions": [{ "description": "Switch to weekly deploys", "certainty_level": "confirmed" }],
  "commitments": [{ "owner": "Sarah", "task": "Update CI pipeline", "due_date": "Friday" }]
}

Good:
"The team will switch to weekly deployments, effective immediately. Sarah owns the CI pipeline update, due Friday."

Too soft:
"The team discussed potentially moving toward weekly deployments. Sarah mentioned she might look into the CI pipeline."

AI voice:
"In conclusion, it's worth noting that the team has made the important decision to transition to weekly deployments.""#;

/// Extraction prompt with meeting context and the correction table appended
pub fn extraction_prompt_with_metadata(metadata: Option<&MeetingMetadata>) -> String {
    let mut prompt = EXTRACTION_PROMPT.to_string();
    let Some(metadata) = metadata else {
        return prompt;
    };

    let lines = context_lines(metadata, "Expected Participants");
    if !lines.is_empty() {
        prompt.push_str("\n\n## MEETING CONTEXT\nThe following information is provided to help with accurate extraction:\n");
        prompt.push_str(&lines.join("\n"));
        prompt.push_str(
            "\n\nUse this context to:\n\
             - Match speaker names in the transcript to the expected participants\n\
             - Understand the setting when extracting decisions and commitments\n\
             - Prefer the expected participant names when identifying speakers",
        );
        if let Some(client) = non_blank(&metadata.client_name) {
            prompt.push_str(&format!(
                "\n- IMPORTANT: If a quote clearly comes from someone at the client organization but the speaker cannot be identified, attribute it to \"{}\" rather than null",
                client
            ));
        }
    }

    let corrections: Vec<String> = metadata
        .dictionary
        .iter()
        .filter(|d| !d.incorrect.trim().is_empty() && !d.correct.trim().is_empty())
        .map(|d| format!("  - \"{}\" → \"{}\"", d.incorrect.trim(), d.correct.trim()))
        .collect();
    if !corrections.is_empty() {
        prompt.push_str("\n\n## TRANSCRIPTION CORRECTIONS\nThese words are commonly mistranscribed. When you see the incorrect spelling, use the correct one in your output:\n");
        prompt.push_str(&corrections.join("\n"));
        prompt.push_str("\n\nApply these corrections to names, quotes and all extracted text.");
    }

    prompt
}

/// Synthesis prompt with the caller's template appended
pub fn synthesis_prompt_with_template(template_prompt: &str) -> String {
    format!(
        "{}\n\n## TEMPLATE INSTRUCTIONS\n{}",
        SYNTHESIS_PROMPT, template_prompt
    )
}

/// Meeting context block for the writer, if there is any context
pub fn synthesis_context(metadata: &MeetingMetadata) -> Option<String> {
    let lines = context_lines(metadata, "Participants");
    if lines.is_empty() {
        return None;
    }

    let mut context = format!("\n\n## MEETING CONTEXT\n{}\n\n", lines.join("\n"));
    context.push_str(
        "Use this context to inform the summary:\n\
         - Refer to participants by name where appropriate\n\
         - Put the meeting name and date in the summary header if provided\n\
         - Use the client name to say who the meeting was with",
    );
    if let Some(client) = non_blank(&metadata.client_name) {
        context.push_str(&format!(
            "\n- Client-side perspectives may be attributed to \"{}\" when no specific name is available",
            client
        ));
    }
    Some(context)
}

pub fn build_synthesis_user_prompt(facts_json: &str) -> String {
    format!(
        "Write a meeting summary based on the following extracted facts:\n\n{}",
        facts_json
    )
}

pub fn build_validation_user_prompt(facts_json: &str, summary: &str) -> String {
    format!(
        "## EXTRACTED FACTS\n```json\n{}\n```\n\n## WRITTEN SUMMARY\n{}",
        facts_json, summary
    )
}

fn context_lines(metadata: &MeetingMetadata, participants_label: &str) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(client) = non_blank(&metadata.client_name) {
        lines.push(format!("- Client/Company: {}", client));
    }
    if let Some(name) = non_blank(&metadata.meeting_name) {
        lines.push(format!("- Meeting Name: {}", name));
    }
    if let Some(date) = non_blank(&metadata.date) {
        lines.push(format!("- Date: {}", date));
    }
    let participants: Vec<&str> = metadata
        .participants
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect();
    if !participants.is_empty() {
        lines.push(format!("- {}: {}", participants_label, participants.join(", ")));
    }
    lines
}
