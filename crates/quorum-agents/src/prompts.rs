//! Prompt builders for every refinement stage.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever prompt content changes,
//! so a run result can be traced back to the prompts that produced it.
//!
//! Every builder returns a [`PromptPair`]. Builders are pure: the same
//! inputs always yield the same text, which keeps the scripted backends in
//! the tests deterministic.

use coordination::state::{text_from_value, JsonObject};
use coordination::{format_guidance, Agent, AxisScores};
use serde_json::{Map, Value};

use crate::modes::cognitive::CognitiveLoop;
use crate::modes::runner::UnitInput;
use crate::modes::types::ReferenceText;

/// Prompt version. Bump on any prompt content change.
pub const PROMPT_VERSION: &str = "1.4.0";

/// Used when the caller supplied no preference text.
pub const DEFAULT_USER_PREFERENCE: &str = "No additional user preference provided.";

/// The three quality axes every generation and judging prompt balances.
pub const GOALS_GUIDANCE: &str = "\
- faithfulness: how strictly similar to the source language is it?
- readability: how well does it flow, does it minimize convoluted sentences, does it make things easy to understand?
- modernity: does it minimize archaic words and structure, does it feel like reading a modern article, book or post?";

const SCORES_TEMPLATE: &str = r#"{
    "faithfulness": 1-10,
    "readability": 1-10,
    "modernity": 1-10
  }"#;

const STYLE_RULES: &str = "\
Translate by meaning, not by source word order; recast syntax when needed so the English reads naturally.
Before finalizing, explore several plausible phrasings and keep the clearest one that still preserves meaning.
Keep the tone clear and dignified: simple modern English without cutesy wording, slang, or bookish scaffolding.";

const INITIAL_SYSTEM: &str = "\
You are one member of a translation quorum. You always output JSON only.";

const DEBATE_SYSTEM: &str = "\
You are a translator-debater in a quorum. Critique rigorously but constructively. Output JSON only.";

const REVISION_SYSTEM: &str = "\
You are revising your translation after debate. Preserve meaning while improving according to \
your priority. Output JSON only.";

const SYNTHESIS_SYSTEM: &str = "\
You are the final synthesis agent. Prioritize the user preference prompt, then balance \
faithfulness, readability, and modernity. Output JSON only.";

const TRANSLATE_SYSTEM: &str = "\
You are a single translation agent iterating on one paragraph. Output JSON only.";

const JUDGE_SYSTEM: &str = "\
You are a strict self-critic for a translation iteration. Judge against instructions and \
provide actionable revision feedback. Output JSON only.";

const SELECT_SYSTEM: &str = "\
You are the final selector for a sequential translation loop. Choose and lightly refine the \
best iteration result for the stated audience and preference. Output JSON only.";

const POLISH_SYSTEM: &str = "\
You are a final plain-English polisher for a translation pipeline. Rewrite once for natural \
readability while preserving meaning. Output JSON only.";

const PHRASE_TRANSLATE_SYSTEM: &str = "\
You are a phrase-level translation agent. You work the way an expert human translator \
thinks and you output JSON only.";

const PHRASE_SELECT_SYSTEM: &str = "\
You are the final selector for a phrase-level cognitive translation loop. Output JSON only.";

const DUAL_TRANSLATE_SYSTEM: &str = "\
You are a dual-loop translation agent. Run a meaning loop first, then a wording loop. \
Output JSON only.";

const DUAL_SELECT_SYSTEM: &str = "\
You are the final selector for a dual-loop translation pipeline. Output JSON only.";

const COGNITIVE_REGISTER_RULES: &str = "\
Keep meaning and relations intact while allowing full syntax recasting for natural English.
Readability for younger audiences means clarity and plain syntax, not childish diction.
Keep a consistent literary-prose register for written prose; avoid colloquial phrasing.
If carry-forward focus is provided, act on it directly in this pass.";

const PHRASE_PROCESS: &str = "\
1) Work phrase by phrase in source order.
2) For each phrase: understand it in the context of its sentence and paragraph, write one very simple English anchor, refine it for connotation and source feel, test alternatives, and choose one.
3) Zoom out to sentence and paragraph level periodically while working through phrases.
4) After the phrase decisions, compose one natural English paragraph.";

const PHRASE_TEMPLATE: &str = r#"{
  "phrase_process_notes": [
    {
      "source_phrase": "...",
      "context_note": "...",
      "simple_anchor": "...",
      "connotation_targets": "...",
      "candidate_options": ["...", "..."],
      "chosen_phrase": "..."
    }
  ],
  "zoom_out_notes": "brief sentence/paragraph-level checks",
  "translation": "...",
  "next_iteration_focus": "1-3 concrete improvements for the next pass"
}"#;

const DUAL_PROCESS: &str = "\
Meaning loop:
1) Build a scene model: speaker, addressee, intent, stance, tone.
2) Break the paragraph into atomic claims and the relations between them (contrast, condition, modality, rhetoric).
3) Write a plain restatement for a young reader.
4) Build a constraint ledger of non-negotiables to preserve and negotiables that may be rephrased freely.
Wording loop:
5) Draft three variants: source-close, plain-natural, and balanced.
6) Merge them into one final paragraph of publication quality.";

const DUAL_TEMPLATE: &str = r#"{
  "scene_model": "...",
  "claim_map": ["...", "..."],
  "plain_restatement": "...",
  "constraint_ledger": {
    "non_negotiables": ["...", "..."],
    "negotiables": ["...", "..."]
  },
  "drafts": {
    "source_close": "...",
    "plain_natural": "...",
    "balanced": "..."
  },
  "translation": "...",
  "next_iteration_focus": "1-3 concrete improvements for the next pass"
}"#;

/// A system message and a user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

impl PromptPair {
    fn new(system: &str, user: String) -> Self {
        Self {
            system: system.to_string(),
            user: user.trim().to_string(),
        }
    }
}

/// Empty or whitespace-only preference text becomes the default preference.
pub fn normalize_preference(preference: &str) -> String {
    let cleaned = preference.trim();
    if cleaned.is_empty() {
        DEFAULT_USER_PREFERENCE.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Reference texts for one unit, one bullet per source in the order given.
pub fn reference_context_block(references: &[ReferenceText]) -> String {
    if references.is_empty() {
        return "Reference translations for context: none provided.".to_string();
    }
    let mut block = String::from("Reference translations for context:");
    for reference in references {
        block.push_str(&format!("\n- {}: {}", reference.source, reference.text.trim()));
    }
    block
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn header(unit: &UnitInput, preference: &str) -> String {
    format!(
        "Paragraph {index} source:\n{source}\n\n{refs}\n\nUser preference prompt:\n{preference}",
        index = unit.index,
        source = unit.source,
        refs = reference_context_block(&unit.references),
    )
}

// ── Debate stages ───────────────────────────────────────────────────────────

pub fn initial_generation(agent: &Agent, unit: &UnitInput, preference: &str) -> PromptPair {
    let user = format!(
        r#"
{header}

Task:
1) Write observations first: restate the paragraph in plain language, compare a few wording options, and note how you will handle hard phrases.
2) Then translate the paragraph into modern English as a single paragraph, using those observations.
3) Keep all three goals in view:
{GOALS_GUIDANCE}
4) Consider the user preference prompt while balancing the goals.
5) Your personal priority is: {priority}.
{STYLE_RULES}

Return strict JSON with exactly these keys:
{{
  "observations": "pre-translation ideation and plan",
  "translation": "...",
  "self_scores": {SCORES_TEMPLATE}
}}
"#,
        header = header(unit, preference),
        priority = agent.priority,
    );
    PromptPair::new(INITIAL_SYSTEM, user)
}

/// Each agent critiques every current candidate, its own included.
pub fn debate_round(
    agent: &Agent,
    unit: &UnitInput,
    preference: &str,
    candidates: &Value,
    iteration: u32,
) -> PromptPair {
    let user = format!(
        r#"
{header}

Current translations by agent:
{candidates}

Debate iteration: {iteration}
Your personal priority: {priority}

Assess every translation (including your own) using these goal definitions:
{GOALS_GUIDANCE}
Also assess how well each translation follows the user preference prompt.

Return strict JSON with exactly these keys:
{{
  "round_summary": "summary of strongest arguments",
  "critiques": [
    {{
      "agent": "{agent_keys}",
      "strengths": "...",
      "concerns": "...",
      "scores": {SCORES_TEMPLATE}
    }}
  ],
  "self_revision_plan": "concrete edits you will make next"
}}
"#,
        header = header(unit, preference),
        candidates = pretty(candidates),
        priority = agent.priority,
        agent_keys = candidate_keys(candidates),
    );
    PromptPair::new(DEBATE_SYSTEM, user)
}

fn candidate_keys(candidates: &Value) -> String {
    candidates
        .as_object()
        .map(|m| m.keys().cloned().collect::<Vec<_>>().join("|"))
        .unwrap_or_default()
}

/// Revise one's own draft given this round's critiques.
///
/// `round_feedback` carries every agent's critiques but only this agent's
/// own revision plan.
pub fn revision_round(
    agent: &Agent,
    unit: &UnitInput,
    preference: &str,
    own_previous: &str,
    candidates: &Value,
    round_feedback: &Value,
    iteration: u32,
) -> PromptPair {
    let user = format!(
        r#"
{header}

Your previous translation:
{own_previous}

Current translations:
{candidates}

Debate outputs this round:
{feedback}

Debate iteration: {iteration}
Your personal priority: {priority}

Revise using these goal definitions:
{GOALS_GUIDANCE}
Also satisfy the user preference prompt while balancing those goals.
{STYLE_RULES}

Return strict JSON with exactly these keys:
{{
  "translation": "...",
  "change_summary": "what changed and why",
  "self_scores": {SCORES_TEMPLATE}
}}
"#,
        header = header(unit, preference),
        candidates = pretty(candidates),
        feedback = pretty(round_feedback),
        priority = agent.priority,
    );
    PromptPair::new(REVISION_SYSTEM, user)
}

/// One call merging the agents' final drafts.
pub fn final_synthesis(unit: &UnitInput, preference: &str, quorum_context: &Value) -> PromptPair {
    let user = format!(
        r#"
{header}

Quorum context (JSON):
{context}

Task:
- Produce one final translation for this paragraph.
- Use these goal definitions:
{GOALS_GUIDANCE}
- Prioritize the user preference prompt when tradeoffs conflict.
- Then balance the three goals while preserving core meaning, argument flow, and key imagery.
- Resolve disagreements using the debate summaries.
{STYLE_RULES}

Return strict JSON with exactly these keys:
{{
  "final_translation": "...",
  "justification": "explanation of balance choices",
  "balance_scores": {SCORES_TEMPLATE}
}}
"#,
        header = header(unit, preference),
        context = pretty(quorum_context),
    );
    PromptPair::new(SYNTHESIS_SYSTEM, user)
}

// ── Sequential stages ───────────────────────────────────────────────────────

/// Carry-over from the previous sequential iteration.
#[derive(Debug, Clone, Copy, Default)]
pub struct CarryForward<'a> {
    pub previous_text: Option<&'a str>,
    pub guidance: Option<&'a [String]>,
    pub feedback: Option<&'a str>,
}

pub fn translate(
    unit: &UnitInput,
    preference: &str,
    iteration: u32,
    carry: CarryForward<'_>,
) -> PromptPair {
    let mut previous = String::new();
    if let Some(text) = carry.previous_text.filter(|t| !t.is_empty()) {
        previous.push_str(&format!("\nPrevious iteration translation:\n{text}\n"));
    }
    if let Some(lines) = carry.guidance.filter(|l| !l.is_empty()) {
        previous.push_str(&format!(
            "\nCarry-forward guidance from previous judgment:\n{}\n",
            format_guidance(lines)
        ));
    }
    if let Some(feedback) = carry.feedback.filter(|f| !f.is_empty()) {
        previous.push_str(&format!("\nAutomated feedback on previous translation:\n{feedback}\n"));
    }

    let user = format!(
        r#"
{header}

Iteration: {iteration}
{previous}
Task:
1) Write observations first as a quick exploration pass: a plain-language restatement, a brief source-close sketch, and a few candidate phrasings.
2) Then produce one improved modern English translation for this paragraph (single paragraph).
3) Use prior guidance (if provided) to fix weaknesses.
4) Prioritize the user preference prompt, then balance these goals:
{GOALS_GUIDANCE}
5) Preserve core meaning, key contrasts, and imagery. Do not add new meaning.
6) Treat reference translations as semantic checks only, not style targets.
{STYLE_RULES}

Return strict JSON with exactly these keys:
{{
  "observations": "brief planning notes for this iteration",
  "translation": "...",
  "self_scores": {SCORES_TEMPLATE}
}}
"#,
        header = header(unit, preference),
    );
    PromptPair::new(TRANSLATE_SYSTEM, user)
}

pub fn self_judge(unit: &UnitInput, preference: &str, translation: &str, iteration: u32) -> PromptPair {
    let user = format!(
        r#"
{header}

Iteration: {iteration}
Translation to judge:
{translation}

Judge this translation on:
{GOALS_GUIDANCE}
Also judge with these priorities:
1) Prioritize the user preference prompt when scoring and planning revisions.
2) Prefer natural modern English over source-shaped phrasing, while preserving meaning.
3) Penalize literal calques, abstraction stacks, forced personification, unclear pronouns, and vocabulary above the target audience level.
4) Penalize cutesy, slangy, or bookish phrasing when a plain dignified alternative preserves meaning.
5) Do not reward simplification that drops any core relation or contrast from the source.
6) Give concrete rewrite proposals, not generic feedback.

Return strict JSON with exactly these keys:
{{
  "overall_judgment": "candid quality assessment",
  "strengths": "concrete strengths",
  "issues": "concrete issues",
  "revision_plan": "concrete edits for next iteration",
  "scores": {SCORES_TEMPLATE}
}}
"#,
        header = header(unit, preference),
    );
    PromptPair::new(JUDGE_SYSTEM, user)
}

/// One row of the compacted view the select stage sees.
pub fn compact_iteration(
    iteration: u32,
    translation: &str,
    self_scores: &AxisScores,
    judgment: Option<&coordination::Judgment>,
) -> Value {
    let (judge_scores, summary, issues, plan) = match judgment {
        Some(j) => (
            j.scores,
            j.overall_assessment.as_str(),
            j.issues.as_str(),
            j.revision_plan.as_str(),
        ),
        None => (AxisScores::default(), "", "", ""),
    };
    serde_json::json!({
        "iteration": iteration,
        "translation": translation,
        "self_scores": self_scores,
        "judge_scores": judge_scores,
        "judge_summary": summary,
        "judge_issues": issues,
        "judge_plan": plan,
    })
}

pub fn select(unit: &UnitInput, preference: &str, compacted: &Value) -> PromptPair {
    let user = format!(
        r#"
{header}

Candidate iterations:
{candidates}

Task:
1) Select the strongest candidate for the user preference while preserving core source meaning.
2) You may rewrite the selected candidate, but keep one paragraph and do not add new meaning.
3) Prioritize user preference first, then balance faithfulness, readability, and modernity.
4) Treat candidate scores as hints only and judge the candidate text directly.

Return strict JSON with exactly these keys:
{{
  "selected_iteration": 1,
  "final_translation": "...",
  "justification": "why this is best for the stated preference",
  "balance_scores": {SCORES_TEMPLATE}
}}
"#,
        header = header(unit, preference),
        candidates = pretty(compacted),
    );
    PromptPair::new(SELECT_SYSTEM, user)
}

pub fn polish(unit: &UnitInput, preference: &str, selected: &str) -> PromptPair {
    let user = format!(
        r#"
Paragraph {index} selected draft:

User preference prompt:
{preference}

Selected translation to polish:
{selected}

Task:
1) Rewrite this translation once for final publication quality.
2) Keep one paragraph and preserve the same core meaning, relations, and contrasts.
3) Do not add new meaning or remove core meaning.
4) If any phrase sounds translated, rewrite it into natural modern English.
5) If two nearby clauses express nearly the same idea, collapse them into one clear plain clause.

Return strict JSON with exactly these keys:
{{
  "polished_translation": "...",
  "polish_notes": "brief explanation of key changes",
  "balance_scores": {SCORES_TEMPLATE}
}}
"#,
        index = unit.index,
    );
    PromptPair::new(POLISH_SYSTEM, user)
}

// ── Cognitive stages ────────────────────────────────────────────────────────

/// One pass of a cognitive loop. Only the previous text and its focus note
/// are carried forward.
pub fn cognitive_translate(
    style: CognitiveLoop,
    unit: &UnitInput,
    preference: &str,
    iteration: u32,
    previous_text: Option<&str>,
    previous_focus: Option<&str>,
) -> PromptPair {
    let mut previous = String::new();
    if let Some(text) = previous_text.filter(|t| !t.is_empty()) {
        previous.push_str(&format!("\nPrevious iteration translation:\n{text}\n"));
    }
    if let Some(focus) = previous_focus.filter(|f| !f.is_empty()) {
        previous.push_str(&format!(
            "\nCarry-forward focus from previous iteration:\n- {focus}\n"
        ));
    }
    let (system, process, template) = match style {
        CognitiveLoop::PhraseLevel => (PHRASE_TRANSLATE_SYSTEM, PHRASE_PROCESS, PHRASE_TEMPLATE),
        CognitiveLoop::DualLoop => (DUAL_TRANSLATE_SYSTEM, DUAL_PROCESS, DUAL_TEMPLATE),
    };
    let user = format!(
        r#"
{header}

Iteration: {iteration}
{previous}
Task ({label}):
{process}
Prioritize the user preference prompt first, then balance these goals:
{GOALS_GUIDANCE}
{COGNITIVE_REGISTER_RULES}

Return strict JSON with exactly these keys:
{template}
"#,
        header = header(unit, preference),
        label = style.process_label(),
    );
    PromptPair::new(system, user)
}

/// One row of the compacted view a cognitive selector sees.
pub fn compact_cognitive_pass(
    style: CognitiveLoop,
    iteration: u32,
    translation: &str,
    payload: &JsonObject,
) -> Value {
    let note_key = style.note_key();
    let text = |key: &str| payload.get(key).map(text_from_value).unwrap_or_default();
    let mut row = Map::new();
    row.insert("iteration".into(), Value::from(iteration));
    row.insert("translation".into(), Value::from(translation));
    row.insert(note_key.into(), Value::from(text(note_key)));
    row.insert(
        "next_iteration_focus".into(),
        Value::from(text("next_iteration_focus")),
    );
    Value::Object(row)
}

pub fn cognitive_select(
    style: CognitiveLoop,
    unit: &UnitInput,
    preference: &str,
    compacted: &Value,
) -> PromptPair {
    let system = match style {
        CognitiveLoop::PhraseLevel => PHRASE_SELECT_SYSTEM,
        CognitiveLoop::DualLoop => DUAL_SELECT_SYSTEM,
    };
    let user = format!(
        r#"
{header}

Candidate iterations:
{candidates}

Task:
1) Pick the strongest candidate.
2) Rewrite it once for final quality, keeping one paragraph and adding no meaning.
3) Prioritize the user preference prompt first, then:
{GOALS_GUIDANCE}
4) Preserve meaning, relations, and source stance while avoiding source-shaped phrasing.
5) Keep the wording natural and readable in a literary prose register with clear plain syntax.

Return strict JSON with exactly these keys:
{{
  "selected_iteration": 1,
  "final_translation": "...",
  "selection_notes": "why this candidate is strongest and what was refined"
}}
"#,
        header = header(unit, preference),
        candidates = pretty(compacted),
    );
    PromptPair::new(system, user)
}
