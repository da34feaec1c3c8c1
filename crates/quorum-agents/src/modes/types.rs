//! Stage definitions, typed stage payloads, and run results.
//!
//! ## Stages
//!
//! | Stage              | Phase             | Fan-out | Temperature |
//! |--------------------|-------------------|---------|-------------|
//! | `initial`          | InitialGeneration | yes     | 0.45        |
//! | `debate`           | DebateRound       | yes     | 0.35        |
//! | `revision`         | RevisionRound     | yes     | 0.45        |
//! | `synthesis`        | FinalSynthesis    | no      | 0.40        |
//! | `translate`        | Translate         | no      | 0.45        |
//! | `self_judge`       | SelfJudge         | no      | 0.30        |
//! | `select`           | Select            | no      | 0.25        |
//! | `polish`           | Polish            | no      | 0.55        |
//!
//! ## Payloads
//!
//! Every stage reply decodes into one of the structs below. Free text and
//! scores are read leniently (see `coordination::state`); only the keys in
//! each payload's `REQUIRED_KEYS` are enforced.

use chrono::{DateTime, Utc};
use coordination::state::{lenient_scores, lenient_text};
use coordination::{
    AgentRoster, AxisScores, IterationLog, PipelineKind, Priority, RefinementPhase,
    SelectionResult,
};
use coordination::debate::PhaseTransition;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::contracts::StagePayload;
use crate::modes::fanout::AgentResults;

// ── Stages ──────────────────────────────────────────────────────────────────

/// Static description of one stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageSpec {
    /// Stage label used in logs and backend requests.
    pub name: &'static str,
    pub phase: RefinementPhase,
    pub temperature: f32,
    /// Whether every agent runs this stage concurrently.
    pub fan_out: bool,
}

impl StageSpec {
    pub const INITIAL_GENERATION: StageSpec = StageSpec {
        name: "initial",
        phase: RefinementPhase::InitialGeneration,
        temperature: 0.45,
        fan_out: true,
    };
    pub const DEBATE_ROUND: StageSpec = StageSpec {
        name: "debate",
        phase: RefinementPhase::DebateRound,
        temperature: 0.35,
        fan_out: true,
    };
    pub const REVISION_ROUND: StageSpec = StageSpec {
        name: "revision",
        phase: RefinementPhase::RevisionRound,
        temperature: 0.45,
        fan_out: true,
    };
    pub const FINAL_SYNTHESIS: StageSpec = StageSpec {
        name: "synthesis",
        phase: RefinementPhase::FinalSynthesis,
        temperature: 0.40,
        fan_out: false,
    };
    pub const TRANSLATE: StageSpec = StageSpec {
        name: "translate",
        phase: RefinementPhase::Translate,
        temperature: 0.45,
        fan_out: false,
    };
    pub const SELF_JUDGE: StageSpec = StageSpec {
        name: "self_judge",
        phase: RefinementPhase::SelfJudge,
        temperature: 0.30,
        fan_out: false,
    };
    pub const SELECT: StageSpec = StageSpec {
        name: "select",
        phase: RefinementPhase::Select,
        temperature: 0.25,
        fan_out: false,
    };
    pub const POLISH: StageSpec = StageSpec {
        name: "polish",
        phase: RefinementPhase::Polish,
        temperature: 0.55,
        fan_out: false,
    };

    /// Every stage, debate stages first.
    pub const ALL: [StageSpec; 8] = [
        Self::INITIAL_GENERATION,
        Self::DEBATE_ROUND,
        Self::REVISION_ROUND,
        Self::FINAL_SYNTHESIS,
        Self::TRANSLATE,
        Self::SELF_JUDGE,
        Self::SELECT,
        Self::POLISH,
    ];
}

// ── Payloads ────────────────────────────────────────────────────────────────

/// Reply of an initial-generation or translate stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftPayload {
    #[serde(default, deserialize_with = "lenient_text")]
    pub observations: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub translation: String,
    #[serde(default, deserialize_with = "lenient_scores")]
    pub self_scores: AxisScores,
}

impl StagePayload for DraftPayload {
    const REQUIRED_KEYS: &'static [&'static str] = &["translation"];
}

/// One agent's critique of one candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerCritique {
    #[serde(default, deserialize_with = "lenient_text")]
    pub agent: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub strengths: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub concerns: String,
    #[serde(default, deserialize_with = "lenient_scores")]
    pub scores: AxisScores,
}

/// Keep only well-formed critique objects; anything else is dropped.
fn lenient_critiques<'de, D>(deserializer: D) -> Result<Vec<PeerCritique>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let Value::Array(items) = value else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

/// Reply of a debate-round stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebatePayload {
    #[serde(default, deserialize_with = "lenient_text")]
    pub round_summary: String,
    #[serde(default, deserialize_with = "lenient_critiques")]
    pub critiques: Vec<PeerCritique>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub self_revision_plan: String,
}

impl StagePayload for DebatePayload {
    const REQUIRED_KEYS: &'static [&'static str] = &["round_summary", "critiques"];
}

/// Reply of a revision-round stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RevisionPayload {
    #[serde(default, deserialize_with = "lenient_text")]
    pub translation: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub change_summary: String,
    #[serde(default, deserialize_with = "lenient_scores")]
    pub self_scores: AxisScores,
}

impl StagePayload for RevisionPayload {
    const REQUIRED_KEYS: &'static [&'static str] = &["translation"];
}

/// Reply of the final-synthesis stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynthesisPayload {
    #[serde(default, deserialize_with = "lenient_text")]
    pub final_translation: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub justification: String,
    #[serde(default, deserialize_with = "lenient_scores")]
    pub balance_scores: AxisScores,
}

impl StagePayload for SynthesisPayload {
    const REQUIRED_KEYS: &'static [&'static str] = &["final_translation"];
}

/// Scores that were either supplied as an object or not supplied at all.
fn optional_scores<'de, D>(deserializer: D) -> Result<Option<AxisScores>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.is_object().then(|| AxisScores::from_value(&value)))
}

/// Reply of the select stage. `selected_iteration` stays raw until it is
/// resolved against the iteration log; a missing or null index resolves to
/// the last iteration, so nothing is required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectPayload {
    #[serde(default)]
    pub selected_iteration: Option<Value>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub final_translation: String,
    /// Cognitive selectors call this `selection_notes`.
    #[serde(default, alias = "selection_notes", deserialize_with = "lenient_text")]
    pub justification: String,
    #[serde(default, deserialize_with = "optional_scores")]
    pub balance_scores: Option<AxisScores>,
}

impl StagePayload for SelectPayload {
    const REQUIRED_KEYS: &'static [&'static str] = &[];
}

/// Reply of one cognitive translate pass. The process notes (phrase notes,
/// scene model, claim map, drafts) are kept only in the raw payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CognitivePassPayload {
    #[serde(default, deserialize_with = "lenient_text")]
    pub translation: String,
    /// Carried verbatim into the next pass's prompt.
    #[serde(default, deserialize_with = "lenient_text")]
    pub next_iteration_focus: String,
    /// Phrase-level loop only.
    #[serde(default, deserialize_with = "lenient_text")]
    pub zoom_out_notes: String,
    /// Dual loop only.
    #[serde(default, deserialize_with = "lenient_text")]
    pub plain_restatement: String,
}

impl StagePayload for CognitivePassPayload {
    const REQUIRED_KEYS: &'static [&'static str] = &["translation"];
}

/// Reply of the polish stage. Nothing is required; an empty text keeps the
/// selected text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolishPayload {
    #[serde(default, deserialize_with = "lenient_text")]
    pub polished_translation: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub polish_notes: String,
    #[serde(default, deserialize_with = "optional_scores")]
    pub balance_scores: Option<AxisScores>,
}

impl StagePayload for PolishPayload {
    const REQUIRED_KEYS: &'static [&'static str] = &[];
}

// ── Per-unit results ────────────────────────────────────────────────────────

/// A reference text aligned to one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceText {
    pub source: String,
    pub text: String,
}

/// Everything one agent produced for one unit.
#[derive(Debug, Clone, Serialize)]
pub struct AgentLog {
    pub priority: Priority,
    /// Iteration 0 is the initial draft; 1..N are revisions (debate),
    /// translate/judge passes (sequential), or translate passes (cognitive).
    pub iterations: IterationLog,
    /// Critiques this agent emitted, one per debate round.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub critiques: Vec<DebatePayload>,
}

impl AgentLog {
    pub fn new(priority: Priority) -> Self {
        Self {
            priority,
            iterations: IterationLog::new(),
            critiques: Vec::new(),
        }
    }
}

/// Round summaries from every agent for one debate round.
#[derive(Debug, Clone, Serialize)]
pub struct RoundSummary {
    pub iteration: u32,
    pub summaries: AgentResults<String>,
}

/// Outcome of the polish stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolishOutcome {
    /// Whether the polished text replaced the selected text.
    pub applied: bool,
    pub notes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<AxisScores>,
}

/// How a unit's final text was reached.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnitOutcome {
    /// Debate: one synthesis call merged the agents' final drafts.
    Synthesis {
        debate_round_summaries: Vec<RoundSummary>,
        synthesis: SynthesisPayload,
    },
    /// Sequential: one iteration was selected, then polished.
    Selection {
        selection: SelectionResult,
        polish: PolishOutcome,
    },
    /// Cognitive loops: one pass was selected and rewritten; there is no polish.
    LoopSelection { selection: SelectionResult },
}

/// Result of refining one input unit.
#[derive(Debug, Clone, Serialize)]
pub struct ParagraphResult {
    /// 1-based position in the input.
    pub paragraph_index: usize,
    pub source_text: String,
    pub reference_texts: Vec<ReferenceText>,
    pub agents: AgentResults<AgentLog>,
    pub final_agent_versions: AgentResults<String>,
    pub outcome: UnitOutcome,
    pub final_text: String,
    pub justification: String,
    pub final_scores: AxisScores,
    /// Every phase transition this unit went through.
    pub trace: Vec<PhaseTransition>,
}

/// The top-level artifact of one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRunResult {
    pub created_at_utc: DateTime<Utc>,
    pub pipeline: PipelineKind,
    pub model: String,
    pub iterations: u32,
    pub agent_count: usize,
    pub user_preference: String,
    pub agents: AgentRoster,
    pub paragraph_count: usize,
    pub paragraphs: Vec<ParagraphResult>,
    /// Every unit's final text, separated by a blank line.
    pub final_text: String,
}

impl PipelineRunResult {
    /// Join unit texts the way the run result reports them.
    pub fn join_final_texts(paragraphs: &[ParagraphResult]) -> String {
        paragraphs
            .iter()
            .map(|p| p.final_text.trim())
            .collect::<Vec<_>>()
            .join("\n\n")
            .trim()
            .to_string()
    }
}
