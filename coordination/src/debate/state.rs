//! Refinement state machine: phases, transitions, and per-unit session tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Which refinement loop a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    /// Multi-agent debate and synthesis.
    Debate,
    /// Single-agent translate/judge loop with selection and polish.
    Sequential,
    /// Phrase-level translate loop carrying a focus note forward, then selection.
    CognitiveUser,
    /// Meaning-then-wording translate loop carrying a focus note forward, then selection.
    CognitiveDualloop,
}

impl PipelineKind {
    /// Phase every session of this kind must enter first.
    pub fn entry_phase(self) -> RefinementPhase {
        match self {
            Self::Debate => RefinementPhase::InitialGeneration,
            Self::Sequential | Self::CognitiveUser | Self::CognitiveDualloop => {
                RefinementPhase::Translate
            }
        }
    }

    /// Whether the loop has no judge or polish stage.
    pub fn is_cognitive(self) -> bool {
        matches!(self, Self::CognitiveUser | Self::CognitiveDualloop)
    }
}

impl std::fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debate => write!(f, "debate"),
            Self::Sequential => write!(f, "sequential"),
            Self::CognitiveUser => write!(f, "cognitive_user"),
            Self::CognitiveDualloop => write!(f, "cognitive_dualloop"),
        }
    }
}

/// Phase of a unit's refinement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementPhase {
    /// Session created, no stage run yet.
    Start,
    /// Every agent drafts independently.
    InitialGeneration,
    /// Every agent critiques all current drafts.
    DebateRound,
    /// Every agent revises its own draft.
    RevisionRound,
    /// One call merges the agents' final drafts.
    FinalSynthesis,
    /// The single agent drafts or redrafts.
    Translate,
    /// The single agent judges its latest draft.
    SelfJudge,
    /// One iteration is chosen from the log.
    Select,
    /// The chosen text gets a final light edit.
    Polish,
    /// Unit finished with a final text.
    Done,
    /// Unit aborted by an unrecoverable stage error.
    Failed,
}

impl RefinementPhase {
    /// Whether this is a terminal phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Valid transitions from this phase for a pipeline kind, ignoring the
    /// iteration budget. Cognitive loops skip SelfJudge and Polish.
    pub fn valid_transitions(self, kind: PipelineKind) -> &'static [RefinementPhase] {
        let cognitive = kind.is_cognitive();
        match self {
            Self::Start => match kind {
                PipelineKind::Debate => &[Self::InitialGeneration, Self::Failed],
                _ => &[Self::Translate, Self::Failed],
            },
            Self::InitialGeneration => &[Self::DebateRound, Self::Failed],
            Self::DebateRound => &[Self::RevisionRound, Self::Failed],
            Self::RevisionRound => &[Self::DebateRound, Self::FinalSynthesis, Self::Failed],
            Self::FinalSynthesis => &[Self::Done, Self::Failed],
            Self::Translate if cognitive => &[Self::Translate, Self::Select, Self::Failed],
            Self::Translate => &[Self::SelfJudge, Self::Failed],
            Self::SelfJudge => &[Self::Translate, Self::Select, Self::Failed],
            Self::Select if cognitive => &[Self::Done, Self::Failed],
            Self::Select => &[Self::Polish, Self::Failed],
            Self::Polish => &[Self::Done, Self::Failed],
            Self::Done | Self::Failed => &[],
        }
    }

    /// Phases that open a new refinement iteration.
    fn opens_iteration(self) -> bool {
        matches!(self, Self::DebateRound | Self::Translate)
    }

    /// Phases that may only be entered once the budget is spent.
    fn closes_loop(self) -> bool {
        matches!(self, Self::FinalSynthesis | Self::Select)
    }
}

impl std::fmt::Display for RefinementPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::InitialGeneration => write!(f, "initial_generation"),
            Self::DebateRound => write!(f, "debate_round"),
            Self::RevisionRound => write!(f, "revision_round"),
            Self::FinalSynthesis => write!(f, "final_synthesis"),
            Self::Translate => write!(f, "translate"),
            Self::SelfJudge => write!(f, "self_judge"),
            Self::Select => write!(f, "select"),
            Self::Polish => write!(f, "polish"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A phase transition record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: RefinementPhase,
    pub to: RefinementPhase,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Error for invalid state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: RefinementPhase,
    pub to: RefinementPhase,
    pub reason: String,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid transition {} → {}: {}",
            self.from, self.to, self.reason
        )
    }
}

impl std::error::Error for TransitionError {}

/// Refinement progress of one unit of work.
///
/// Iteration count is enforced here: the loop cannot close early and
/// cannot run past `iteration_budget`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitSession {
    /// 0-based position of the unit in the input.
    pub unit_index: usize,
    pub kind: PipelineKind,
    pub phase: RefinementPhase,
    /// Refinement iterations entered so far.
    pub current_iteration: u32,
    /// Configured refinement iterations.
    pub iteration_budget: u32,
    pub transitions: Vec<PhaseTransition>,
    pub created_at: DateTime<Utc>,
}

impl UnitSession {
    pub fn new(unit_index: usize, kind: PipelineKind, iteration_budget: u32) -> Self {
        Self {
            unit_index,
            kind,
            phase: RefinementPhase::Start,
            current_iteration: 0,
            iteration_budget,
            transitions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Transition to a new phase with a reason.
    pub fn transition(
        &mut self,
        to: RefinementPhase,
        reason: &str,
    ) -> Result<(), TransitionError> {
        let entry = self.kind.entry_phase();
        if self.phase == RefinementPhase::Start && to != entry && to != RefinementPhase::Failed {
            return Err(self.reject(to, format!("{} pipeline starts with {entry}", self.kind)));
        }
        let allowed = self.phase.valid_transitions(self.kind);
        if !allowed.contains(&to) {
            return Err(self.reject(
                to,
                format!("not a valid {} transition (allowed: {allowed:?})", self.kind),
            ));
        }
        if to.opens_iteration() && !self.has_iterations_remaining() {
            return Err(self.reject(
                to,
                format!("iteration budget of {} exhausted", self.iteration_budget),
            ));
        }
        if to.closes_loop() && self.has_iterations_remaining() {
            return Err(self.reject(
                to,
                format!(
                    "only {}/{} iterations run",
                    self.current_iteration, self.iteration_budget
                ),
            ));
        }

        self.transitions.push(PhaseTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = to;

        if to.opens_iteration() {
            self.current_iteration += 1;
        }
        debug!(
            unit = self.unit_index,
            phase = %to,
            iteration = self.current_iteration,
            reason,
            "phase transition"
        );

        Ok(())
    }

    /// Move to `Failed` from any non-terminal phase.
    pub fn fail(&mut self, reason: &str) -> Result<(), TransitionError> {
        self.transition(RefinementPhase::Failed, reason)
    }

    fn reject(&self, to: RefinementPhase, reason: String) -> TransitionError {
        TransitionError {
            from: self.phase,
            to,
            reason,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn has_iterations_remaining(&self) -> bool {
        self.current_iteration < self.iteration_budget
    }

    /// Compact status line.
    pub fn status_line(&self) -> String {
        format!(
            "[{}] unit {} | {} iteration {}/{} | {} transitions",
            self.phase,
            self.unit_index + 1,
            self.kind,
            self.current_iteration,
            self.iteration_budget,
            self.transitions.len()
        )
    }
}
