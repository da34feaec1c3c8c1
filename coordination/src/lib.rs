//! Quorum Coordination Library
//!
//! The deterministic, model-free half of the quorum refinement pipelines:
//!
//! - Agent registry with the debate and sequential rosters
//! - Scores, judgments, and the append-only iteration log
//! - Selection-index validation with last-iteration fallback
//! - Refinement phase state machine with a transition trace
//! - Carry-forward guidance distilled from a judgment
//! - Feedback probes (Flesch–Kincaid readability)
//!
//! Nothing in this crate performs I/O; everything that talks to a model
//! lives in `quorum-agents`.

#![allow(clippy::uninlined_format_args)]

pub mod agent_profile;
pub mod debate;
pub mod feedback;
pub mod state;

pub use agent_profile::{Agent, AgentRoster, Priority, RosterError};
pub use debate::{
    distill_guidance, format_guidance, PipelineKind, RefinementPhase, TransitionError, UnitSession,
};
pub use feedback::{FeedbackProbe, FeedbackReport, GradeLevelProbe};
pub use state::{
    AxisScores, IterationLog, IterationRecord, JsonObject, Judgment, ResolvedSelection,
    ScoreAxis, SelectionResult,
};
