//! Refinement Orchestration: phase machine and carry-forward guidance.
//!
//! # Debate Flow
//!
//! ```text
//! Start → InitialGeneration → DebateRound → RevisionRound ─┬─ rounds left → DebateRound
//!                                                          └─ budget spent → FinalSynthesis → Done
//! ```
//!
//! # Sequential Flow
//!
//! ```text
//! Start → Translate → SelfJudge ─┬─ iterations left → Translate
//!                                └─ budget spent → Select → Polish → Done
//! ```
//!
//! Any non-terminal phase may move to `Failed`.

pub mod guidance;
pub mod state;

pub use guidance::{distill_guidance, format_guidance, FALLBACK_GUIDANCE, GUIDANCE_SCORE_THRESHOLD};
pub use state::{PhaseTransition, PipelineKind, RefinementPhase, TransitionError, UnitSession};
