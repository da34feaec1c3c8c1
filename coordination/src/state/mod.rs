//! Refinement state: scores, judgments, and the per-unit iteration log.
//!
//! Everything a refinement loop accumulates for one unit of work lives here:
//!
//! - [`AxisScores`]: optional 1–10 scores per axis, parsed leniently
//! - [`Judgment`]: a self-assessment of one candidate
//! - [`IterationRecord`] / [`IterationLog`]: append-only candidate history
//! - [`SelectionResult`]: the chosen iteration and its final text
//!
//! Records are never mutated after they are appended; later stages only
//! read them.

pub mod types;

pub use types::{
    lenient_scores, lenient_text, score_from_value, text_from_value, AxisScores, IterationLog, IterationRecord,
    Judgment, JsonObject, LogError, ResolvedSelection, ScoreAxis, SelectionResult, MAX_SCORE,
    MIN_SCORE,
};
