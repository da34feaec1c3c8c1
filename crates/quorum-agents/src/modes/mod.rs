//! Refinement engines and the machinery they share.
//!
//! ## Sub-modules
//!
//! | Module       | Purpose                                                |
//! |--------------|--------------------------------------------------------|
//! | `errors`     | Unified error taxonomy with retry classification       |
//! | `types`      | Stage table, typed stage payloads, run results         |
//! | `fanout`     | Fail-fast parallel executor keyed by agent             |
//! | `runner`     | RunConfig, RefinementEngine trait, PipelineDriver      |
//! | `debate`     | Draft → critique/revise × N → synthesis                |
//! | `sequential` | Translate/judge × N → select → polish                  |
//! | `cognitive`  | Translate with carried focus × N → select              |

pub mod cognitive;
pub mod debate;
pub mod errors;
pub mod fanout;
pub mod runner;
pub mod sequential;
pub mod types;

// Convenience re-exports used by the CLI and integration tests.
pub use cognitive::{CognitiveEngine, CognitiveLoop};
pub use debate::DebateEngine;
pub use errors::{OrchestrationError, RetryCategory};
pub use fanout::{run_agent_tasks, run_stage, AgentResults};
pub use runner::{
    engine_for, PipelineDriver, PipelineInput, RefinementEngine, RunConfig, RunContext, UnitInput,
};
pub use sequential::SequentialEngine;
pub use types::{
    AgentLog, ParagraphResult, PipelineRunResult, PolishOutcome, ReferenceText, RoundSummary,
    StageSpec, UnitOutcome,
};

use coordination::PipelineKind;

// ── CLI pipeline selection ──────────────────────────────────────────────────

/// Pipeline requested via the `--pipeline` CLI flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PipelineChoice {
    /// Three agents draft, critique each other, revise, then one call synthesizes.
    Debate,
    /// One agent translates and self-judges, then selects and polishes.
    Sequential,
    /// One agent works phrase by phrase, carrying a focus note between passes, then selects.
    #[value(name = "cognitive_user")]
    CognitiveUser,
    /// One agent runs a meaning loop then a wording loop per pass, then selects.
    #[value(name = "cognitive_dualloop")]
    CognitiveDualloop,
}

impl From<PipelineChoice> for PipelineKind {
    fn from(choice: PipelineChoice) -> Self {
        match choice {
            PipelineChoice::Debate => PipelineKind::Debate,
            PipelineChoice::Sequential => PipelineKind::Sequential,
            PipelineChoice::CognitiveUser => PipelineKind::CognitiveUser,
            PipelineChoice::CognitiveDualloop => PipelineKind::CognitiveDualloop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::ValueEnum;

    #[test]
    fn cli_names_match_pipeline_kinds() {
        for choice in PipelineChoice::value_variants() {
            let name = choice
                .to_possible_value()
                .map(|v| v.get_name().to_string())
                .unwrap_or_default();
            assert_eq!(name, PipelineKind::from(*choice).to_string());
        }
    }
}
