//! Cognitive refinement: one agent re-translates with a carried focus note,
//! then one call selects and rewrites the strongest pass.
//!
//! ```text
//! Start → Translate × iterations → Select → Done
//! ```
//!
//! Two loop styles share this engine. They differ only in the process the
//! translate prompt asks for and in which note the selector sees:
//!
//! | Style         | Pipeline             | Process                               | Selector note       |
//! |---------------|----------------------|---------------------------------------|---------------------|
//! | `PhraseLevel` | `cognitive_user`     | phrase anchors, alternatives, zoom-out | `zoom_out_notes`    |
//! | `DualLoop`    | `cognitive_dualloop` | meaning loop, then wording loop       | `plain_restatement` |
//!
//! There is no judge and no polish. Each pass sees only the previous text
//! and the previous pass's `next_iteration_focus`.

use async_trait::async_trait;
use coordination::{
    AgentRoster, AxisScores, IterationLog, IterationRecord, PipelineKind, Priority,
    RefinementPhase, UnitSession,
};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::modes::errors::OrchestrationError;
use crate::modes::fanout::{run_stage, AgentResults};
use crate::modes::runner::{RefinementEngine, RunContext, UnitInput};
use crate::modes::sequential::resolve_select;
use crate::modes::types::{
    AgentLog, CognitivePassPayload, ParagraphResult, SelectPayload, StageSpec, UnitOutcome,
};
use crate::prompts;

/// Which thinking process a cognitive pass follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CognitiveLoop {
    /// Phrase-by-phrase anchoring and refinement, then one composed paragraph.
    PhraseLevel,
    /// A meaning loop (scene, claims, constraints) before a wording loop.
    DualLoop,
}

impl CognitiveLoop {
    pub fn for_kind(kind: PipelineKind) -> Option<Self> {
        match kind {
            PipelineKind::CognitiveUser => Some(Self::PhraseLevel),
            PipelineKind::CognitiveDualloop => Some(Self::DualLoop),
            PipelineKind::Debate | PipelineKind::Sequential => None,
        }
    }

    pub fn kind(self) -> PipelineKind {
        match self {
            Self::PhraseLevel => PipelineKind::CognitiveUser,
            Self::DualLoop => PipelineKind::CognitiveDualloop,
        }
    }

    pub fn roster(self) -> AgentRoster {
        match self {
            Self::PhraseLevel => AgentRoster::cognitive_user(),
            Self::DualLoop => AgentRoster::cognitive_dualloop(),
        }
    }

    /// Payload key of the note the selector sees next to each pass.
    pub fn note_key(self) -> &'static str {
        match self {
            Self::PhraseLevel => "zoom_out_notes",
            Self::DualLoop => "plain_restatement",
        }
    }

    pub(crate) fn process_label(self) -> &'static str {
        match self {
            Self::PhraseLevel => "follow this cognitive process",
            Self::DualLoop => "dual-loop process",
        }
    }
}

/// Single-agent translate/select engine for both cognitive loop styles.
pub struct CognitiveEngine {
    style: CognitiveLoop,
    roster: AgentRoster,
}

impl CognitiveEngine {
    pub fn new(style: CognitiveLoop) -> Self {
        Self {
            style,
            roster: style.roster(),
        }
    }

    pub fn style(&self) -> CognitiveLoop {
        self.style
    }

    async fn run_stages(
        &self,
        ctx: &RunContext,
        unit: &UnitInput,
        session: &mut UnitSession,
    ) -> Result<ParagraphResult, OrchestrationError> {
        let preference = ctx.config.preference();
        let mut log = IterationLog::new();
        let mut focus = String::new();

        while session.has_iterations_remaining() {
            let iteration = session.current_iteration + 1;
            let stage = StageSpec::TRANSLATE;
            session.transition(stage.phase, &format!("{} pass {iteration}", self.style.kind()))?;
            let previous = log.last().map(|r| r.text.as_str());
            let prompt = prompts::cognitive_translate(
                self.style,
                unit,
                preference,
                iteration,
                previous,
                (!focus.is_empty()).then_some(focus.as_str()),
            );
            let pass = run_stage(&stage, &self.roster, |_| {
                let caller = ctx.caller.clone();
                let prompt = prompt.clone();
                async move { caller.call::<CognitivePassPayload>(&stage, &prompt).await }
            })
            .await?
            .into_lead()
            .ok_or_else(|| OrchestrationError::TaskAborted("translate returned no pass".into()))?;

            let mut text = pass.value.translation.trim().to_string();
            if text.is_empty() {
                if let Some(prev) = previous {
                    warn!(iteration, "empty translation; keeping previous text");
                    text = prev.to_string();
                }
            }
            focus = pass.value.next_iteration_focus.clone();
            info!(paragraph = unit.index, iteration, focus = %focus, "cognitive pass");

            log.append(IterationRecord::new(iteration, text, pass.raw))?;
        }

        session.transition(StageSpec::SELECT.phase, "iterations complete")?;
        let compacted = Value::Array(
            log.iter()
                .map(|r| prompts::compact_cognitive_pass(self.style, r.iteration, &r.text, &r.payload))
                .collect(),
        );
        let select_prompt = prompts::cognitive_select(self.style, unit, preference, &compacted);
        let reply = ctx
            .caller
            .call::<SelectPayload>(&StageSpec::SELECT, &select_prompt)
            .await?
            .value;
        let selection = resolve_select(&log, &reply, AxisScores::default())?;
        session.transition(
            RefinementPhase::Done,
            &format!("selected iteration {}", selection.selected_iteration),
        )?;
        debug!(paragraph = unit.index, status = %session.status_line(), "unit done");

        let (agent_key, priority) = self
            .roster
            .agents()
            .first()
            .map(|a| (a.key.clone(), a.priority))
            .unwrap_or_else(|| (self.style.kind().to_string(), Priority::Balanced));
        let mut agent_log = AgentLog::new(priority);
        agent_log.iterations = log;

        Ok(ParagraphResult {
            paragraph_index: unit.index,
            source_text: unit.source.clone(),
            reference_texts: unit.references.clone(),
            agents: AgentResults::from_entries(vec![(agent_key.clone(), agent_log)]),
            final_agent_versions: AgentResults::from_entries(vec![(
                agent_key,
                selection.final_text.clone(),
            )]),
            final_text: selection.final_text.clone(),
            justification: selection.justification.clone(),
            final_scores: selection.scores,
            outcome: UnitOutcome::LoopSelection { selection },
            trace: session.transitions.clone(),
        })
    }
}

#[async_trait]
impl RefinementEngine for CognitiveEngine {
    fn kind(&self) -> PipelineKind {
        self.style.kind()
    }

    fn roster(&self) -> &AgentRoster {
        &self.roster
    }

    async fn refine(
        &self,
        ctx: &RunContext,
        unit: &UnitInput,
    ) -> Result<ParagraphResult, OrchestrationError> {
        let mut session = UnitSession::new(
            unit.index.saturating_sub(1),
            self.style.kind(),
            ctx.config.iterations(),
        );
        match self.run_stages(ctx, unit, &mut session).await {
            Ok(result) => Ok(result),
            Err(e) => {
                if let Err(te) = session.fail(&e.to_string()) {
                    warn!(error = %te, "could not record failure");
                }
                error!(paragraph = unit.index, status = %session.status_line(), error = %e, "cognitive run failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn styles_map_to_their_pipeline_kinds() {
        for style in [CognitiveLoop::PhraseLevel, CognitiveLoop::DualLoop] {
            assert_eq!(CognitiveLoop::for_kind(style.kind()), Some(style));
            assert_eq!(style.roster().keys(), vec![style.kind().to_string().as_str()]);
        }
        assert_eq!(CognitiveLoop::for_kind(PipelineKind::Sequential), None);
    }

    #[test]
    fn engine_reports_its_style_kind() {
        let engine = CognitiveEngine::new(CognitiveLoop::DualLoop);
        assert_eq!(engine.kind(), PipelineKind::CognitiveDualloop);
        assert_eq!(engine.roster().len(), 1);
        assert_eq!(engine.style().note_key(), "plain_restatement");
    }
}
