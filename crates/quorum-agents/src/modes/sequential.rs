//! Sequential refinement: one agent translates, judges itself, and iterates.
//!
//! ```text
//! Start → [Translate → SelfJudge] × iterations → Select → Polish → Done
//! ```
//!
//! Each Translate sees the previous text and the guidance distilled from the
//! previous judgment, never the judgment itself. Select sees a compacted
//! view of the whole log.

use async_trait::async_trait;
use coordination::feedback::{format_reports, probe_all};
use coordination::{
    distill_guidance, AgentRoster, AxisScores, IterationLog, IterationRecord, Judgment,
    PipelineKind, Priority, RefinementPhase, SelectionResult, UnitSession,
};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::modes::errors::OrchestrationError;
use crate::modes::fanout::{run_stage, AgentResults};
use crate::modes::runner::{RefinementEngine, RunContext, UnitInput};
use crate::modes::types::{
    AgentLog, DraftPayload, ParagraphResult, PolishOutcome, PolishPayload, SelectPayload,
    StageSpec, UnitOutcome,
};
use crate::prompts::{self, CarryForward};

/// Single-agent translate/judge/select/polish engine.
pub struct SequentialEngine {
    roster: AgentRoster,
}

impl SequentialEngine {
    pub fn new() -> Self {
        Self {
            roster: AgentRoster::sequential(),
        }
    }
}

impl Default for SequentialEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a select reply. Invalid indices fall back to the last record;
/// an empty rewrite keeps the selected record's text.
pub(crate) fn resolve_select(
    log: &IterationLog,
    reply: &SelectPayload,
    default_scores: AxisScores,
) -> Result<SelectionResult, OrchestrationError> {
    let resolved = log
        .resolve_selection(reply.selected_iteration.as_ref())
        .ok_or_else(|| OrchestrationError::Configuration("no iterations to select from".into()))?;
    if resolved.fell_back {
        warn!(
            requested = ?reply.selected_iteration,
            fallback = resolved.position,
            "invalid selection index; using last iteration"
        );
    }
    let record = log.at_position(resolved.position).ok_or_else(|| {
        OrchestrationError::Configuration(format!("iteration {} missing", resolved.position))
    })?;
    let rewritten = reply.final_translation.trim();
    let final_text = if rewritten.is_empty() {
        record.text.clone()
    } else {
        rewritten.to_string()
    };
    Ok(SelectionResult {
        selected_iteration: resolved.position,
        final_text,
        justification: reply.justification.clone(),
        scores: reply.balance_scores.unwrap_or(default_scores),
        index_fallback: resolved.fell_back,
    })
}

impl SequentialEngine {
    async fn run_stages(
        &self,
        ctx: &RunContext,
        unit: &UnitInput,
        session: &mut UnitSession,
    ) -> Result<ParagraphResult, OrchestrationError> {
        let preference = ctx.config.preference();
        let reference = unit
            .references
            .iter()
            .map(|r| r.text.as_str())
            .find(|t| !t.trim().is_empty());

        let mut log = IterationLog::new();
        let mut guidance: Vec<String> = Vec::new();
        let mut feedback: Option<String> = None;

        while session.has_iterations_remaining() {
            let iteration = session.current_iteration + 1;
            let stage = StageSpec::TRANSLATE;
            session.transition(stage.phase, &format!("iteration {iteration}"))?;
            let previous = log.last().map(|r| r.text.as_str());
            let prompt = prompts::translate(
                unit,
                preference,
                iteration,
                CarryForward {
                    previous_text: previous,
                    guidance: (!guidance.is_empty()).then_some(guidance.as_slice()),
                    feedback: feedback.as_deref(),
                },
            );
            let draft = run_stage(&stage, &self.roster, |_| {
                let caller = ctx.caller.clone();
                let prompt = prompt.clone();
                async move { caller.call::<DraftPayload>(&stage, &prompt).await }
            })
            .await?
            .into_lead()
            .ok_or_else(|| OrchestrationError::TaskAborted("translate returned no draft".into()))?;
            let mut text = draft.value.translation.trim().to_string();
            if text.is_empty() {
                if let Some(prev) = previous {
                    warn!(iteration, "empty translation; keeping previous text");
                    text = prev.to_string();
                }
            }
            debug!(iteration, observations = %draft.value.observations, "translate");

            session.transition(
                StageSpec::SELF_JUDGE.phase,
                &format!("judge iteration {iteration}"),
            )?;
            let judge_prompt = prompts::self_judge(unit, preference, &text, iteration);
            let judgment: Judgment = ctx
                .caller
                .call::<Judgment>(&StageSpec::SELF_JUDGE, &judge_prompt)
                .await?
                .value;
            info!(
                paragraph = unit.index,
                iteration,
                scores = %judgment.scores.score_line(),
                "self-judgment"
            );

            let reports = probe_all(&ctx.probes, &text, reference);
            feedback = (!reports.is_empty()).then(|| format_reports(&ctx.probes, &reports));
            guidance = distill_guidance(&judgment);

            log.append(
                IterationRecord::new(iteration, text, draft.raw)
                    .with_judgment(judgment)
                    .with_feedback(reports),
            )?;
        }

        session.transition(StageSpec::SELECT.phase, "iterations complete")?;
        let compacted = Value::Array(
            log.iter()
                .map(|r| {
                    prompts::compact_iteration(
                        r.iteration,
                        &r.text,
                        &r.self_scores(),
                        r.judgment.as_ref(),
                    )
                })
                .collect(),
        );
        let select_prompt = prompts::select(unit, preference, &compacted);
        let reply = ctx
            .caller
            .call::<SelectPayload>(&StageSpec::SELECT, &select_prompt)
            .await?
            .value;
        let last_scores = log
            .last()
            .and_then(|r| r.judgment.as_ref())
            .map(|j| j.scores)
            .unwrap_or_default();
        let mut selection = resolve_select(&log, &reply, last_scores)?;

        session.transition(
            StageSpec::POLISH.phase,
            &format!("selected iteration {}", selection.selected_iteration),
        )?;
        let polish_prompt = prompts::polish(unit, preference, &selection.final_text);
        let polish = ctx
            .caller
            .call::<PolishPayload>(&StageSpec::POLISH, &polish_prompt)
            .await?
            .value;
        let polished = polish.polished_translation.trim();
        let applied = !polished.is_empty();
        let final_text = if applied {
            polished.to_string()
        } else {
            debug!(paragraph = unit.index, "empty polish; keeping selected text");
            selection.final_text.clone()
        };

        let mut justification = selection.justification.clone();
        let mut final_scores = selection.scores;
        if let Some(scores) = polish.balance_scores {
            final_scores = scores;
            if !polish.polish_notes.is_empty() {
                justification = polish.polish_notes.clone();
            }
        }
        selection.final_text = final_text.clone();
        session.transition(RefinementPhase::Done, "polish complete")?;
        debug!(paragraph = unit.index, status = %session.status_line(), "unit done");

        let agent_key = self
            .roster
            .agents()
            .first()
            .map(|a| a.key.clone())
            .unwrap_or_else(|| "sequential".to_string());
        let priority = self
            .roster
            .agents()
            .first()
            .map(|a| a.priority)
            .unwrap_or(Priority::Balanced);
        let last_text = log.last().map(|r| r.text.clone()).unwrap_or_default();
        let mut agent_log = AgentLog::new(priority);
        agent_log.iterations = log;

        Ok(ParagraphResult {
            paragraph_index: unit.index,
            source_text: unit.source.clone(),
            reference_texts: unit.references.clone(),
            agents: AgentResults::from_entries(vec![(agent_key.clone(), agent_log)]),
            final_agent_versions: AgentResults::from_entries(vec![(agent_key, last_text)]),
            outcome: UnitOutcome::Selection {
                selection,
                polish: PolishOutcome {
                    applied,
                    notes: polish.polish_notes,
                    scores: polish.balance_scores,
                },
            },
            final_text,
            justification,
            final_scores,
            trace: session.transitions.clone(),
        })
    }
}

#[async_trait]
impl RefinementEngine for SequentialEngine {
    fn kind(&self) -> PipelineKind {
        PipelineKind::Sequential
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
            PipelineKind::Sequential,
            ctx.config.iterations(),
        );
        match self.run_stages(ctx, unit, &mut session).await {
            Ok(result) => Ok(result),
            Err(e) => {
                if let Err(te) = session.fail(&e.to_string()) {
                    warn!(error = %te, "could not record failure");
                }
                error!(paragraph = unit.index, status = %session.status_line(), error = %e, "sequential run failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordination::state::JsonObject;
    use serde_json::json;

    fn log_of(n: u32) -> IterationLog {
        let mut log = IterationLog::new();
        for i in 1..=n {
            log.append(IterationRecord::new(i, format!("draft {i}"), JsonObject::new()))
                .unwrap();
        }
        log
    }

    fn reply(selected: Value, text: &str) -> SelectPayload {
        SelectPayload {
            selected_iteration: Some(selected),
            final_translation: text.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn valid_index_selects_that_record() {
        let selected = resolve_select(&log_of(3), &reply(json!(2), ""), AxisScores::default())
            .unwrap();
        assert_eq!(selected.selected_iteration, 2);
        assert_eq!(selected.final_text, "draft 2");
        assert!(!selected.index_fallback);
    }

    #[test]
    fn out_of_range_and_non_numeric_fall_back_to_last() {
        for bad in [json!(0), json!(4), json!("best"), json!(null), json!(1.5)] {
            let selected =
                resolve_select(&log_of(3), &reply(bad.clone(), ""), AxisScores::default())
                    .unwrap();
            assert_eq!(selected.selected_iteration, 3, "input {bad}");
            assert!(selected.index_fallback);
        }
    }

    #[test]
    fn rewrite_and_scores_override_defaults() {
        let mut payload = reply(json!("1"), "  rewritten  ");
        payload.balance_scores = Some(AxisScores::new(9, 8, 7));
        let selected = resolve_select(&log_of(2), &payload, AxisScores::new(1, 1, 1))
            .unwrap();
        assert_eq!(selected.final_text, "rewritten");
        assert_eq!(selected.scores, AxisScores::new(9, 8, 7));
    }

    #[test]
    fn missing_select_scores_keep_last_judgment() {
        let selected = resolve_select(&log_of(1), &reply(json!(1), ""), AxisScores::new(6, 6, 6))
            .unwrap();
        assert_eq!(selected.scores, AxisScores::new(6, 6, 6));
    }

    #[test]
    fn empty_log_is_an_error() {
        let err = resolve_select(&IterationLog::new(), &reply(json!(1), ""), AxisScores::default())
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::Configuration(_)));
    }
}
