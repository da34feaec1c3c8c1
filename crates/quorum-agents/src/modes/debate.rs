//! Debate refinement: parallel drafts, N critique/revise rounds, one synthesis.
//!
//! ```text
//! Start → InitialGeneration (fan-out)
//!       → [DebateRound (fan-out) → RevisionRound (fan-out)] × iterations
//!       → FinalSynthesis (single call) → Done
//! ```
//!
//! The round count is exactly the configured iteration count; there is no
//! early exit on score improvement. Each revision sees every agent's
//! critiques from the round but only its own revision plan.

use async_trait::async_trait;
use coordination::{AgentRoster, IterationRecord, PipelineKind, RefinementPhase, UnitSession};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use crate::contracts::Structured;
use crate::modes::errors::OrchestrationError;
use crate::modes::fanout::{run_stage, AgentResults};
use crate::modes::runner::{RefinementEngine, RunContext, UnitInput};
use crate::modes::types::{
    AgentLog, DebatePayload, DraftPayload, ParagraphResult, RevisionPayload, RoundSummary,
    StageSpec, SynthesisPayload, UnitOutcome,
};
use crate::prompts;

/// Multi-agent debate engine.
pub struct DebateEngine {
    roster: AgentRoster,
}

impl DebateEngine {
    pub fn new() -> Self {
        Self::with_roster(AgentRoster::debate())
    }

    pub fn with_roster(roster: AgentRoster) -> Self {
        Self { roster }
    }
}

impl Default for DebateEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-unit bookkeeping, appended to only after a stage's fan-in.
struct DebateLedger {
    logs: AgentResults<AgentLog>,
    observations: AgentResults<String>,
    change_summaries: AgentResults<Vec<String>>,
    current: AgentResults<String>,
    rounds: Vec<RoundSummary>,
}

impl DebateLedger {
    fn from_drafts(
        roster: &AgentRoster,
        drafts: AgentResults<Structured<DraftPayload>>,
    ) -> Result<Self, OrchestrationError> {
        let mut ledger = Self {
            logs: AgentResults::new(),
            observations: AgentResults::new(),
            change_summaries: AgentResults::new(),
            current: AgentResults::new(),
            rounds: Vec::new(),
        };
        for (key, draft) in drafts {
            let priority = roster
                .get(&key)
                .map(|a| a.priority)
                .unwrap_or(coordination::Priority::Balanced);
            let text = draft.value.translation.trim().to_string();
            debug!(agent = %key, observations = %draft.value.observations, "initial draft");

            let mut log = AgentLog::new(priority);
            log.iterations
                .append(IterationRecord::new(0, text.clone(), draft.raw))?;
            ledger.logs.insert(key.clone(), log);
            ledger
                .observations
                .insert(key.clone(), draft.value.observations);
            ledger.change_summaries.insert(key.clone(), Vec::new());
            ledger.current.insert(key, text);
        }
        Ok(ledger)
    }

    /// Current candidates as a JSON object in registry order.
    fn candidates(&self) -> Value {
        Value::Object(
            self.current
                .iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.clone())))
                .collect(),
        )
    }

    fn record_debate(&mut self, iteration: u32, debates: &AgentResults<Structured<DebatePayload>>) {
        for (key, debate) in debates.iter() {
            if let Some(log) = self.logs.get_mut(key) {
                log.critiques.push(debate.value.clone());
            }
        }
        self.rounds.push(RoundSummary {
            iteration,
            summaries: debates.map(|_, d| d.value.round_summary.clone()),
        });
    }

    fn record_revisions(
        &mut self,
        iteration: u32,
        revisions: AgentResults<Structured<RevisionPayload>>,
    ) -> Result<(), OrchestrationError> {
        for (key, revision) in revisions {
            let revised = revision.value.translation.trim();
            let text = if revised.is_empty() {
                warn!(agent = %key, iteration, "empty revision; keeping previous candidate");
                self.current.get(&key).cloned().unwrap_or_default()
            } else {
                revised.to_string()
            };
            if let Some(log) = self.logs.get_mut(&key) {
                log.iterations
                    .append(IterationRecord::new(iteration, text.clone(), revision.raw))?;
            }
            if let Some(summaries) = self.change_summaries.get_mut(&key) {
                summaries.push(revision.value.change_summary);
            }
            self.current.insert(key, text);
        }
        Ok(())
    }

    /// Everything the synthesis call sees besides the unit itself.
    fn synthesis_context(&self, unit: &UnitInput, preference: &str) -> Value {
        let agent_summaries: Map<String, Value> = self
            .logs
            .iter()
            .map(|(key, log)| {
                let observations = self.observations.get(key).cloned().unwrap_or_default();
                let revisions = self.change_summaries.get(key).cloned().unwrap_or_default();
                let plans: Vec<&str> = log
                    .critiques
                    .iter()
                    .map(|c| c.self_revision_plan.as_str())
                    .collect();
                (
                    key.to_string(),
                    json!({
                        "priority": log.priority,
                        "initial_observations": observations,
                        "revision_summaries": revisions,
                        "debate_plans": plans,
                    }),
                )
            })
            .collect();
        let references: Map<String, Value> = unit
            .references
            .iter()
            .map(|r| (r.source.clone(), Value::String(r.text.clone())))
            .collect();
        json!({
            "paragraph_index": unit.index,
            "final_translations": self.candidates(),
            "agent_summaries": agent_summaries,
            "debate_summaries": self.rounds,
            "reference_translations": references,
            "user_preference": preference,
        })
    }
}

/// Every agent's round summary and critiques, plus only `own_key`'s plan.
fn round_feedback(debates: &AgentResults<Structured<DebatePayload>>, own_key: &str) -> Value {
    let summaries: Map<String, Value> = debates
        .iter()
        .map(|(k, d)| (k.to_string(), Value::String(d.value.round_summary.clone())))
        .collect();
    let critiques: Map<String, Value> = debates
        .iter()
        .map(|(k, d)| (k.to_string(), json!(d.value.critiques)))
        .collect();
    let own_plan = debates
        .get(own_key)
        .map(|d| d.value.self_revision_plan.clone())
        .unwrap_or_default();
    json!({
        "round_summaries": summaries,
        "critiques": critiques,
        "your_revision_plan": own_plan,
    })
}

impl DebateEngine {
    async fn run_stages(
        &self,
        ctx: &RunContext,
        unit: &UnitInput,
        session: &mut UnitSession,
    ) -> Result<ParagraphResult, OrchestrationError> {
        let preference = ctx.config.preference();

        let stage = StageSpec::INITIAL_GENERATION;
        session.transition(stage.phase, "independent drafts")?;
        let drafts = run_stage(&stage, &self.roster, |agent| {
            let prompt = prompts::initial_generation(&agent, unit, preference);
            let caller = ctx.caller.clone();
            async move {
                caller
                    .call::<DraftPayload>(&stage, &prompt)
                    .await
            }
        })
        .await?;
        let mut ledger = DebateLedger::from_drafts(&self.roster, drafts)?;

        while session.has_iterations_remaining() {
            let iteration = session.current_iteration + 1;
            let stage = StageSpec::DEBATE_ROUND;
            session.transition(stage.phase, &format!("critique round {iteration}"))?;
            let candidates = ledger.candidates();
            let debates = run_stage(&stage, &self.roster, |agent| {
                let prompt =
                    prompts::debate_round(&agent, unit, preference, &candidates, iteration);
                let caller = ctx.caller.clone();
                async move {
                    caller
                        .call::<DebatePayload>(&stage, &prompt)
                        .await
                }
            })
            .await?;
            ledger.record_debate(iteration, &debates);

            let stage = StageSpec::REVISION_ROUND;
            session.transition(stage.phase, &format!("revision round {iteration}"))?;
            let revisions = run_stage(&stage, &self.roster, |agent| {
                let own_previous = ledger.current.get(&agent.key).cloned().unwrap_or_default();
                let feedback = round_feedback(&debates, &agent.key);
                let prompt = prompts::revision_round(
                    &agent,
                    unit,
                    preference,
                    &own_previous,
                    &candidates,
                    &feedback,
                    iteration,
                );
                let caller = ctx.caller.clone();
                async move {
                    caller
                        .call::<RevisionPayload>(&stage, &prompt)
                        .await
                }
            })
            .await?;
            ledger.record_revisions(iteration, revisions)?;
            info!(paragraph = unit.index, iteration, "debate round complete");
        }

        session.transition(StageSpec::FINAL_SYNTHESIS.phase, "all rounds complete")?;
        let context = ledger.synthesis_context(unit, preference);
        let prompt = prompts::final_synthesis(unit, preference, &context);
        let synthesis = ctx
            .caller
            .call::<SynthesisPayload>(&StageSpec::FINAL_SYNTHESIS, &prompt)
            .await?
            .value;
        session.transition(RefinementPhase::Done, "synthesis complete")?;
        debug!(paragraph = unit.index, status = %session.status_line(), "unit done");

        let final_text = synthesis.final_translation.trim().to_string();
        Ok(ParagraphResult {
            paragraph_index: unit.index,
            source_text: unit.source.clone(),
            reference_texts: unit.references.clone(),
            agents: ledger.logs,
            final_agent_versions: ledger.current,
            final_text,
            justification: synthesis.justification.clone(),
            final_scores: synthesis.balance_scores,
            outcome: UnitOutcome::Synthesis {
                debate_round_summaries: ledger.rounds,
                synthesis,
            },
            trace: session.transitions.clone(),
        })
    }
}

#[async_trait]
impl RefinementEngine for DebateEngine {
    fn kind(&self) -> PipelineKind {
        PipelineKind::Debate
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
            PipelineKind::Debate,
            ctx.config.iterations(),
        );
        match self.run_stages(ctx, unit, &mut session).await {
            Ok(result) => Ok(result),
            Err(e) => {
                if let Err(te) = session.fail(&e.to_string()) {
                    warn!(error = %te, "could not record failure");
                }
                error!(paragraph = unit.index, status = %session.status_line(), error = %e, "debate failed");
                Err(e)
            }
        }
    }
}
