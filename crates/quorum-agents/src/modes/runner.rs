//! Pipeline driver and the refinement-engine seam.
//!
//! Every refinement variant implements [`RefinementEngine`]. The
//! [`PipelineDriver`] validates the run, probes the feedback collaborators
//! once, then feeds the engine one unit at a time.
//!
//! ## Lifecycle
//!
//! ```text
//! PipelineDriver::run(input)
//!   → config.validate()           # iteration count, model id
//!   → preflight()                 # every feedback probe must be available
//!   → for each unit, in order:
//!       engine.refine(ctx, unit)  # first error aborts the run
//!   → PipelineRunResult
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use coordination::{AgentRoster, FeedbackProbe, GradeLevelProbe, PipelineKind};
use tracing::{error, info};

use crate::contracts::StructuredCaller;
use crate::modes::cognitive::{CognitiveEngine, CognitiveLoop};
use crate::modes::debate::DebateEngine;
use crate::modes::errors::OrchestrationError;
use crate::modes::sequential::SequentialEngine;
use crate::modes::types::{ParagraphResult, PipelineRunResult, ReferenceText};
use crate::prompts::normalize_preference;

/// Sample scored by the feedback preflight.
const PREFLIGHT_SAMPLE: &str =
    "The harbor was quiet at dawn. A few boats left early. Everyone else waited for the tide.";

// ── Run configuration ───────────────────────────────────────────────────────

/// Immutable per-invocation settings handed to the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pipeline: PipelineKind,
    model: String,
    iterations: u32,
    preference: String,
    readability_feedback: bool,
}

impl RunConfig {
    /// The preference text is normalised here, once.
    pub fn new(pipeline: PipelineKind, model: &str, iterations: u32, preference: &str) -> Self {
        Self {
            pipeline,
            model: model.trim().to_string(),
            iterations,
            preference: normalize_preference(preference),
            readability_feedback: false,
        }
    }

    pub fn with_readability_feedback(mut self, enabled: bool) -> Self {
        self.readability_feedback = enabled;
        self
    }

    pub fn pipeline(&self) -> PipelineKind {
        self.pipeline
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn preference(&self) -> &str {
        &self.preference
    }

    pub fn readability_feedback(&self) -> bool {
        self.readability_feedback
    }

    /// # Errors
    ///
    /// Returns `OrchestrationError::Configuration` for an iteration count
    /// below 1 or an empty model id.
    pub fn validate(&self) -> Result<(), OrchestrationError> {
        if self.iterations < 1 {
            return Err(OrchestrationError::Configuration(format!(
                "iterations must be >= 1 (got {})",
                self.iterations
            )));
        }
        if self.model.is_empty() {
            return Err(OrchestrationError::Configuration(
                "model id must not be empty".into(),
            ));
        }
        Ok(())
    }
}

// ── Input ───────────────────────────────────────────────────────────────────

/// Units to refine plus paragraph-aligned reference texts by source.
#[derive(Debug, Clone, Default)]
pub struct PipelineInput {
    pub units: Vec<String>,
    /// `(source name, paragraphs)`, in the order sources should be shown.
    pub references: Vec<(String, Vec<String>)>,
}

impl PipelineInput {
    pub fn new(units: Vec<String>) -> Self {
        Self {
            units,
            references: Vec::new(),
        }
    }

    pub fn with_reference(mut self, source: impl Into<String>, paragraphs: Vec<String>) -> Self {
        self.references.push((source.into(), paragraphs));
        self
    }

    /// The unit at 0-based `position`. A source with fewer paragraphs
    /// contributes an empty reference.
    pub fn unit(&self, position: usize) -> Option<UnitInput> {
        let source = self.units.get(position)?;
        let references = self
            .references
            .iter()
            .map(|(name, paragraphs)| ReferenceText {
                source: name.clone(),
                text: paragraphs.get(position).cloned().unwrap_or_default(),
            })
            .collect();
        Some(UnitInput {
            index: position + 1,
            source: source.clone(),
            references,
        })
    }
}

/// One unit as an engine sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitInput {
    /// 1-based position in the input.
    pub index: usize,
    pub source: String,
    pub references: Vec<ReferenceText>,
}

// ── Context / engine seam ───────────────────────────────────────────────────

/// Shared execution context passed to every `refine` call.
///
/// All fields are cheap to clone so stage futures can own what they need.
#[derive(Clone)]
pub struct RunContext {
    pub caller: StructuredCaller,
    pub config: Arc<RunConfig>,
    pub probes: Arc<Vec<Box<dyn FeedbackProbe>>>,
}

/// A refinement state machine for one unit.
#[async_trait]
pub trait RefinementEngine: Send + Sync {
    fn kind(&self) -> PipelineKind;

    /// Agents that take part, in display order.
    fn roster(&self) -> &AgentRoster;

    /// Run every stage for `unit`. There is no partial result: any stage
    /// failure is returned as-is.
    async fn refine(
        &self,
        ctx: &RunContext,
        unit: &UnitInput,
    ) -> Result<ParagraphResult, OrchestrationError>;
}

/// Engine for a pipeline kind, with its default roster.
pub fn engine_for(kind: PipelineKind) -> Box<dyn RefinementEngine> {
    match kind {
        PipelineKind::Debate => Box::new(DebateEngine::new()),
        PipelineKind::Sequential => Box::new(SequentialEngine::new()),
        PipelineKind::CognitiveUser => Box::new(CognitiveEngine::new(CognitiveLoop::PhraseLevel)),
        PipelineKind::CognitiveDualloop => Box::new(CognitiveEngine::new(CognitiveLoop::DualLoop)),
    }
}

// ── PipelineDriver ──────────────────────────────────────────────────────────

/// Drives one engine over every unit of an input, strictly one unit at a time.
pub struct PipelineDriver {
    ctx: RunContext,
    engine: Box<dyn RefinementEngine>,
}

impl PipelineDriver {
    /// Build a driver for `config`; readability probing is attached when enabled.
    pub fn new(caller: StructuredCaller, config: RunConfig) -> Self {
        let probes: Vec<Box<dyn FeedbackProbe>> = if config.readability_feedback() {
            vec![Box::new(GradeLevelProbe)]
        } else {
            Vec::new()
        };
        let engine = engine_for(config.pipeline());
        Self {
            ctx: RunContext {
                caller,
                config: Arc::new(config),
                probes: Arc::new(probes),
            },
            engine,
        }
    }

    /// Replace the feedback probes.
    pub fn with_probes(mut self, probes: Vec<Box<dyn FeedbackProbe>>) -> Self {
        self.ctx.probes = Arc::new(probes);
        self
    }

    /// Replace the engine, e.g. to run a custom roster.
    pub fn with_engine(mut self, engine: Box<dyn RefinementEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.ctx.config
    }

    /// Every configured probe must report itself available on a sample text.
    pub fn preflight(&self) -> Result<(), OrchestrationError> {
        for probe in self.ctx.probes.iter() {
            let report = probe.probe(PREFLIGHT_SAMPLE, None);
            if !report.available {
                return Err(OrchestrationError::Configuration(format!(
                    "feedback preflight failed: {}",
                    probe.format_for_prompt(&report)
                )));
            }
            info!(mechanism = probe.mechanism(), "feedback preflight passed");
        }
        Ok(())
    }

    /// Refine every unit and assemble the run result.
    ///
    /// # Errors
    ///
    /// Configuration problems fail before any stage runs. After that, the
    /// first failing unit aborts the run with that unit's error.
    pub async fn run(&self, input: &PipelineInput) -> Result<PipelineRunResult, OrchestrationError> {
        let config = &self.ctx.config;
        config.validate()?;
        if self.engine.kind() != config.pipeline() {
            return Err(OrchestrationError::Configuration(format!(
                "engine runs the {} pipeline but {} was requested",
                self.engine.kind(),
                config.pipeline()
            )));
        }
        if input.units.is_empty() {
            return Err(OrchestrationError::Configuration(
                "input contains no paragraphs".into(),
            ));
        }
        self.preflight()?;

        let total = input.units.len();
        info!(
            pipeline = %config.pipeline(),
            model = config.model(),
            iterations = config.iterations(),
            paragraphs = total,
            agents = self.engine.roster().len(),
            "pipeline run starting"
        );

        let mut paragraphs = Vec::with_capacity(total);
        for position in 0..total {
            let Some(unit) = input.unit(position) else {
                break;
            };
            info!(paragraph = unit.index, total, "paragraph starting");
            match self.engine.refine(&self.ctx, &unit).await {
                Ok(result) => {
                    info!(
                        paragraph = unit.index,
                        scores = %result.final_scores.score_line(),
                        "paragraph complete"
                    );
                    paragraphs.push(result);
                }
                Err(e) => {
                    error!(paragraph = unit.index, error = %e, "paragraph failed; aborting run");
                    return Err(e);
                }
            }
        }

        let final_text = PipelineRunResult::join_final_texts(&paragraphs);
        info!(paragraphs = paragraphs.len(), "pipeline run succeeded");
        Ok(PipelineRunResult {
            created_at_utc: Utc::now(),
            pipeline: config.pipeline(),
            model: config.model().to_string(),
            iterations: config.iterations(),
            agent_count: self.engine.roster().len(),
            user_preference: config.preference().to_string(),
            agents: self.engine.roster().clone(),
            paragraph_count: paragraphs.len(),
            paragraphs,
            final_text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{GenerationBackend, GenerationRequest};
    use crate::contracts::RetryPolicy;
    use crate::modes::fanout::AgentResults;
    use crate::modes::types::{PolishOutcome, UnitOutcome};
    use coordination::{AxisScores, FeedbackReport, SelectionResult};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct NeverCalled;

    #[async_trait]
    impl GenerationBackend for NeverCalled {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String, OrchestrationError> {
            Err(OrchestrationError::Transport("backend should not be called".into()))
        }
    }

    fn caller() -> StructuredCaller {
        StructuredCaller::new(
            Arc::new(NeverCalled),
            "test-model",
            Duration::from_secs(5),
            RetryPolicy::default(),
        )
    }

    /// Echoes the source text; fails on a chosen paragraph.
    struct EchoEngine {
        roster: AgentRoster,
        fail_on: Option<usize>,
        calls: AtomicUsize,
    }

    impl EchoEngine {
        fn new(fail_on: Option<usize>) -> Self {
            Self {
                roster: AgentRoster::sequential(),
                fail_on,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RefinementEngine for EchoEngine {
        fn kind(&self) -> PipelineKind {
            PipelineKind::Sequential
        }

        fn roster(&self) -> &AgentRoster {
            &self.roster
        }

        async fn refine(
            &self,
            _ctx: &RunContext,
            unit: &UnitInput,
        ) -> Result<ParagraphResult, OrchestrationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(unit.index) {
                return Err(OrchestrationError::Transport("backend down".into()));
            }
            let text = unit.source.to_uppercase();
            Ok(ParagraphResult {
                paragraph_index: unit.index,
                source_text: unit.source.clone(),
                reference_texts: unit.references.clone(),
                agents: AgentResults::new(),
                final_agent_versions: AgentResults::new(),
                outcome: UnitOutcome::Selection {
                    selection: SelectionResult {
                        selected_iteration: 1,
                        final_text: text.clone(),
                        justification: String::new(),
                        scores: AxisScores::default(),
                        index_fallback: false,
                    },
                    polish: PolishOutcome {
                        applied: false,
                        notes: String::new(),
                        scores: None,
                    },
                },
                final_text: text,
                justification: String::new(),
                final_scores: AxisScores::default(),
                trace: Vec::new(),
            })
        }
    }

    struct DownProbe;

    impl FeedbackProbe for DownProbe {
        fn mechanism(&self) -> &'static str {
            "embedding"
        }

        fn probe(&self, _text: &str, _reference: Option<&str>) -> FeedbackReport {
            FeedbackReport::unavailable("embedding", "model_not_loaded")
        }
    }

    fn config(iterations: u32) -> RunConfig {
        RunConfig::new(PipelineKind::Sequential, "test-model", iterations, "  ")
    }

    #[test]
    fn preference_is_normalized_once() {
        let cfg = config(1);
        assert_eq!(cfg.preference(), crate::prompts::DEFAULT_USER_PREFERENCE);
    }

    #[test]
    fn unit_references_are_paragraph_aligned() {
        let input = PipelineInput::new(vec!["a".into(), "b".into()])
            .with_reference("Perrin", vec!["ref a".into(), "ref b".into()])
            .with_reference("Short", vec!["only a".into()]);
        let unit = input.unit(1).unwrap();
        assert_eq!(unit.index, 2);
        assert_eq!(unit.references[0].text, "ref b");
        assert_eq!(unit.references[1].source, "Short");
        assert_eq!(unit.references[1].text, "");
        assert!(input.unit(2).is_none());
    }

    #[tokio::test]
    async fn driver_joins_units_in_order() {
        let driver = PipelineDriver::new(caller(), config(2))
            .with_engine(Box::new(EchoEngine::new(None)));
        let input = PipelineInput::new(vec!["one".into(), "two".into()]);
        let result = driver.run(&input).await.unwrap();
        assert_eq!(result.paragraph_count, 2);
        assert_eq!(result.final_text, "ONE\n\nTWO");
        assert_eq!(result.agent_count, 1);
        assert_eq!(result.iterations, 2);
    }

    #[tokio::test]
    async fn zero_iterations_fail_before_any_unit() {
        let engine = EchoEngine::new(None);
        let driver = PipelineDriver::new(caller(), config(0)).with_engine(Box::new(engine));
        let err = driver
            .run(&PipelineInput::new(vec!["one".into()]))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::Configuration(_)));
    }

    #[tokio::test]
    async fn first_failing_unit_aborts_the_run() {
        let driver = PipelineDriver::new(caller(), config(1))
            .with_engine(Box::new(EchoEngine::new(Some(2))));
        let input = PipelineInput::new(vec!["one".into(), "two".into(), "three".into()]);
        let err = driver.run(&input).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::Transport(_)));
    }

    #[tokio::test]
    async fn unavailable_preflight_is_a_configuration_error() {
        let driver = PipelineDriver::new(caller(), config(1))
            .with_engine(Box::new(EchoEngine::new(None)))
            .with_probes(vec![Box::new(DownProbe)]);
        let err = driver
            .run(&PipelineInput::new(vec!["one".into()]))
            .await
            .unwrap_err();
        match err {
            OrchestrationError::Configuration(msg) => {
                assert!(msg.contains("embedding unavailable (model_not_loaded)"))
            }
            other => panic!("expected Configuration, got {other:?}"),
        }
    }

    #[test]
    fn readability_probe_passes_preflight() {
        let cfg = config(1).with_readability_feedback(true);
        let driver = PipelineDriver::new(caller(), cfg);
        assert!(driver.preflight().is_ok());
    }

    #[test]
    fn engine_for_covers_every_kind() {
        for kind in [
            PipelineKind::Debate,
            PipelineKind::Sequential,
            PipelineKind::CognitiveUser,
            PipelineKind::CognitiveDualloop,
        ] {
            assert_eq!(engine_for(kind).kind(), kind);
        }
        assert_eq!(engine_for(PipelineKind::Debate).roster().len(), 3);
        assert_eq!(
            engine_for(PipelineKind::CognitiveUser).roster().keys(),
            vec!["cognitive_user"]
        );
    }

    #[tokio::test]
    async fn mismatched_engine_is_rejected() {
        let cfg = RunConfig::new(PipelineKind::Debate, "m", 1, "");
        let driver = PipelineDriver::new(caller(), cfg).with_engine(Box::new(EchoEngine::new(None)));
        let err = driver
            .run(&PipelineInput::new(vec!["one".into()]))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::Configuration(_)));
    }
}
