//! Markdown and JSON renderings of a completed run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::modes::types::{ParagraphResult, PipelineRunResult, UnitOutcome};

/// Render the run as a Markdown report.
pub fn render_markdown(result: &PipelineRunResult) -> String {
    let mut lines: Vec<String> = vec![
        "# Quorum Translation Report".into(),
        String::new(),
        format!("- Pipeline: `{}`", result.pipeline),
        format!("- Model: `{}`", result.model),
        format!("- Translators/Debaters: `{}`", result.agent_count),
        format!("- Iterations: `{}`", result.iterations),
        format!("- User preference prompt: `{}`", result.user_preference),
        format!(
            "- Generated (UTC): `{}`",
            result.created_at_utc.format("%Y-%m-%dT%H:%M:%SZ")
        ),
        String::new(),
        "## Final Translation".into(),
        String::new(),
        result.final_text.clone(),
        String::new(),
    ];

    for paragraph in &result.paragraphs {
        render_paragraph(&mut lines, paragraph, result.agent_count > 1);
    }

    let mut out = lines.join("\n").trim().to_string();
    out.push('\n');
    out
}

fn render_paragraph(lines: &mut Vec<String>, paragraph: &ParagraphResult, multi_agent: bool) {
    lines.push(format!("## Paragraph {}", paragraph.paragraph_index));
    lines.push(String::new());
    lines.push("### Source".into());
    lines.push(String::new());
    lines.push(paragraph.source_text.clone());
    lines.push(String::new());

    match &paragraph.outcome {
        UnitOutcome::Synthesis { .. } => lines.push("### Final Synthesis".into()),
        UnitOutcome::Selection { selection, .. } | UnitOutcome::LoopSelection { selection } => {
            lines.push(format!(
                "### Final Selection (iteration {}{})",
                selection.selected_iteration,
                if selection.index_fallback { ", fallback" } else { "" }
            ))
        }
    }
    lines.push(String::new());
    lines.push(paragraph.final_text.clone());
    lines.push(String::new());

    if multi_agent {
        lines.push("### Agent Final Versions".into());
        lines.push(String::new());
        for (key, text) in paragraph.final_agent_versions.iter() {
            lines.push(format!("- `{key}`: {text}"));
        }
        lines.push(String::new());
    }
}

/// Pretty-printed JSON of the whole run.
pub fn render_json(result: &PipelineRunResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("Failed to serialize run result")
}

/// Where [`write_reports`] put its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub markdown: PathBuf,
}

/// Write `<prefix>.json` and `<prefix>.md`, creating parent directories.
pub fn write_reports(prefix: &Path, result: &PipelineRunResult) -> Result<ReportPaths> {
    if let Some(parent) = prefix.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let paths = ReportPaths {
        json: with_suffix(prefix, "json"),
        markdown: with_suffix(prefix, "md"),
    };
    std::fs::write(&paths.json, render_json(result)?)
        .with_context(|| format!("Failed to write {}", paths.json.display()))?;
    std::fs::write(&paths.markdown, render_markdown(result))
        .with_context(|| format!("Failed to write {}", paths.markdown.display()))?;
    Ok(paths)
}

/// Append an extension without replacing any dot already in the prefix.
fn with_suffix(prefix: &Path, ext: &str) -> PathBuf {
    let mut s = prefix.as_os_str().to_owned();
    s.push(".");
    s.push(ext);
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::fanout::AgentResults;
    use crate::modes::types::{PolishOutcome, SynthesisPayload};
    use chrono::{TimeZone, Utc};
    use coordination::{AgentRoster, AxisScores, PipelineKind, SelectionResult};

    fn paragraph(outcome: UnitOutcome, versions: AgentResults<String>) -> ParagraphResult {
        ParagraphResult {
            paragraph_index: 1,
            source_text: "Ὥσπερ".into(),
            reference_texts: Vec::new(),
            agents: AgentResults::new(),
            final_agent_versions: versions,
            outcome,
            final_text: "Just as".into(),
            justification: String::new(),
            final_scores: AxisScores::default(),
            trace: Vec::new(),
        }
    }

    fn run(pipeline: PipelineKind, agents: AgentRoster, p: ParagraphResult) -> PipelineRunResult {
        PipelineRunResult {
            created_at_utc: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            pipeline,
            model: "test-model".into(),
            iterations: 1,
            agent_count: agents.len(),
            user_preference: "plain".into(),
            agents,
            paragraph_count: 1,
            final_text: p.final_text.clone(),
            paragraphs: vec![p],
        }
    }

    #[test]
    fn debate_report_lists_agent_versions() {
        let versions = AgentResults::from_entries(vec![
            ("faithful".to_string(), "a".to_string()),
            ("readable".to_string(), "b".to_string()),
            ("modern".to_string(), "c".to_string()),
        ]);
        let outcome = UnitOutcome::Synthesis {
            debate_round_summaries: Vec::new(),
            synthesis: SynthesisPayload::default(),
        };
        let md = render_markdown(&run(
            PipelineKind::Debate,
            AgentRoster::debate(),
            paragraph(outcome, versions),
        ));
        assert!(md.starts_with("# Quorum Translation Report\n"));
        assert!(md.contains("- Pipeline: `debate`"));
        assert!(md.contains("- Translators/Debaters: `3`"));
        assert!(md.contains("- Generated (UTC): `2026-03-01T12:00:00Z`"));
        assert!(md.contains("### Final Synthesis\n\nJust as"));
        assert!(md.contains("- `readable`: b"));
        assert!(md.ends_with("- `modern`: c\n"));
    }

    #[test]
    fn sequential_report_marks_selection() {
        let outcome = UnitOutcome::Selection {
            selection: SelectionResult {
                selected_iteration: 2,
                final_text: "Just as".into(),
                justification: String::new(),
                scores: AxisScores::default(),
                index_fallback: true,
            },
            polish: PolishOutcome {
                applied: true,
                notes: String::new(),
                scores: None,
            },
        };
        let md = render_markdown(&run(
            PipelineKind::Sequential,
            AgentRoster::sequential(),
            paragraph(outcome, AgentResults::new()),
        ));
        assert!(md.contains("### Final Selection (iteration 2, fallback)"));
        assert!(!md.contains("Agent Final Versions"));
    }

    #[test]
    fn cognitive_report_marks_selection_and_kind() {
        let outcome = UnitOutcome::LoopSelection {
            selection: SelectionResult {
                selected_iteration: 1,
                final_text: "Just as".into(),
                justification: "clearest".into(),
                scores: AxisScores::default(),
                index_fallback: false,
            },
        };
        let result = run(
            PipelineKind::CognitiveUser,
            AgentRoster::cognitive_user(),
            paragraph(outcome, AgentResults::new()),
        );
        let md = render_markdown(&result);
        assert!(md.contains("- Pipeline: `cognitive_user`"));
        assert!(md.contains("### Final Selection (iteration 1)\n\nJust as"));
        let json: serde_json::Value = serde_json::from_str(&render_json(&result).unwrap()).unwrap();
        assert_eq!(json["paragraphs"][0]["outcome"]["kind"], "loop_selection");
        assert_eq!(json["agents"][0]["key"], "cognitive_user");
    }

    #[test]
    fn reports_are_written_next_to_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("out").join("plutarch.v1");
        let outcome = UnitOutcome::Synthesis {
            debate_round_summaries: Vec::new(),
            synthesis: SynthesisPayload::default(),
        };
        let result = run(
            PipelineKind::Debate,
            AgentRoster::debate(),
            paragraph(outcome, AgentResults::new()),
        );
        let paths = write_reports(&prefix, &result).unwrap();
        assert!(paths.json.ends_with("plutarch.v1.json"));
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths.json).unwrap()).unwrap();
        assert_eq!(json["pipeline"], "debate");
        assert_eq!(json["paragraphs"][0]["outcome"]["kind"], "synthesis");
        assert!(std::fs::read_to_string(&paths.markdown)
            .unwrap()
            .contains("## Paragraph 1"));
    }
}
