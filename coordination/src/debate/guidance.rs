//! Carry-forward guidance: turns a judgment into a short revision checklist.
//!
//! Pure and deterministic: the same judgment always yields the same
//! ordered, de-duplicated list. Each stage sees the checklist from the
//! previous iteration instead of the full judgment text.

use crate::state::{Judgment, ScoreAxis};

/// Axes scoring below this get an axis-specific instruction. Compared
/// against the score as the judge gave it, so 8.5 fires.
pub const GUIDANCE_SCORE_THRESHOLD: f64 = 9.0;

/// Used when no axis or keyword rule fires.
pub const FALLBACK_GUIDANCE: [&str; 2] = [
    "Keep wording natural, plain, and audience-appropriate.",
    "Preserve meaning and key contrasts while avoiding source-shaped phrasing.",
];

struct KeywordRule {
    needles: &'static [&'static str],
    instruction: &'static str,
}

const KEYWORD_RULES: &[KeywordRule] = &[
    KeywordRule {
        needles: &["source-shaped", "calque", "literal"],
        instruction: "Rewrite source-shaped wording into natural English structure.",
    },
    KeywordRule {
        needles: &["cutesy", "slang", "bookish"],
        instruction: "Keep tone clear and dignified; avoid cutesy/slangy/bookish phrasing.",
    },
    KeywordRule {
        needles: &["personif"],
        instruction: "Avoid forced personification when plain process wording is clearer.",
    },
    KeywordRule {
        needles: &["pronoun"],
        instruction: "Avoid unclear pronoun chains; keep actor/action references explicit.",
    },
    KeywordRule {
        needles: &["abstract", "likely", "probable", "believable"],
        instruction: "Prefer direct plain-language outcomes over abstract relation chains.",
    },
];

fn axis_instruction(axis: ScoreAxis) -> &'static str {
    match axis {
        ScoreAxis::Faithfulness => "Keep all core meaning, relations, and contrasts from the Greek.",
        ScoreAxis::Readability => "Use shorter, smoother plain clauses for easier reading.",
        ScoreAxis::Modernity => "Avoid archaic or bookish wording; keep modern plain prose.",
    }
}

/// Distil a judgment into an ordered, de-duplicated list of instructions.
///
/// Axis rules come first (faithfulness, readability, modernity), then
/// keyword rules matched case-insensitively against the assessment,
/// issues, and revision plan. A missing score never fires an axis rule.
pub fn distill_guidance(judgment: &Judgment) -> Vec<String> {
    let mut lines: Vec<&'static str> = Vec::new();

    for axis in ScoreAxis::ALL {
        if let Some(score) = judgment.scores.get(axis) {
            if score < GUIDANCE_SCORE_THRESHOLD {
                lines.push(axis_instruction(axis));
            }
        }
    }

    let corpus = judgment.keyword_corpus();
    for rule in KEYWORD_RULES {
        if rule.needles.iter().any(|n| corpus.contains(n)) {
            lines.push(rule.instruction);
        }
    }

    if lines.is_empty() {
        lines.extend(FALLBACK_GUIDANCE);
    }

    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    for line in lines {
        if !out.iter().any(|existing| existing == line) {
            out.push(line.to_string());
        }
    }
    out
}

/// Render guidance as a bulleted block for prompt injection.
pub fn format_guidance(lines: &[String]) -> String {
    lines
        .iter()
        .map(|l| format!("- {l}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AxisScores;

    fn judgment(scores: AxisScores, issues: &str) -> Judgment {
        Judgment {
            overall_assessment: String::new(),
            strengths: String::new(),
            issues: issues.to_string(),
            revision_plan: String::new(),
            scores,
        }
    }

    #[test]
    fn test_low_axes_fire_in_axis_order() {
        let j = judgment(AxisScores::new(7, 10, 8), "");
        assert_eq!(
            distill_guidance(&j),
            vec![
                axis_instruction(ScoreAxis::Faithfulness).to_string(),
                axis_instruction(ScoreAxis::Modernity).to_string(),
            ]
        );
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let j = judgment(AxisScores::new(9, 9, 9), "");
        assert_eq!(
            distill_guidance(&j),
            FALLBACK_GUIDANCE.map(String::from).to_vec()
        );
    }

    #[test]
    fn test_fractional_score_below_threshold_fires() {
        let scores = AxisScores {
            faithfulness: Some(8.5),
            ..AxisScores::new(10, 10, 10)
        };
        let j = judgment(scores, "");
        assert_eq!(
            distill_guidance(&j),
            vec![axis_instruction(ScoreAxis::Faithfulness).to_string()]
        );
    }

    #[test]
    fn test_fractional_score_from_judge_reply_fires() {
        let j: Judgment = serde_json::from_value(serde_json::json!({
            "overall_judgment": "close",
            "scores": {"faithfulness": 10, "readability": "8.9", "modernity": 9.0}
        }))
        .unwrap();
        assert_eq!(
            distill_guidance(&j),
            vec![axis_instruction(ScoreAxis::Readability).to_string()]
        );
    }

    #[test]
    fn test_missing_scores_do_not_fire() {
        let j = judgment(AxisScores::default(), "");
        assert_eq!(distill_guidance(&j).len(), 2);
    }

    #[test]
    fn test_keyword_rules_case_insensitive() {
        let j = judgment(AxisScores::new(10, 10, 10), "Too LITERAL; a calque and a Pronoun mess");
        let lines = distill_guidance(&j);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Rewrite source-shaped"));
        assert!(lines[1].starts_with("Avoid unclear pronoun"));
    }

    #[test]
    fn test_keywords_searched_in_plan_and_assessment() {
        let mut j = judgment(AxisScores::new(10, 10, 10), "");
        j.overall_assessment = "Reads as personified".into();
        j.revision_plan = "make it less abstract".into();
        let lines = distill_guidance(&j);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("personification"));
        assert!(lines[1].contains("abstract relation chains"));
    }

    #[test]
    fn test_strengths_are_ignored() {
        let mut j = judgment(AxisScores::new(10, 10, 10), "");
        j.strengths = "avoids calque".into();
        assert_eq!(distill_guidance(&j), FALLBACK_GUIDANCE.map(String::from).to_vec());
    }

    #[test]
    fn test_deterministic() {
        let j = judgment(AxisScores::new(5, 5, 5), "bookish slang, literal");
        assert_eq!(distill_guidance(&j), distill_guidance(&j));
        assert_eq!(distill_guidance(&j).len(), 5);
    }

    #[test]
    fn test_format_guidance() {
        let lines = vec!["one".to_string(), "two".to_string()];
        assert_eq!(format_guidance(&lines), "- one\n- two");
    }
}
